/// Receives playback events from the player.
///
/// Calls are made from the render callback thread (or the output's event thread for offload
/// events) and never while the player's session lock is held, so implementations may call
/// back into the player.
pub trait PlayerObserver: Send + Sync {
    /// A seek has been observed by the render callback and the next buffer comes from the new
    /// position.
    fn post_audio_seek_complete(&self);

    /// The source is exhausted; everything submitted finishes playing after `delay_us`.
    fn post_audio_eos(&self, delay_us: i64);

    /// The offload output was torn down and must be rebuilt by the owner.
    fn post_audio_offload_tear_down(&self);
}
