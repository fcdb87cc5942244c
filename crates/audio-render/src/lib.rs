//! Pull-driven audio render engine.
//!
//! An [`AudioPlayer`](player::AudioPlayer) pulls PCM (or, for offload outputs, compressed)
//! buffers from a [`MediaSource`](source::MediaSource) whenever its output asks for more data,
//! and keeps a running mapping between media time and wall-clock playback time.

pub mod clock;
pub mod config;
pub mod cursor;
pub mod decode;
pub mod drain;
pub mod error;
pub mod format;
pub mod observer;
pub mod output;
pub mod player;
mod pump;
pub mod seek;
pub mod source;
mod status;

#[cfg(test)]
mod testing;

pub use error::{RenderError, RenderResult};
pub use player::AudioPlayer;
