//! Output back-end contracts.
//!
//! Two kinds of output are supported:
//! - an [`AudioSink`] that the player opens and that pulls data through a [`RenderCallback`],
//! - a callback track built by a [`TrackFactory`] at start.
//!
//! Both are wrapped into one internal [`AudioOutput`] so the player never branches on which
//! one it holds.

use std::sync::{Arc, Weak};

use crate::error::{RenderError, RenderResult};
use crate::format::{AudioFormat, ChannelMask, MediaFormat, OutputFlags};
use crate::player::Shared;

/// Parameters for [`AudioSink::open`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkOpenParams {
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_mask: ChannelMask,
    pub bit_rate: Option<u32>,
    pub format: AudioFormat,
    pub buffer_count: u32,
    pub flags: OutputFlags,
}

/// Parameters for [`TrackFactory::create`]. The channel mask is always concrete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackParams {
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_mask: u32,
    pub bit_rate: Option<u32>,
    pub format: AudioFormat,
    pub flags: OutputFlags,
}

/// Handle an output uses to pull data from the player and report offload events.
///
/// Holds only a weak reference: once the player is gone, `fill` writes nothing.
#[derive(Clone)]
pub struct RenderCallback {
    shared: Weak<Shared>,
}

impl RenderCallback {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// Fill `dst` with as many bytes as are available. Returns the byte count written.
    pub fn fill(&self, dst: &mut [u8]) -> usize {
        match self.shared.upgrade() {
            Some(shared) => shared.fill_buffer(dst),
            None => 0,
        }
    }

    /// The offload output finished playing everything it was given.
    pub fn on_stream_end(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_stream_end();
        }
    }

    /// The offload output was torn down underneath the player.
    pub fn on_tear_down(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_tear_down();
        }
    }
}

impl std::fmt::Debug for RenderCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCallback")
            .field("attached", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Pull-model sink opened by the player.
pub trait AudioSink: Send + Sync {
    fn open(&self, params: &SinkOpenParams, callback: RenderCallback) -> RenderResult<()>;
    fn start(&self) -> RenderResult<()>;
    fn pause(&self);
    fn stop(&self);
    /// Drop queued audio. Called with the player's session lock held, so it must not wait
    /// on the render callback.
    fn flush(&self);
    fn close(&self);
    /// Output latency in milliseconds.
    fn latency_ms(&self) -> u32;
    /// Bytes per frame of the opened stream.
    fn frame_size(&self) -> usize;
    /// Frames rendered by the hardware since open or the last flush/stop.
    /// For offload sinks this is the playback position in milliseconds.
    fn position(&self) -> RenderResult<u32>;
    fn needs_trailing_padding(&self) -> bool;
    fn set_playback_rate_permille(&self, permille: u32) -> RenderResult<()>;

    fn supports_offload(&self) -> bool {
        false
    }

    fn set_offload_eos_reached(&self, _reached: bool) {}

    fn send_offload_metadata(&self, _format: &MediaFormat) {}
}

/// Callback-driven track created at start.
pub trait AudioTrack: Send {
    fn start(&self) -> RenderResult<()>;
    fn pause(&self);
    fn stop(&self);
    /// Same contract as [`AudioSink::flush`]: must not wait on the render callback.
    fn flush(&self);
    fn latency_ms(&self) -> u32;
    fn frame_size(&self) -> usize;
    fn position(&self) -> RenderResult<u32>;
    fn set_sample_rate(&self, sample_rate: u32) -> RenderResult<()>;

    fn set_offload_eos_reached(&self, _reached: bool) {}
}

/// Builds a track for a negotiated configuration.
pub trait TrackFactory: Send + Sync {
    fn create(
        &self,
        params: &TrackParams,
        callback: RenderCallback,
    ) -> RenderResult<Box<dyn AudioTrack>>;

    fn supports_offload(&self) -> bool {
        false
    }
}

/// Where the player sends audio. Chosen at construction, instantiated at start.
#[derive(Clone)]
pub enum OutputTarget {
    Sink(Arc<dyn AudioSink>),
    Track(Arc<dyn TrackFactory>),
}

impl OutputTarget {
    pub fn supports_offload(&self) -> bool {
        match self {
            Self::Sink(sink) => sink.supports_offload(),
            Self::Track(factory) => factory.supports_offload(),
        }
    }
}

/// Uniform view of an opened output.
pub(crate) trait AudioOutput: Send + Sync {
    fn start(&self) -> RenderResult<()>;
    fn pause(&self);
    fn stop(&self);
    fn flush(&self);
    fn latency_ms(&self) -> u32;
    fn frame_size(&self) -> usize;
    fn position(&self) -> RenderResult<u32>;
    fn needs_trailing_padding(&self) -> bool;
    fn set_playback_rate(&self, permille: u32, sample_rate: u32) -> RenderResult<()>;
    fn set_offload_eos_reached(&self, reached: bool);
    /// Stop and give up the underlying device resources.
    fn release(&self);

    fn latency_us(&self) -> i64 {
        i64::from(self.latency_ms()) * 1000
    }
}

/// Opens `target` for `config`-derived parameters and returns the unified output.
pub(crate) fn open_output(
    target: &OutputTarget,
    sink_params: SinkOpenParams,
    callback: RenderCallback,
    source_format: &MediaFormat,
) -> RenderResult<Arc<dyn AudioOutput>> {
    let offload = sink_params.flags == OutputFlags::CompressOffload;
    if offload && !target.supports_offload() {
        return Err(RenderError::OffloadUnsupported);
    }

    match target {
        OutputTarget::Sink(sink) => {
            if offload {
                tracing::info!(format = ?sink_params.format, "opening compress offload sink");
            }
            sink.open(&sink_params, callback)?;
            if offload {
                sink.send_offload_metadata(source_format);
            }
            Ok(Arc::new(SinkOutput { sink: sink.clone() }))
        }
        OutputTarget::Track(factory) => {
            let channel_mask = sink_params.channel_mask.resolve(sink_params.channels);
            if channel_mask == 0 {
                return Err(RenderError::BadChannelMask {
                    channels: sink_params.channels,
                });
            }
            let params = TrackParams {
                sample_rate: sink_params.sample_rate,
                channels: sink_params.channels,
                channel_mask,
                bit_rate: sink_params.bit_rate,
                format: sink_params.format,
                flags: sink_params.flags,
            };
            let track = factory.create(&params, callback)?;
            Ok(Arc::new(TrackOutput {
                track: std::sync::Mutex::new(track),
            }))
        }
    }
}

struct SinkOutput {
    sink: Arc<dyn AudioSink>,
}

impl AudioOutput for SinkOutput {
    fn start(&self) -> RenderResult<()> {
        self.sink.start()
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn flush(&self) {
        self.sink.flush();
    }

    fn latency_ms(&self) -> u32 {
        self.sink.latency_ms()
    }

    fn frame_size(&self) -> usize {
        self.sink.frame_size()
    }

    fn position(&self) -> RenderResult<u32> {
        self.sink.position()
    }

    fn needs_trailing_padding(&self) -> bool {
        self.sink.needs_trailing_padding()
    }

    fn set_playback_rate(&self, permille: u32, _sample_rate: u32) -> RenderResult<()> {
        self.sink.set_playback_rate_permille(permille)
    }

    fn set_offload_eos_reached(&self, reached: bool) {
        self.sink.set_offload_eos_reached(reached);
    }

    fn release(&self) {
        self.sink.stop();
        self.sink.close();
    }
}

// `AudioTrack` is only `Send`; the mutex makes the wrapper shareable with the render thread.
struct TrackOutput {
    track: std::sync::Mutex<Box<dyn AudioTrack>>,
}

impl TrackOutput {
    fn with<R>(&self, f: impl FnOnce(&dyn AudioTrack) -> R) -> R {
        let track = self
            .track
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(track.as_ref())
    }
}

impl AudioOutput for TrackOutput {
    fn start(&self) -> RenderResult<()> {
        self.with(|t| t.start())
    }

    fn pause(&self) {
        self.with(|t| t.pause());
    }

    fn stop(&self) {
        self.with(|t| t.stop());
    }

    fn flush(&self) {
        self.with(|t| t.flush());
    }

    fn latency_ms(&self) -> u32 {
        self.with(|t| t.latency_ms())
    }

    fn frame_size(&self) -> usize {
        self.with(|t| t.frame_size())
    }

    fn position(&self) -> RenderResult<u32> {
        self.with(|t| t.position())
    }

    fn needs_trailing_padding(&self) -> bool {
        true
    }

    fn set_playback_rate(&self, permille: u32, sample_rate: u32) -> RenderResult<()> {
        let rate = u64::from(permille) * u64::from(sample_rate) / 1000;
        let rate = u32::try_from(rate).map_err(|_| RenderError::Unsupported {
            operation: "playback rate",
        })?;
        self.with(|t| t.set_sample_rate(rate))
    }

    fn set_offload_eos_reached(&self, reached: bool) {
        self.with(|t| t.set_offload_eos_reached(reached));
    }

    fn release(&self) {
        self.with(|t| t.stop());
    }
}
