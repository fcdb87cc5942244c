//! Status codes shared by the player, its sources and its outputs.

use thiserror::Error;

/// Errors produced by player lifecycle calls, source reads and output back-ends.
///
/// Source read failures are not fatal to the render callback: they end the stream and are
/// reported back through [`AudioPlayer::reached_eos`](crate::AudioPlayer::reached_eos).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Source MIME type is neither raw PCM nor accepted by an offload output.
    #[error("unsupported mime type: {mime}")]
    UnsupportedMime { mime: String },
    /// Source format lacks a mandatory key.
    #[error("source format is missing `{key}`")]
    MissingFormatKey { key: &'static str },
    /// No output channel mask can be derived for this channel count.
    #[error("no output channel mask for {channels} channels")]
    BadChannelMask { channels: u32 },
    /// Offload was requested but the output cannot take compressed data.
    #[error("output does not support compressed offload")]
    OffloadUnsupported,
    #[error("player already started")]
    AlreadyStarted,
    #[error("player not started")]
    NotStarted,
    #[error("no source attached")]
    NoSource,
    #[error("a source is already attached")]
    SourceAlreadySet,
    /// No output has been initialized yet.
    #[error("output not initialized")]
    NoInit,
    #[error("sample rate must be non-zero")]
    InvalidSampleRate,
    /// The sink or track refused to open.
    #[error("output init failed: {message}")]
    OutputInit { message: String },
    #[error("{operation} is not supported by this output")]
    Unsupported { operation: &'static str },
    #[error("end of stream")]
    EndOfStream,
    /// The source renegotiated its format; re-read `format()`.
    #[error("source format changed")]
    FormatChanged,
    #[error("source i/o error: {message}")]
    Io { message: String },
    #[error("decode error: {message}")]
    Decode { message: String },
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub fn output_init(message: impl Into<String>) -> Self {
        Self::OutputInit {
            message: message.into(),
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}
