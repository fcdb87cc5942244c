use serde::{Deserialize, Serialize};

/// Reason why a render session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Source exhausted and the drain delay elapsed.
    Eof,
    /// Source, output, or offload tear-down interrupted playback.
    Error,
    /// Playback was explicitly stopped by the owner.
    Stopped,
}

/// Point-in-time view of a render session.
///
/// Times are in microseconds on the media timeline unless noted otherwise.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderStatus {
    /// `true` between a successful `start` and the next `reset`.
    pub started: bool,
    /// `true` while the output is paused or stopped by the owner.
    pub paused: bool,
    /// A seek was requested and not yet observed by the render callback.
    pub seeking: bool,
    /// The source reported an end condition (or the offload stream ended).
    pub reached_eos: bool,
    /// Compressed data is handed to an offload-capable output.
    pub offload: bool,
    /// Frames handed to the output since start or the last seek.
    pub frames_played: u64,
    /// Current media position.
    pub media_time_us: i64,
    /// Output sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Output channel count.
    pub channels: Option<u16>,
    /// Output latency last reported by the device.
    pub latency_us: Option<i64>,
    /// Terminal source status, when the stream ended with something other than a clean EOS.
    pub final_status: Option<String>,
    /// End reason once the session is over.
    pub end_reason: Option<PlaybackEndReason>,
}

impl RenderStatus {
    /// Media position rounded down to whole milliseconds (never negative).
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.media_time_us.max(0) / 1000).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reason_serializes_snake_case() {
        let json = serde_json::to_string(&PlaybackEndReason::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
        let back: PlaybackEndReason = serde_json::from_str("\"eof\"").unwrap();
        assert_eq!(back, PlaybackEndReason::Eof);
    }

    #[test]
    fn elapsed_ms_clamps_negative_media_time() {
        let status = RenderStatus {
            media_time_us: -5_000,
            ..RenderStatus::default()
        };
        assert_eq!(status.elapsed_ms(), 0);

        let status = RenderStatus {
            media_time_us: 1_234_567,
            ..RenderStatus::default()
        };
        assert_eq!(status.elapsed_ms(), 1_234);
    }

    #[test]
    fn status_roundtrips_through_json() {
        let status = RenderStatus {
            started: true,
            reached_eos: true,
            frames_played: 1_323,
            media_time_us: 20_000,
            sample_rate: Some(44_100),
            channels: Some(2),
            end_reason: Some(PlaybackEndReason::Eof),
            ..RenderStatus::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: RenderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
