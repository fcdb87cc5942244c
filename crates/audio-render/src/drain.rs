//! End-of-stream drain arithmetic.

use crate::error::{RenderError, RenderResult};

/// Terminal state of the source for the current session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub reached_eos: bool,
    /// Status of the read that ended the stream.
    pub final_status: Option<RenderError>,
}

impl StreamStatus {
    pub fn mark_eos(&mut self, status: RenderError) {
        self.reached_eos = true;
        self.final_status = Some(status);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// `Ok(())` unless the stream ended with a recorded failure. A clean end of stream reads
    /// back as the end-of-stream error itself, like any other terminal read status.
    pub fn final_result(&self) -> RenderResult<()> {
        match &self.final_status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Frames submitted but not yet rendered by the hardware.
///
/// Zero when the position can't be read or the hardware report races ahead of the count.
pub fn frames_pending_playout(frames_played: u64, reported: RenderResult<u32>) -> u64 {
    match reported {
        Ok(rendered) => frames_played.saturating_sub(u64::from(rendered)),
        Err(_) => 0,
    }
}

/// What to do once the source is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Post end of stream after `delay_us`.
    NotifyAfter { delay_us: i64 },
    /// The offload output reports stream end itself.
    OffloadPending,
}

#[derive(Clone, Copy, Debug)]
pub struct DrainPolicy {
    pub sample_rate: u32,
    pub latency_us: i64,
    pub offload: bool,
}

impl DrainPolicy {
    /// `additional_frames` are frames copied during the fill that hit the end, not yet counted
    /// in `frames_played`.
    pub fn on_source_exhausted(
        &self,
        frames_played: u64,
        reported: RenderResult<u32>,
        additional_frames: u64,
        needs_trailing_padding: bool,
    ) -> DrainOutcome {
        if self.offload {
            return DrainOutcome::OffloadPending;
        }
        if !needs_trailing_padding {
            return DrainOutcome::NotifyAfter { delay_us: 0 };
        }

        let pending = frames_pending_playout(frames_played, reported) + additional_frames;
        let completion_us = if self.sample_rate == 0 {
            0
        } else {
            i64::try_from(u128::from(pending) * 1_000_000 / u128::from(self.sample_rate))
                .unwrap_or(i64::MAX)
        };
        tracing::debug!(
            total_frames = frames_played + additional_frames,
            pending_frames = pending,
            completion_us,
            "source exhausted"
        );
        DrainOutcome::NotifyAfter {
            delay_us: completion_us + self.latency_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DrainPolicy {
        DrainPolicy {
            sample_rate: 44_100,
            latency_us: 20_000,
            offload: false,
        }
    }

    #[test]
    fn pending_frames_clamp_when_hardware_is_ahead() {
        assert_eq!(frames_pending_playout(1_024, Ok(512)), 512);
        assert_eq!(frames_pending_playout(100, Ok(512)), 0);
        assert_eq!(frames_pending_playout(1_024, Err(RenderError::NoInit)), 0);
    }

    #[test]
    fn delay_covers_pending_frames_and_latency() {
        let outcome = policy().on_source_exhausted(1_024, Ok(512), 299, true);
        // 811 frames at 44.1 kHz = 18390 us, plus 20 ms latency.
        assert_eq!(outcome, DrainOutcome::NotifyAfter { delay_us: 38_390 });
    }

    #[test]
    fn no_trailing_padding_means_no_delay() {
        let outcome = policy().on_source_exhausted(1_024, Ok(0), 299, false);
        assert_eq!(outcome, DrainOutcome::NotifyAfter { delay_us: 0 });
    }

    #[test]
    fn offload_defers_to_output() {
        let policy = DrainPolicy {
            offload: true,
            ..policy()
        };
        assert_eq!(
            policy.on_source_exhausted(1_024, Ok(0), 0, true),
            DrainOutcome::OffloadPending
        );
    }

    #[test]
    fn stream_status_reports_final_error() {
        let mut status = StreamStatus::default();
        assert_eq!(status.final_result(), Ok(()));
        status.mark_eos(RenderError::Io {
            message: "gone".to_string(),
        });
        assert!(status.reached_eos);
        assert!(status.final_result().is_err());
        status.clear();
        assert!(!status.reached_eos);
    }
}
