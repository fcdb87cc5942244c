//! Wall-clock source and the frame-count based position clock.

use std::time::Instant;

/// Monotonic microsecond clock.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> i64;
}

/// [`Clock`] backed by [`Instant`], counting from construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

/// A media timestamp and the real time at which it is heard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeMapping {
    pub real_us: i64,
    pub media_us: i64,
}

/// Frame counter plus media/real time anchor for one session.
#[derive(Clone, Debug, Default)]
pub struct PositionClock {
    sample_rate: u32,
    latency_us: i64,
    frames_played: u64,
    frames_played_sys_time_us: i64,
    pinned_us: Option<i64>,
    mapping: Option<TimeMapping>,
}

impl PositionClock {
    pub fn configure(&mut self, sample_rate: u32, latency_us: i64) {
        self.sample_rate = sample_rate;
        self.latency_us = latency_us;
        self.pinned_us = None;
    }

    pub fn set_latency_us(&mut self, latency_us: i64) {
        self.latency_us = latency_us;
    }

    pub fn latency_us(&self) -> i64 {
        self.latency_us
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames handed to the output since start or the last seek.
    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn frames_to_us(&self, frames: u64) -> i64 {
        debug_assert!(self.sample_rate != 0, "sample rate not configured");
        if self.sample_rate == 0 {
            return 0;
        }
        let us = u128::from(frames) * 1_000_000 / u128::from(self.sample_rate);
        i64::try_from(us).unwrap_or(i64::MAX)
    }

    /// Real time of the audio currently being heard.
    ///
    /// The frame count only moves once per fill, so the wall-clock time since that update is
    /// added back in (or the pinned time, while frozen).
    pub fn real_time_us(&self, now_us: i64) -> i64 {
        let reference = self.pinned_us.unwrap_or(now_us);
        -self.latency_us + self.frames_to_us(self.frames_played) + reference
            - self.frames_played_sys_time_us
    }

    /// Media time being heard at `now_us`. Falls back to `seek_target_us`, then 0, until a
    /// mapping exists.
    pub fn media_time_us(&self, now_us: i64, seek_target_us: Option<i64>) -> i64 {
        match self.mapping {
            None => seek_target_us.unwrap_or(0),
            Some(mapping) => {
                let offset = (self.real_time_us(now_us) - mapping.real_us).max(0);
                mapping.media_us + offset
            }
        }
    }

    pub fn mapping(&self) -> Option<TimeMapping> {
        self.mapping
    }

    /// Re-anchor on a freshly adopted buffer.
    ///
    /// `pending_frames` are frames already copied during the current fill but not yet counted.
    /// Buffers without a timestamp only move the real side of an existing mapping.
    pub fn record_buffer(&mut self, media_us: Option<i64>, pending_frames: u64) {
        let real_us = self.frames_to_us(self.frames_played + pending_frames);
        if let Some(media_us) = media_us {
            self.mapping = Some(TimeMapping { real_us, media_us });
        } else if let Some(mapping) = self.mapping.as_mut() {
            mapping.real_us = real_us;
        }
    }

    /// Count frames submitted by a fill and restamp the update time.
    pub fn advance(&mut self, frames: u64, now_us: i64, pin: bool) {
        self.frames_played += frames;
        self.frames_played_sys_time_us = now_us;
        self.pinned_us = pin.then_some(now_us);
    }

    pub fn pin(&mut self, now_us: i64) {
        self.pinned_us = Some(now_us);
    }

    pub fn unpin(&mut self) {
        self.pinned_us = None;
    }

    pub fn reset_frames(&mut self, now_us: i64) {
        self.frames_played = 0;
        self.frames_played_sys_time_us = now_us;
    }

    pub fn invalidate_mapping(&mut self) {
        self.mapping = None;
    }

    /// Back to the state of a fresh session.
    pub fn reset(&mut self, now_us: i64) {
        *self = Self {
            frames_played_sys_time_us: now_us,
            ..Self::default()
        };
    }
}
