use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use audio_render::config::PlayerOptions;

use crate::cli::Args;
use crate::device::normalize_device_name;

/// Everything `run_play` needs, resolved from the command line.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub device: Option<String>,
    pub player: PlayerOptions,
    pub start_at_us: Option<i64>,
    pub status_interval: Option<Duration>,
}

impl PlayConfig {
    pub fn from_args(args: &Args, path: PathBuf, start_at: Option<f64>) -> Result<Self> {
        let start_at_us = start_at.map(seconds_to_us).transpose()?;
        Ok(Self {
            path,
            device: normalize_device_name(args.device.clone()),
            player: PlayerOptions {
                allow_deep_buffering: args.deep_buffer,
                buffer_count: args.buffer_count,
                ..PlayerOptions::default()
            },
            start_at_us,
            status_interval: (args.status_interval_ms > 0)
                .then(|| Duration::from_millis(args.status_interval_ms)),
        })
    }
}

/// Convert a user-supplied position in seconds to microseconds.
pub fn seconds_to_us(secs: f64) -> Result<i64> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(anyhow!("position must be a non-negative number of seconds: {secs}"));
    }
    Ok((secs * 1_000_000.0).round() as i64)
}
