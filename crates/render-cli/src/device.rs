//! Output device discovery and stream configuration.
//!
//! The player hands out PCM16 at the source rate and never resamples, so configs are
//! chosen for an exact rate match first and a cheap sample conversion second.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Upper bound for a fixed buffer size in deep-buffer mode.
const DEEP_BUFFER_MAX_FRAMES: u32 = 16_384;

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Pick a supported output config running at exactly `rate` with `channels` channels if
/// possible, falling back to any channel count at that rate.
pub fn pick_output_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let mut best: Option<(bool, u8, cpal::SupportedStreamConfigRange)> = None;
    for range in ranges {
        if rate < range.min_sample_rate() || rate > range.max_sample_rate() {
            continue;
        }
        let channel_match = range.channels() == channels;
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_match, b_rank, _)) => {
                is_better_candidate(channel_match, rank, *b_match, *b_rank)
            }
        };
        if replace {
            best = Some((channel_match, rank, range));
        }
    }

    best.map(|(_, _, range)| range.with_sample_rate(rate))
        .ok_or_else(|| anyhow!("Device does not support {rate} Hz output"))
}

/// Buffer size for the stream. Deep buffering asks for the largest fixed size the device
/// allows (capped); otherwise the device default is used.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    deep_buffer: bool,
) -> Option<cpal::BufferSize> {
    if !deep_buffer {
        return None;
    }
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let chosen = if *max > DEEP_BUFFER_MAX_FRAMES {
                DEEP_BUFFER_MAX_FRAMES.max(*min)
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::F32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(channel_match: bool, rank: u8, best_match: bool, best_rank: u8) -> bool {
    if channel_match != best_match {
        channel_match
    } else {
        rank < best_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
