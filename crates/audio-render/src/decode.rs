//! Symphonia-backed PCM source.
//!
//! [`SymphoniaSource`] probes a container, decodes its default track and hands out interleaved
//! 16-bit little-endian PCM buffers stamped with their media time:
//! - seeks use accurate mode, reset the decoder and trim decoded audio that precedes the target
//! - a change of the decoded signal spec is reported as a format change before the new audio
//! - corrupt packets are skipped with a warning

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSource as SymphoniaMediaSource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{RenderError, RenderResult};
use crate::format::MediaFormat;
use crate::source::{MediaBuffer, MediaSource, ReadOptions};

struct DecodeState {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    codec_params: CodecParameters,
    track_id: u32,
    time_base: Option<TimeBase>,
    spec: SignalSpec,
    /// Drop decoded frames before this timestamp (set by a seek).
    skip_until_ts: Option<u64>,
    /// Audio decoded right after a spec change, returned by the next read.
    pending: Option<MediaBuffer>,
}

/// Decodes a file or stream into PCM16 buffers for the player.
pub struct SymphoniaSource {
    state: Mutex<DecodeState>,
    format: Mutex<MediaFormat>,
    started: AtomicBool,
}

impl SymphoniaSource {
    /// Open and probe `path`, using its extension as a hint.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        Self::from_media_source(Box::new(file), hint)
    }

    pub fn from_media_source(source: Box<dyn SymphoniaMediaSource>, hint: Hint) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let reader = probed.format;
        let track = reader
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let codec_params = track.codec_params.clone();
        let rate = codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Unknown sample rate"))?;
        let channels = codec_params
            .channels
            .ok_or_else(|| anyhow!("Unknown channels"))?;
        let spec = SignalSpec::new(rate, channels);
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .context("create decoder")?;

        let format = MediaFormat {
            duration_us: duration_us_from_codec_params(&codec_params),
            ..MediaFormat::raw_pcm(rate, channels.count() as u32)
        };

        tracing::info!(
            sample_rate = rate,
            channels = channels.count(),
            duration_us = ?format.duration_us,
            "source probed"
        );

        Ok(Self {
            state: Mutex::new(DecodeState {
                reader,
                decoder,
                time_base: codec_params.time_base,
                codec_params,
                track_id,
                spec,
                skip_until_ts: None,
                pending: None,
            }),
            format: Mutex::new(format),
            started: AtomicBool::new(false),
        })
    }

    fn set_format(&self, spec: SignalSpec) {
        let mut format = self.format.lock().unwrap_or_else(PoisonError::into_inner);
        format.sample_rate = Some(spec.rate);
        format.channel_count = Some(spec.channels.count() as u32);
    }
}

impl MediaSource for SymphoniaSource {
    fn start(&self) -> RenderResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> RenderResult<()> {
        self.started.store(false, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = None;
        Ok(())
    }

    fn format(&self) -> MediaFormat {
        self.format
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read(&self, options: &ReadOptions) -> RenderResult<MediaBuffer> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(RenderError::NotStarted);
        }
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        if let Some(target_us) = options.seek_to_us {
            state.seek(target_us)?;
        } else if let Some(pending) = state.pending.take() {
            return Ok(pending);
        }

        loop {
            let packet = match state.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Err(RenderError::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => {
                    state.rebuild_decoder()?;
                    continue;
                }
                Err(err) => {
                    return Err(RenderError::Io {
                        message: err.to_string(),
                    });
                }
            };
            if packet.track_id() != state.track_id {
                continue;
            }

            let decoded = match state.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    tracing::warn!(ts = packet.ts(), "skipping corrupt packet: {err}");
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    state.rebuild_decoder()?;
                    continue;
                }
                Err(err) => {
                    return Err(RenderError::Decode {
                        message: err.to_string(),
                    });
                }
            };

            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let mut skip = 0usize;
            let mut ts = packet.ts();
            if let Some(required) = state.skip_until_ts {
                if ts + frames as u64 <= required {
                    continue;
                }
                if ts < required {
                    skip = (required - ts) as usize;
                    ts = required;
                }
                state.skip_until_ts = None;
            }

            let mut samples = SampleBuffer::<i16>::new(frames as u64, spec);
            samples.copy_interleaved_ref(decoded);
            let channels = spec.channels.count();
            let data: Vec<u8> = samples.samples()[skip * channels..]
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect();
            let buffer = MediaBuffer::new(data, state.ts_to_us(ts));

            if spec != state.spec {
                tracing::info!(
                    sample_rate = spec.rate,
                    channels,
                    "decoded signal spec changed"
                );
                state.spec = spec;
                state.pending = Some(buffer);
                self.set_format(spec);
                return Err(RenderError::FormatChanged);
            }

            return Ok(buffer);
        }
    }
}

impl DecodeState {
    fn seek(&mut self, target_us: i64) -> RenderResult<()> {
        let target_us = target_us.max(0) as u64;
        let time = Time::new(
            target_us / 1_000_000,
            (target_us % 1_000_000) as f64 / 1_000_000.0,
        );
        self.pending = None;
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|err| match err {
                SymphoniaError::SeekError(SeekErrorKind::OutOfRange) => RenderError::EndOfStream,
                other => RenderError::Io {
                    message: other.to_string(),
                },
            })?;
        self.decoder.reset();
        self.skip_until_ts = Some(seeked.required_ts);
        tracing::debug!(
            target_us,
            required_ts = seeked.required_ts,
            actual_ts = seeked.actual_ts,
            "source seeked"
        );
        Ok(())
    }

    fn rebuild_decoder(&mut self) -> RenderResult<()> {
        tracing::debug!("decoder reset required, rebuilding");
        self.decoder = symphonia::default::get_codecs()
            .make(&self.codec_params, &DecoderOptions::default())
            .map_err(|err| RenderError::Decode {
                message: err.to_string(),
            })?;
        Ok(())
    }

    fn ts_to_us(&self, ts: u64) -> i64 {
        let us = match self.time_base {
            Some(tb) if tb.denom != 0 => {
                u128::from(ts) * u128::from(tb.numer) * 1_000_000 / u128::from(tb.denom)
            }
            _ => u128::from(ts) * 1_000_000 / u128::from(self.spec.rate.max(1)),
        };
        i64::try_from(us).unwrap_or(i64::MAX)
    }
}

/// Best-effort duration from codec metadata.
fn duration_us_from_codec_params(codec_params: &CodecParameters) -> Option<i64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    i64::try_from(frames.saturating_mul(1_000_000) / rate).ok()
}
