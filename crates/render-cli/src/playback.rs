//! CPAL-backed pull sink.
//!
//! [`CpalSink`] implements the player's [`AudioSink`] on top of a CPAL output stream:
//! - the stream lives on its own owner thread, driven by [`StreamCommand`]s
//! - the device callback pulls PCM16 through the player's [`RenderCallback`]
//! - samples are converted to the device format with basic mono↔stereo mapping
//! - frames written and the callback-to-playback latency are tracked for position queries

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{Result, anyhow};
use audio_render::format::OutputFlags;
use audio_render::output::{AudioSink, RenderCallback, SinkOpenParams};
use audio_render::{RenderError, RenderResult};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::device;

enum StreamCommand {
    Play,
    Pause,
    Close,
}

struct StreamHandle {
    cmd_tx: Sender<StreamCommand>,
    thread: JoinHandle<()>,
}

/// Counters shared with the device callback.
#[derive(Default)]
struct StreamCounters {
    frames_written: AtomicU64,
    latency_us: AtomicU64,
    sample_rate: AtomicU64,
}

impl StreamCounters {
    /// Frames the device has played: written minus what is still in flight.
    fn frames_rendered(&self) -> u64 {
        let written = self.frames_written.load(Ordering::Relaxed);
        let rate = self.sample_rate.load(Ordering::Relaxed);
        let in_flight = self.latency_us.load(Ordering::Relaxed) * rate / 1_000_000;
        written.saturating_sub(in_flight)
    }
}

pub struct CpalSink {
    device_name: Option<String>,
    stream: Mutex<Option<StreamHandle>>,
    counters: Arc<StreamCounters>,
    frame_size: AtomicUsize,
    device_label: Mutex<Option<String>>,
}

impl CpalSink {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: Mutex::new(None),
            counters: Arc::new(StreamCounters::default()),
            frame_size: AtomicUsize::new(0),
            device_label: Mutex::new(None),
        }
    }

    /// Description of the opened device, once open.
    pub fn device_label(&self) -> Option<String> {
        self.device_label.lock().ok().and_then(|g| g.clone())
    }

    fn send(&self, cmd: StreamCommand) {
        if let Ok(guard) = self.stream.lock() {
            if let Some(handle) = guard.as_ref() {
                let _ = handle.cmd_tx.send(cmd);
            }
        }
    }
}

impl AudioSink for CpalSink {
    fn open(&self, params: &SinkOpenParams, callback: RenderCallback) -> RenderResult<()> {
        if params.format.is_compressed() {
            return Err(RenderError::Unsupported {
                operation: "compressed output",
            });
        }
        self.close();
        let channels = u16::try_from(params.channels)
            .map_err(|_| RenderError::BadChannelMask { channels: params.channels })?;

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<String, String>>(1);
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<StreamCommand>();
        let setup = StreamSetup {
            device_name: self.device_name.clone(),
            sample_rate: params.sample_rate,
            channels,
            deep_buffer: params.flags == OutputFlags::DeepBuffer,
            counters: self.counters.clone(),
        };

        self.counters.frames_written.store(0, Ordering::Relaxed);
        self.counters.latency_us.store(0, Ordering::Relaxed);
        self.counters
            .sample_rate
            .store(u64::from(params.sample_rate), Ordering::Relaxed);

        let thread = std::thread::Builder::new()
            .name("cpal-stream".to_string())
            .spawn(move || run_stream_owner(setup, callback, cmd_rx, ready_tx))
            .map_err(|e| RenderError::output_init(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(label)) => {
                if let Ok(mut g) = self.device_label.lock() {
                    *g = Some(label);
                }
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                return Err(RenderError::output_init(message));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(RenderError::output_init("stream thread exited"));
            }
        }

        self.frame_size
            .store(usize::from(channels) * 2, Ordering::Relaxed);
        if let Ok(mut g) = self.stream.lock() {
            *g = Some(StreamHandle { cmd_tx, thread });
        }
        Ok(())
    }

    fn start(&self) -> RenderResult<()> {
        if self.stream.lock().map(|g| g.is_none()).unwrap_or(true) {
            return Err(RenderError::NoInit);
        }
        self.send(StreamCommand::Play);
        Ok(())
    }

    fn pause(&self) {
        self.send(StreamCommand::Pause);
    }

    fn stop(&self) {
        self.send(StreamCommand::Pause);
        self.counters.frames_written.store(0, Ordering::Relaxed);
    }

    fn flush(&self) {
        self.counters.frames_written.store(0, Ordering::Relaxed);
    }

    fn close(&self) {
        let handle = self.stream.lock().ok().and_then(|mut g| g.take());
        if let Some(handle) = handle {
            let _ = handle.cmd_tx.send(StreamCommand::Close);
            if handle.thread.join().is_err() {
                tracing::warn!("stream owner thread panicked");
            }
        }
        self.frame_size.store(0, Ordering::Relaxed);
    }

    fn latency_ms(&self) -> u32 {
        u32::try_from(self.counters.latency_us.load(Ordering::Relaxed) / 1000).unwrap_or(u32::MAX)
    }

    fn frame_size(&self) -> usize {
        self.frame_size.load(Ordering::Relaxed)
    }

    fn position(&self) -> RenderResult<u32> {
        Ok(u32::try_from(self.counters.frames_rendered()).unwrap_or(u32::MAX))
    }

    fn needs_trailing_padding(&self) -> bool {
        true
    }

    fn set_playback_rate_permille(&self, permille: u32) -> RenderResult<()> {
        if permille == 1000 {
            Ok(())
        } else {
            Err(RenderError::Unsupported {
                operation: "playback rate change",
            })
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

struct StreamSetup {
    device_name: Option<String>,
    sample_rate: u32,
    channels: u16,
    deep_buffer: bool,
    counters: Arc<StreamCounters>,
}

/// Owns the CPAL stream for its whole life; reports open success through `ready_tx`.
fn run_stream_owner(
    setup: StreamSetup,
    callback: RenderCallback,
    cmd_rx: Receiver<StreamCommand>,
    ready_tx: Sender<Result<String, String>>,
) {
    let (stream, label) = match build_stream_for(&setup, callback) {
        Ok(built) => built,
        Err(e) => {
            tracing::warn!("output stream setup failed: {e:#}");
            let _ = ready_tx.send(Err(format!("{e:#}")));
            return;
        }
    };
    let _ = ready_tx.send(Ok(label));

    while let Ok(cmd) = cmd_rx.recv() {
        let result = match cmd {
            StreamCommand::Play => stream.play().map_err(|e| anyhow!(e)),
            StreamCommand::Pause => stream.pause().map_err(|e| anyhow!(e)),
            StreamCommand::Close => break,
        };
        if let Err(e) = result {
            tracing::warn!("stream control failed: {e:#}");
        }
    }
    drop(stream);
    tracing::debug!("output stream closed");
}

fn build_stream_for(setup: &StreamSetup, callback: RenderCallback) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, setup.device_name.as_deref())?;
    let label = device.description()?.to_string();
    let config = device::pick_output_config(&device, setup.sample_rate, setup.channels)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config, setup.deep_buffer) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        device = %label,
        rate_hz = stream_config.sample_rate,
        device_channels = stream_config.channels,
        source_channels = setup.channels,
        sample_format = ?config.sample_format(),
        buffer_size = ?stream_config.buffer_size,
        "device output config"
    );

    let ctx = CallbackContext {
        callback,
        src_channels: usize::from(setup.channels),
        counters: setup.counters.clone(),
        scratch: Vec::new(),
    };
    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, ctx)?,
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, ctx)?,
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, ctx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, ctx)?,
        other => return Err(anyhow!("Unsupported sample format: {other:?}")),
    };
    Ok((stream, label))
}

struct CallbackContext {
    callback: RenderCallback,
    src_channels: usize,
    counters: Arc<StreamCounters>,
    scratch: Vec<u8>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ctx: CallbackContext,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let dst_channels = usize::from(config.channels);
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
            let ts = info.timestamp();
            if let Some(latency) = ts.playback.duration_since(&ts.callback) {
                ctx.counters
                    .latency_us
                    .store(latency.as_micros() as u64, Ordering::Relaxed);
            }

            let frames = data.len() / dst_channels;
            let want = frames * ctx.src_channels * 2;
            ctx.scratch.resize(want, 0);
            let got = ctx.callback.fill(&mut ctx.scratch[..want]);
            let got_frames = got / (ctx.src_channels * 2);
            let filled = &ctx.scratch[..got_frames * ctx.src_channels * 2];
            write_frames(filled, ctx.src_channels, data, dst_channels);
            ctx.counters
                .frames_written
                .fetch_add(got_frames as u64, Ordering::Relaxed);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Convert interleaved PCM16 LE `src` into `dst`, mapping channels and padding with silence.
fn write_frames<T>(src: &[u8], src_channels: usize, dst: &mut [T], dst_channels: usize)
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    let src_frames = src.len() / (src_channels * 2);
    let silence = <T as cpal::Sample>::from_sample::<i16>(0);
    for (frame, out) in dst.chunks_mut(dst_channels).enumerate() {
        if frame >= src_frames {
            out.fill(silence);
            continue;
        }
        let base = frame * src_channels * 2;
        let sample = |ch: usize| -> i16 {
            let at = base + ch * 2;
            i16::from_le_bytes([src[at], src[at + 1]])
        };
        for (dst_ch, slot) in out.iter_mut().enumerate() {
            let value = match (src_channels, dst_channels) {
                (2, 1) => ((i32::from(sample(0)) + i32::from(sample(1))) / 2) as i16,
                (1, _) => sample(0),
                _ if dst_ch < src_channels => sample(dst_ch),
                _ => 0,
            };
            *slot = <T as cpal::Sample>::from_sample::<i16>(value);
        }
    }
}
