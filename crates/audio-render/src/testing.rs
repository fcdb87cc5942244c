//! In-crate fakes for driving the player without an audio device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::error::{RenderError, RenderResult};
use crate::format::{MediaFormat, OutputFlags};
use crate::observer::PlayerObserver;
use crate::output::{
    AudioSink, AudioTrack, RenderCallback, SinkOpenParams, TrackFactory, TrackParams,
};
use crate::source::{MediaBuffer, MediaSource, ReadOptions};

/// Buffer of `len` bytes with a recognizable pattern starting at `seed`.
pub fn pcm_buffer(len: usize, time_us: i64, seed: u8) -> MediaBuffer {
    let data = (0..len).map(|i| seed.wrapping_add(i as u8)).collect();
    MediaBuffer::new(data, time_us)
}

pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_us: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_us),
        })
    }

    pub fn advance(&self, us: i64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    Start,
    Stop,
    Read(ReadOptions),
}

pub type SourceLog = Arc<Mutex<Vec<SourceEvent>>>;
type ReadHook = Box<dyn FnMut(&ReadOptions) + Send>;

/// Source that replays a fixed script of read results, then reports end of stream.
pub struct ScriptedSource {
    format: MediaFormat,
    script: Mutex<VecDeque<RenderResult<MediaBuffer>>>,
    log: SourceLog,
    hook: Mutex<Option<ReadHook>>,
}

impl ScriptedSource {
    pub fn new(
        format: MediaFormat,
        script: impl IntoIterator<Item = RenderResult<MediaBuffer>>,
    ) -> Self {
        Self {
            format,
            script: Mutex::new(script.into_iter().collect()),
            log: Arc::default(),
            hook: Mutex::new(None),
        }
    }

    /// Run `hook` at the start of every read, before the script advances.
    pub fn with_read_hook(self, hook: impl FnMut(&ReadOptions) + Send + 'static) -> Self {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn log(&self) -> SourceLog {
        self.log.clone()
    }
}

impl MediaSource for ScriptedSource {
    fn start(&self) -> RenderResult<()> {
        self.log.lock().unwrap().push(SourceEvent::Start);
        Ok(())
    }

    fn stop(&self) -> RenderResult<()> {
        self.log.lock().unwrap().push(SourceEvent::Stop);
        Ok(())
    }

    fn format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn read(&self, options: &ReadOptions) -> RenderResult<MediaBuffer> {
        if let Some(hook) = self.hook.lock().unwrap().as_mut() {
            hook(options);
        }
        self.log.lock().unwrap().push(SourceEvent::Read(*options));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RenderError::EndOfStream))
    }
}

pub fn reads(log: &SourceLog) -> Vec<ReadOptions> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            SourceEvent::Read(options) => Some(*options),
            _ => None,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    Open,
    Start,
    Pause,
    Stop,
    Flush,
    Close,
}

#[derive(Debug)]
pub struct SinkState {
    pub opened: Option<SinkOpenParams>,
    pub events: Vec<OutputEvent>,
    pub position: u32,
    pub latency_ms: u32,
    pub needs_trailing_padding: bool,
    pub supports_offload: bool,
    pub fail_open: bool,
    pub fail_start: bool,
    pub offload_eos_reached: bool,
    pub metadata: Option<MediaFormat>,
    pub rate_permille: Option<u32>,
}

/// Pull sink that only moves data when a test calls [`RecordingSink::pull`].
pub struct RecordingSink {
    pub state: Mutex<SinkState>,
    callback: Mutex<Option<RenderCallback>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SinkState {
                opened: None,
                events: Vec::new(),
                position: 0,
                latency_ms: 20,
                needs_trailing_padding: true,
                supports_offload: false,
                fail_open: false,
                fail_start: false,
                offload_eos_reached: false,
                metadata: None,
                rate_permille: None,
            }),
            callback: Mutex::new(None),
        })
    }

    pub fn configure(self: &Arc<Self>, f: impl FnOnce(&mut SinkState)) -> Arc<Self> {
        f(&mut self.state.lock().unwrap());
        self.clone()
    }

    /// Ask the player for `len` bytes, as the device callback would.
    pub fn pull(&self, len: usize) -> Vec<u8> {
        let callback = self.callback.lock().unwrap().clone();
        let mut buf = vec![0u8; len];
        let written = callback.map_or(0, |cb| cb.fill(&mut buf));
        buf.truncate(written);
        buf
    }

    /// The callback handed over by the last `open`, if the sink is still open.
    pub fn callback(&self) -> Option<RenderCallback> {
        self.callback.lock().unwrap().clone()
    }

    pub fn stream_end(&self) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(cb) = callback {
            cb.on_stream_end();
        }
    }

    pub fn tear_down(&self) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(cb) = callback {
            cb.on_tear_down();
        }
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.state.lock().unwrap().events.clone()
    }

    fn record(&self, event: OutputEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl AudioSink for RecordingSink {
    fn open(&self, params: &SinkOpenParams, callback: RenderCallback) -> RenderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(OutputEvent::Open);
        if state.fail_open {
            return Err(RenderError::output_init("device busy"));
        }
        state.opened = Some(params.clone());
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn start(&self) -> RenderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(OutputEvent::Start);
        if state.fail_start {
            return Err(RenderError::output_init("start failed"));
        }
        Ok(())
    }

    fn pause(&self) {
        self.record(OutputEvent::Pause);
    }

    fn stop(&self) {
        self.record(OutputEvent::Stop);
    }

    fn flush(&self) {
        self.record(OutputEvent::Flush);
    }

    fn close(&self) {
        self.record(OutputEvent::Close);
        *self.callback.lock().unwrap() = None;
    }

    fn latency_ms(&self) -> u32 {
        self.state.lock().unwrap().latency_ms
    }

    fn frame_size(&self) -> usize {
        let state = self.state.lock().unwrap();
        match state.opened.as_ref() {
            Some(params) if params.flags == OutputFlags::CompressOffload => 1,
            Some(params) => params.channels as usize * 2,
            None => 0,
        }
    }

    fn position(&self) -> RenderResult<u32> {
        Ok(self.state.lock().unwrap().position)
    }

    fn needs_trailing_padding(&self) -> bool {
        self.state.lock().unwrap().needs_trailing_padding
    }

    fn set_playback_rate_permille(&self, permille: u32) -> RenderResult<()> {
        self.state.lock().unwrap().rate_permille = Some(permille);
        Ok(())
    }

    fn supports_offload(&self) -> bool {
        self.state.lock().unwrap().supports_offload
    }

    fn set_offload_eos_reached(&self, reached: bool) {
        self.state.lock().unwrap().offload_eos_reached = reached;
    }

    fn send_offload_metadata(&self, format: &MediaFormat) {
        self.state.lock().unwrap().metadata = Some(format.clone());
    }
}

#[derive(Debug, Default)]
pub struct TrackState {
    pub params: Option<TrackParams>,
    pub events: Vec<OutputEvent>,
    pub sample_rate: Option<u32>,
}

/// Factory for callback tracks whose callback tests drive by hand.
#[derive(Default)]
pub struct RecordingTrackFactory {
    pub state: Arc<Mutex<TrackState>>,
    callback: Mutex<Option<RenderCallback>>,
}

impl RecordingTrackFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pull(&self, len: usize) -> Vec<u8> {
        let callback = self.callback.lock().unwrap().clone();
        let mut buf = vec![0u8; len];
        let written = callback.map_or(0, |cb| cb.fill(&mut buf));
        buf.truncate(written);
        buf
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.state.lock().unwrap().events.clone()
    }
}

impl TrackFactory for RecordingTrackFactory {
    fn create(
        &self,
        params: &TrackParams,
        callback: RenderCallback,
    ) -> RenderResult<Box<dyn AudioTrack>> {
        self.state.lock().unwrap().params = Some(params.clone());
        *self.callback.lock().unwrap() = Some(callback);
        Ok(Box::new(RecordingTrack {
            state: self.state.clone(),
            frame_size: params.channels as usize * 2,
        }))
    }
}

struct RecordingTrack {
    state: Arc<Mutex<TrackState>>,
    frame_size: usize,
}

impl RecordingTrack {
    fn record(&self, event: OutputEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl AudioTrack for RecordingTrack {
    fn start(&self) -> RenderResult<()> {
        self.record(OutputEvent::Start);
        Ok(())
    }

    fn pause(&self) {
        self.record(OutputEvent::Pause);
    }

    fn stop(&self) {
        self.record(OutputEvent::Stop);
    }

    fn flush(&self) {
        self.record(OutputEvent::Flush);
    }

    fn latency_ms(&self) -> u32 {
        10
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn position(&self) -> RenderResult<u32> {
        Ok(0)
    }

    fn set_sample_rate(&self, sample_rate: u32) -> RenderResult<()> {
        self.state.lock().unwrap().sample_rate = Some(sample_rate);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    SeekComplete,
    Eos(i64),
    TearDown,
}

#[derive(Default)]
pub struct RecordingObserver {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl PlayerObserver for RecordingObserver {
    fn post_audio_seek_complete(&self) {
        self.notifications.lock().unwrap().push(Notification::SeekComplete);
    }

    fn post_audio_eos(&self, delay_us: i64) {
        self.notifications.lock().unwrap().push(Notification::Eos(delay_us));
    }

    fn post_audio_offload_tear_down(&self) {
        self.notifications.lock().unwrap().push(Notification::TearDown);
    }
}
