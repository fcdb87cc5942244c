//! Player lifecycle and the session state shared with the render callback.
//!
//! One [`AudioPlayer`] drives one source into one output:
//! - `set_source` attaches the source, `start` negotiates the format and opens the output,
//! - the output then pulls bytes through its [`RenderCallback`](crate::output::RenderCallback),
//! - `pause`/`resume`/`seek_to` are called from the owner while the callback keeps running,
//! - `reset` tears the session down and waits for the source to be fully released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use render_types::RenderStatus;

use crate::clock::{Clock, PositionClock, SystemClock, TimeMapping};
use crate::config::{PlaybackConfig, PlayerOptions};
use crate::cursor::BufferCursor;
use crate::drain::StreamStatus;
use crate::error::{RenderError, RenderResult};
use crate::observer::PlayerObserver;
use crate::output::{AudioOutput, OutputTarget, RenderCallback, SinkOpenParams, open_output};
use crate::seek::{self, SeekRequest};
use crate::source::{MediaSource, ReadOptions, SourceHandle, SourceSlot};
use crate::status;

/// Offload-only bookkeeping.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct OffloadState {
    /// Source exhausted; waiting for the output's stream-end event.
    pub(crate) post_eos_pending: bool,
    /// Media time the hardware position counts from.
    pub(crate) start_pos_us: i64,
    /// Move `start_pos_us` to the timestamp of the next buffer read.
    pub(crate) reanchor: bool,
}

/// Everything one started session mutates. Guarded by [`Shared::session`].
#[derive(Default)]
pub(crate) struct Session {
    /// Bumped on every start and reset so a fill that straddles one can tell.
    pub(crate) generation: u64,
    pub(crate) started: bool,
    pub(crate) paused: bool,
    pub(crate) config: Option<PlaybackConfig>,
    pub(crate) source: Option<SourceSlot>,
    pub(crate) output: Option<Arc<dyn AudioOutput>>,
    pub(crate) position: PositionClock,
    pub(crate) seek: SeekRequest,
    pub(crate) stream: StreamStatus,
    pub(crate) cursor: BufferCursor,
    pub(crate) offload: OffloadState,
}

impl Session {
    pub(crate) fn is_offload(&self) -> bool {
        self.config.as_ref().is_some_and(PlaybackConfig::is_offload)
    }

    /// Observe a pending seek on behalf of the render callback.
    pub(crate) fn consume_pending_seek(&mut self) -> Option<i64> {
        seek::consume_pending(&mut self.seek, &mut self.cursor)
    }

    pub(crate) fn media_time_us(&self, now_us: i64) -> i64 {
        let seek_target = self.seek.target_if_pending();
        if self.position.mapping().is_none() {
            return seek_target.unwrap_or(0);
        }
        if self.is_offload() {
            // Offload buffers are huge; ask the hardware how far it got (milliseconds).
            let position_ms = self
                .output
                .as_ref()
                .and_then(|output| output.position().ok())
                .unwrap_or(0);
            return i64::from(position_ms) * 1000 + self.offload.start_pos_us;
        }
        self.position.media_time_us(now_us, seek_target)
    }
}

/// State shared between the owner-facing [`AudioPlayer`] and the render callback.
pub(crate) struct Shared {
    pub(crate) session: Mutex<Session>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) observer: Option<Arc<dyn PlayerObserver>>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn now_us(&self) -> i64 {
        self.clock.now_us()
    }
}

/// Pulls audio from a [`MediaSource`] into an output on demand and tracks playback time.
pub struct AudioPlayer {
    shared: Arc<Shared>,
    target: OutputTarget,
    options: PlayerOptions,
}

impl AudioPlayer {
    pub fn new(
        target: OutputTarget,
        observer: Option<Arc<dyn PlayerObserver>>,
        options: PlayerOptions,
    ) -> Self {
        Self::with_clock(target, observer, options, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        target: OutputTarget,
        observer: Option<Arc<dyn PlayerObserver>>,
        options: PlayerOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut session = Session::default();
        session.position.reset(clock.now_us());
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                clock,
                observer,
            }),
            target,
            options,
        }
    }

    /// Attach the source for the next session. Only one source may be attached at a time.
    pub fn set_source(&self, source: Box<dyn MediaSource>) -> RenderResult<()> {
        let mut session = self.shared.lock();
        if session.source.is_some() {
            return Err(RenderError::SourceAlreadySet);
        }
        session.source = Some(SourceSlot::new(source));
        Ok(())
    }

    /// Start the source (unless `source_already_started`), negotiate the format, open the
    /// output and begin playback.
    ///
    /// On failure the output is not held, and the source is stopped again unless it was
    /// already running.
    pub fn start(&self, source_already_started: bool) -> RenderResult<()> {
        let (handle, seek_target) = {
            let mut session = self.shared.lock();
            if session.started {
                return Err(RenderError::AlreadyStarted);
            }
            let handle = session
                .source
                .as_ref()
                .ok_or(RenderError::NoSource)?
                .handle();
            (handle, session.seek.take())
        };

        if !source_already_started {
            handle.start()?;
        }

        // An initial format change is allowed; otherwise keep the buffer for the first fill.
        let options = ReadOptions {
            seek_to_us: seek_target,
        };
        let first = match handle.read(&options) {
            Err(RenderError::FormatChanged) => {
                tracing::debug!("source signalled a format change before playback");
                None
            }
            other => Some(other),
        };

        let format = handle.format();
        let mut config = match PlaybackConfig::negotiate(&format, &self.options) {
            Ok(config) => config,
            Err(err) => {
                abort_start(&handle, source_already_started);
                return Err(err);
            }
        };

        let params = SinkOpenParams {
            sample_rate: config.sample_rate,
            channels: config.channels,
            channel_mask: config.channel_mask,
            bit_rate: config.bit_rate,
            format: config.format,
            buffer_count: self.options.buffer_count,
            flags: config.output_flags,
        };
        let callback = RenderCallback::new(&self.shared);
        let output = match open_output(&self.target, params, callback, &format) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(error = %err, "failed to open audio output");
                abort_start(&handle, source_already_started);
                return Err(err);
            }
        };

        let latency_us = output.latency_us();
        config.frame_size = output.frame_size();
        if config.frame_size == 0 {
            output.release();
            abort_start(&handle, source_already_started);
            return Err(RenderError::output_init("output reported a zero frame size"));
        }

        {
            let mut session = self.shared.lock();
            if session.started {
                output.release();
                abort_start(&handle, source_already_started);
                return Err(RenderError::AlreadyStarted);
            }
            let now = self.shared.now_us();
            session.generation += 1;
            session.started = true;
            session.paused = false;
            session.position.reset(now);
            session.position.configure(config.sample_rate, latency_us);
            session.cursor = BufferCursor::default();
            if let Some(first) = first {
                session.cursor.prime(first);
            }
            session.stream.clear();
            session.offload.post_eos_pending = false;
            session.offload.reanchor = config.is_offload() && seek_target.is_some();
            session.config = Some(config.clone());
            session.output = Some(output.clone());
        }

        if let Err(err) = output.start() {
            tracing::warn!(error = %err, "failed to start audio output");
            {
                let mut session = self.shared.lock();
                let now = self.shared.now_us();
                session.generation += 1;
                session.started = false;
                session.output = None;
                session.config = None;
                session.cursor.discard_all();
                session.stream.clear();
                session.position.reset(now);
                session.offload.post_eos_pending = false;
                session.offload.reanchor = false;
                if let Some(target_us) = seek_target {
                    session.seek.request(target_us);
                }
            }
            output.release();
            abort_start(&handle, source_already_started);
            return Err(err);
        }
        drop(handle);

        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            frame_size = config.frame_size,
            latency_us,
            flags = ?config.output_flags,
            "audio player started"
        );
        Ok(())
    }

    /// Pause the output.
    ///
    /// With `play_pending_samples` the output is stopped outright, which lets whatever it has
    /// queued play out, and the frame count restarts from zero. Otherwise the output is paused
    /// and the clock is pinned until the next fill.
    pub fn pause(&self, play_pending_samples: bool) -> RenderResult<()> {
        let output = self.started_output()?;
        if play_pending_samples {
            output.stop();
        } else {
            output.pause();
        }

        let mut session = self.shared.lock();
        let now = self.shared.now_us();
        if play_pending_samples {
            session.position.reset_frames(now);
        } else {
            session.position.pin(now);
        }
        session.paused = true;
        tracing::debug!(play_pending_samples, "audio player paused");
        Ok(())
    }

    /// Restart the output. The clock un-pins on the next fill.
    pub fn resume(&self) -> RenderResult<()> {
        let output = self.started_output()?;
        output.start()?;
        self.shared.lock().paused = false;
        tracing::debug!("audio player resumed");
        Ok(())
    }

    /// Stop and release the output, stop the source and wait until it is fully released.
    ///
    /// Session state is zeroed; a new source may be attached afterwards. No-op when not
    /// started.
    pub fn reset(&self) {
        let (output, source) = {
            let mut session = self.shared.lock();
            if !session.started {
                return;
            }
            session.started = false;
            session.generation += 1;
            session.cursor.discard_all();
            (session.output.take(), session.source.take())
        };

        if let Some(output) = output {
            output.release();
        }
        if let Some(source) = source {
            if let Err(err) = source.handle().stop() {
                tracing::warn!(error = %err, "source failed to stop");
            }
            source.release_and_wait();
        }

        let mut session = self.shared.lock();
        let now = self.shared.now_us();
        session.position.reset(now);
        session.seek.clear();
        session.stream.clear();
        session.offload = OffloadState::default();
        session.config = None;
        session.paused = false;
        tracing::info!("audio player reset");
    }

    /// Reposition to `target_us`.
    ///
    /// The render callback observes the request on its next iteration, discards whatever it
    /// still holds from before the seek and reads from the new position. Before start, the
    /// target is applied to the initial read instead.
    pub fn seek_to(&self, target_us: i64) {
        let mut session = self.shared.lock();
        let now = self.shared.now_us();
        session.seek.request(target_us);
        session.position.invalidate_mapping();
        session.stream.reached_eos = false;
        if self.options.offload.is_some() {
            session.offload.start_pos_us = target_us;
        }
        // The output's position restarts at zero after a flush.
        session.position.reset_frames(now);
        if let Some(output) = session.output.as_ref() {
            output.flush();
        }
        tracing::debug!(target_us, "seek requested");
    }

    pub fn is_seeking(&self) -> bool {
        self.shared.lock().seek.is_pending()
    }

    /// Whether the stream has ended, with the status of the read that ended it.
    pub fn reached_eos(&self) -> (bool, RenderResult<()>) {
        let session = self.shared.lock();
        (session.stream.reached_eos, session.stream.final_result())
    }

    /// Real time of the audio being heard, in microseconds.
    pub fn real_time_us(&self) -> i64 {
        let session = self.shared.lock();
        debug_assert!(session.started, "real_time_us called before start");
        if !session.started {
            return 0;
        }
        session.position.real_time_us(self.shared.now_us())
    }

    /// Media time of the audio being heard, in microseconds.
    pub fn media_time_us(&self) -> i64 {
        let session = self.shared.lock();
        session.media_time_us(self.shared.now_us())
    }

    /// The last established real/media time pair, if any.
    pub fn media_time_mapping(&self) -> Option<TimeMapping> {
        self.shared.lock().position.mapping()
    }

    pub fn set_playback_rate_permille(&self, permille: u32) -> RenderResult<()> {
        let (output, sample_rate) = {
            let session = self.shared.lock();
            let output = session.output.clone().ok_or(RenderError::NoInit)?;
            (output, session.position.sample_rate())
        };
        output.set_playback_rate(permille, sample_rate)
    }

    /// Source exhausted in offload mode and the output has not reported stream end yet.
    pub fn offload_post_eos_pending(&self) -> bool {
        self.shared.lock().offload.post_eos_pending
    }

    pub fn is_started(&self) -> bool {
        self.shared.lock().started
    }

    pub fn status(&self) -> RenderStatus {
        let session = self.shared.lock();
        status::snapshot(&session, self.shared.now_us())
    }

    fn started_output(&self) -> RenderResult<Arc<dyn AudioOutput>> {
        let session = self.shared.lock();
        if !session.started {
            return Err(RenderError::NotStarted);
        }
        session.output.clone().ok_or(RenderError::NoInit)
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        if self.is_started() {
            self.reset();
        }
    }
}

fn abort_start(handle: &SourceHandle, source_already_started: bool) {
    if !source_already_started {
        if let Err(err) = handle.stop() {
            tracing::warn!(error = %err, "source failed to stop after aborted start");
        }
    }
}
