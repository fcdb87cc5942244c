//! The fill callback.
//!
//! Each call drains the current buffer into the output's destination, refilling from the
//! source as needed. Blocking reads happen with the session lock released; the session is
//! re-checked once the read returns and the result is thrown away if it went stale.

use crate::drain::{DrainOutcome, DrainPolicy};
use crate::error::RenderError;
use crate::player::Shared;
use crate::source::ReadOptions;

impl Shared {
    /// Fill `dst` from the source. Returns the number of bytes written; 0 once the stream has
    /// ended or the session went away.
    pub(crate) fn fill_buffer(&self, dst: &mut [u8]) -> usize {
        let (generation, frame_size) = {
            let session = self.lock();
            if !session.started || session.stream.reached_eos {
                return 0;
            }
            let Some(frame_size) = session.config.as_ref().map(|c| c.frame_size) else {
                return 0;
            };
            (session.generation, frame_size)
        };

        let mut done = 0usize;
        let mut post_seek_complete = false;
        let mut post_eos: Option<i64> = None;

        while done < dst.len() {
            let mut session = self.lock();
            if session.generation != generation {
                return 0;
            }

            let mut options = ReadOptions::default();
            if let Some(target) = session.consume_pending_seek() {
                options.seek_to_us = Some(target);
                post_seek_complete = self.observer.is_some();
                if session.is_offload() {
                    session.offload.reanchor = true;
                }
            }

            if !session.cursor.has_current() {
                let result = match session.cursor.take_first() {
                    Some(first) => first,
                    None => {
                        let Some(handle) = session.source.as_ref().map(|s| s.handle()) else {
                            return 0;
                        };
                        drop(session);
                        let result = handle.read(&options);
                        drop(handle);

                        session = self.lock();
                        if session.generation != generation || !session.started {
                            return 0;
                        }
                        if session.seek.is_pending() {
                            tracing::debug!("dropping read made stale by a seek");
                            continue;
                        }
                        if session.stream.reached_eos {
                            break;
                        }
                        result
                    }
                };

                match result {
                    Err(err) => {
                        let frames_played = session.position.frames_played();
                        let additional_frames = (done / frame_size) as u64;
                        if let Some(output) = session.output.clone() {
                            let policy = DrainPolicy {
                                sample_rate: session.position.sample_rate(),
                                latency_us: session.position.latency_us(),
                                offload: session.is_offload(),
                            };
                            match policy.on_source_exhausted(
                                frames_played,
                                output.position(),
                                additional_frames,
                                output.needs_trailing_padding(),
                            ) {
                                DrainOutcome::NotifyAfter { delay_us } => {
                                    post_eos = Some(delay_us);
                                }
                                DrainOutcome::OffloadPending => {
                                    session.offload.post_eos_pending = true;
                                    output.set_offload_eos_reached(true);
                                }
                            }
                        }
                        match &err {
                            RenderError::EndOfStream => tracing::debug!("source reached end of stream"),
                            RenderError::FormatChanged => {
                                tracing::warn!("source changed format mid-stream, ending playback")
                            }
                            other => tracing::warn!(error = %other, "source read failed"),
                        }
                        session.stream.mark_eos(err);
                        break;
                    }
                    Ok(buffer) => {
                        let latency_us = session.output.as_ref().map(|o| o.latency_us());
                        if let Some(latency_us) = latency_us {
                            session.position.set_latency_us(latency_us);
                        }
                        let media_us = if buffer.is_empty() { None } else { buffer.time_us() };
                        session
                            .position
                            .record_buffer(media_us, (done / frame_size) as u64);
                        if session.offload.reanchor {
                            if let Some(media_us) = media_us {
                                session.offload.start_pos_us = media_us;
                                session.offload.reanchor = false;
                                tracing::debug!(start_pos_us = media_us, "offload position re-anchored");
                            }
                        }
                        tracing::trace!(
                            bytes = buffer.range_length(),
                            media_us = ?media_us,
                            "adopted source buffer"
                        );
                        session.cursor.adopt(buffer);
                    }
                }
            }

            if session.cursor.remaining() == 0 {
                session.cursor.release();
                continue;
            }

            done += session.cursor.copy_into(&mut dst[done..]);
        }

        {
            let mut session = self.lock();
            if session.generation != generation {
                return 0;
            }
            let now = self.now_us();
            let reached_eos = session.stream.reached_eos;
            session
                .position
                .advance((done / frame_size) as u64, now, reached_eos);
        }

        if let Some(observer) = self.observer.as_ref() {
            if let Some(delay_us) = post_eos {
                tracing::debug!(delay_us, "posting end of stream");
                observer.post_audio_eos(delay_us);
            }
            if post_seek_complete {
                observer.post_audio_seek_complete();
            }
        }

        done
    }

    /// Offload output finished playing everything.
    pub(crate) fn on_stream_end(&self) {
        {
            let mut session = self.lock();
            if !session.started || !session.is_offload() {
                tracing::debug!("ignoring stream end outside an offload session");
                return;
            }
            session.stream.reached_eos = true;
            session.offload.post_eos_pending = false;
        }
        tracing::debug!("offload stream end");
        if let Some(observer) = self.observer.as_ref() {
            observer.post_audio_eos(0);
        }
    }

    pub(crate) fn on_tear_down(&self) {
        tracing::warn!("offload output torn down");
        if let Some(observer) = self.observer.as_ref() {
            observer.post_audio_offload_tear_down();
        }
    }
}
