//! Status snapshot for front-ends.

use render_types::{PlaybackEndReason, RenderStatus};

use crate::error::RenderError;
use crate::player::Session;

pub(crate) fn snapshot(session: &Session, now_us: i64) -> RenderStatus {
    let config = session.config.as_ref();
    let final_status = match &session.stream.final_status {
        None | Some(RenderError::EndOfStream) => None,
        Some(err) => Some(err.to_string()),
    };
    let end_reason = if session.stream.reached_eos && !session.offload.post_eos_pending {
        Some(if final_status.is_some() {
            PlaybackEndReason::Error
        } else {
            PlaybackEndReason::Eof
        })
    } else {
        None
    };

    RenderStatus {
        started: session.started,
        paused: session.paused,
        seeking: session.seek.is_pending(),
        reached_eos: session.stream.reached_eos,
        offload: session.is_offload(),
        frames_played: session.position.frames_played(),
        media_time_us: session.media_time_us(now_us),
        sample_rate: config.map(|c| c.sample_rate),
        channels: config.and_then(|c| u16::try_from(c.channels).ok()),
        latency_us: session.started.then(|| session.position.latency_us()),
        final_status,
        end_reason,
    }
}
