use audio_render::observer::PlayerObserver;
use crossbeam_channel::Sender;

/// Player notifications, forwarded to the runtime's event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    SeekComplete,
    Eos { delay_us: i64 },
    OffloadTearDown,
}

/// Observer that turns callbacks into [`PlayerEvent`]s on a channel.
pub struct ChannelObserver {
    tx: Sender<PlayerEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<PlayerEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: PlayerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(?event, "event loop gone, dropping player event");
        }
    }
}

impl PlayerObserver for ChannelObserver {
    fn post_audio_seek_complete(&self) {
        self.send(PlayerEvent::SeekComplete);
    }

    fn post_audio_eos(&self, delay_us: i64) {
        self.send(PlayerEvent::Eos { delay_us });
    }

    fn post_audio_offload_tear_down(&self) {
        self.send(PlayerEvent::OffloadTearDown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_events_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let observer = ChannelObserver::new(tx);
        observer.post_audio_eos(1_500);
        observer.post_audio_seek_complete();
        observer.post_audio_offload_tear_down();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PlayerEvent::Eos { delay_us: 1_500 },
                PlayerEvent::SeekComplete,
                PlayerEvent::OffloadTearDown
            ]
        );
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        ChannelObserver::new(tx).post_audio_seek_complete();
    }
}
