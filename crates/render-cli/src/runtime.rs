//! Render CLI runtime.
//!
//! Wires a decoded file, the cpal sink, and the player together, then runs a small event
//! loop over player notifications, stdin commands, and ctrl-c.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_render::AudioPlayer;
use audio_render::decode::SymphoniaSource;
use audio_render::output::OutputTarget;
use crossbeam_channel::{Receiver, select};
use render_types::{PlaybackEndReason, RenderStatus};

use crate::config::PlayConfig;
use crate::control::{self, ControlCommand};
use crate::device;
use crate::observer::{ChannelObserver, PlayerEvent};
use crate::playback::CpalSink;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Play a local file until it ends or the user quits; returns the final status.
pub fn run_play(config: PlayConfig) -> Result<RenderStatus> {
    let source = SymphoniaSource::open(&config.path)
        .with_context(|| format!("open {:?}", config.path))?;

    let sink = Arc::new(CpalSink::new(config.device.clone()));
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let observer = Arc::new(ChannelObserver::new(event_tx));
    let player = AudioPlayer::new(
        OutputTarget::Sink(sink.clone()),
        Some(observer),
        config.player.clone(),
    );

    player.set_source(Box::new(source))?;
    if let Some(target_us) = config.start_at_us {
        player.seek_to(target_us);
    }
    player.start(false).context("start playback")?;
    if let Some(label) = sink.device_label() {
        tracing::info!(device = %label, "output device");
    }
    let status = player.status();
    tracing::info!(
        path = %config.path.display(),
        sample_rate = ?status.sample_rate,
        channels = ?status.channels,
        "playing"
    );

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    control::spawn_stdin_reader(cmd_tx.clone())?;
    let ctrlc_tx = cmd_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(ControlCommand::Quit);
    }) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }

    let ticker = match config.status_interval {
        Some(interval) => crossbeam_channel::tick(interval),
        None => crossbeam_channel::never(),
    };
    let mut eos_deadline: Receiver<Instant> = crossbeam_channel::never();

    let reason = loop {
        select! {
            recv(event_rx) -> event => {
                let Ok(event) = event else { break PlaybackEndReason::Error };
                match event {
                    PlayerEvent::SeekComplete => tracing::debug!("seek complete"),
                    PlayerEvent::Eos { delay_us } => {
                        let delay = Duration::from_micros(u64::try_from(delay_us).unwrap_or(0));
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "source drained");
                        eos_deadline = crossbeam_channel::at(Instant::now() + delay);
                    }
                    PlayerEvent::OffloadTearDown => {
                        tracing::warn!("offload output torn down");
                        break PlaybackEndReason::Error;
                    }
                }
            }
            recv(cmd_rx) -> cmd => {
                let Ok(cmd) = cmd else { break PlaybackEndReason::Stopped };
                if let Some(reason) = apply_command(&player, cmd, &mut eos_deadline) {
                    break reason;
                }
            }
            recv(ticker) -> _ => {
                let status = player.status();
                tracing::info!(
                    elapsed_ms = status.elapsed_ms(),
                    frames = status.frames_played,
                    paused = status.paused,
                    "status"
                );
            }
            recv(eos_deadline) -> _ => {
                break end_reason_after_drain(&player);
            }
        }
    };

    let mut status = player.status();
    player.reset();
    status.started = false;
    status.end_reason = Some(reason);
    tracing::info!(?reason, elapsed_ms = status.elapsed_ms(), "playback finished");
    Ok(status)
}

fn apply_command(
    player: &AudioPlayer,
    cmd: ControlCommand,
    eos_deadline: &mut Receiver<Instant>,
) -> Option<PlaybackEndReason> {
    let result = match cmd {
        ControlCommand::Pause => player.pause(false),
        ControlCommand::PauseAndDrain => player.pause(true),
        ControlCommand::Resume => player.resume(),
        ControlCommand::Seek { target_us } => {
            *eos_deadline = crossbeam_channel::never();
            player.seek_to(target_us);
            Ok(())
        }
        ControlCommand::Status => {
            match serde_json::to_string(&player.status()) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!("status encode failed: {e}"),
            }
            Ok(())
        }
        ControlCommand::Quit => return Some(PlaybackEndReason::Stopped),
    };
    if let Err(e) = result {
        tracing::warn!(?cmd, "command failed: {e}");
    }
    None
}

fn end_reason_after_drain(player: &AudioPlayer) -> PlaybackEndReason {
    match player.reached_eos() {
        (_, Err(e)) if !e.is_end_of_stream() => {
            tracing::warn!("playback ended early: {e}");
            PlaybackEndReason::Error
        }
        _ => PlaybackEndReason::Eof,
    }
}
