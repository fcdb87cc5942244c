//! Interactive playback commands read from stdin.
//!
//! One command per line:
//! - `p` pause, `P` pause and let queued audio play out, `r` resume
//! - `s <secs>` seek, `t` print status, `q` quit

use std::io::BufRead;
use std::thread::JoinHandle;

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;

use crate::config::seconds_to_us;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    Pause,
    PauseAndDrain,
    Resume,
    Seek { target_us: i64 },
    Status,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ControlCommand> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().ok_or_else(|| anyhow!("empty command"))?;
    let parsed = match cmd {
        "p" => ControlCommand::Pause,
        "P" => ControlCommand::PauseAndDrain,
        "r" => ControlCommand::Resume,
        "t" => ControlCommand::Status,
        "q" => ControlCommand::Quit,
        "s" => {
            let secs = parts
                .next()
                .ok_or_else(|| anyhow!("seek needs a position in seconds"))?
                .parse::<f64>()
                .map_err(|e| anyhow!("bad seek position: {e}"))?;
            ControlCommand::Seek {
                target_us: seconds_to_us(secs)?,
            }
        }
        other => return Err(anyhow!("unknown command: {other}")),
    };
    if parts.next().is_some() {
        return Err(anyhow!("unexpected trailing input"));
    }
    Ok(parsed)
}

/// Read commands from stdin until EOF or the receiver goes away.
pub fn spawn_stdin_reader(tx: Sender<ControlCommand>) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("stdin-control".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("{e}"),
                }
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_letter_commands() {
        assert_eq!(parse_command("p").unwrap(), ControlCommand::Pause);
        assert_eq!(parse_command("P").unwrap(), ControlCommand::PauseAndDrain);
        assert_eq!(parse_command(" r ").unwrap(), ControlCommand::Resume);
        assert_eq!(parse_command("t").unwrap(), ControlCommand::Status);
        assert_eq!(parse_command("q").unwrap(), ControlCommand::Quit);
    }

    #[test]
    fn parses_seek_in_seconds() {
        assert_eq!(
            parse_command("s 2.25").unwrap(),
            ControlCommand::Seek {
                target_us: 2_250_000
            }
        );
        assert!(parse_command("s").is_err());
        assert!(parse_command("s abc").is_err());
        assert!(parse_command("s -1").is_err());
    }

    #[test]
    fn rejects_unknown_and_trailing_input() {
        assert!(parse_command("x").is_err());
        assert!(parse_command("p now").is_err());
        assert!(parse_command("").is_err());
    }
}
