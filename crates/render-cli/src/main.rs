//! Render CLI: plays a local file through the pull-model render pump and a cpal output.
//!
//! While playing, stdin accepts one-letter commands (`p`, `P`, `r`, `s <secs>`, `t`, `q`).
//! When playback ends the final status is printed to stdout as JSON.

mod cli;
mod config;
mod control;
mod device;
mod observer;
mod playback;
mod runtime;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,render_cli=info,audio_render=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match &args.cmd {
        Some(cli::Command::Play { path, start_at }) => {
            let config = config::PlayConfig::from_args(&args, path.clone(), *start_at)?;
            let status = runtime::run_play(config)?;
            let json = serde_json::to_string(&status).context("encode final status")?;
            println!("{json}");
        }
        None => anyhow::bail!("nothing to do: pass a subcommand or --list-devices"),
    }

    Ok(())
}
