use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "render-cli", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Ask the device for large buffers (higher latency, fewer wakeups)
    #[arg(long)]
    pub deep_buffer: bool,

    /// Buffer count requested when opening the output
    #[arg(long, default_value_t = audio_render::config::DEFAULT_SINK_BUFFER_COUNT)]
    pub buffer_count: u32,

    /// Log a status line this often (milliseconds, 0 disables)
    #[arg(long, default_value_t = 0)]
    pub status_interval_ms: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a local file
    Play {
        /// Path to audio file
        path: PathBuf,

        /// Start position in seconds
        #[arg(long)]
        start_at: Option<f64>,
    },
}
