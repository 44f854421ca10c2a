use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "streamplay", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Linear gain applied while decoding (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    pub gain: f32,

    /// Bytes handed to the player per feed step
    #[arg(long, default_value_t = 16384)]
    pub chunk_bytes: usize,

    /// Delay between feed steps in milliseconds, to simulate a slow network source
    #[arg(long, default_value_t = 0)]
    pub feed_interval_ms: u64,

    /// Bytes buffered before playback is started
    #[arg(long, default_value_t = 4096)]
    pub prebuffer_bytes: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a WAVE file to the output device
    Play {
        /// Path to a WAVE file
        path: PathBuf,
    },

    /// Stream a WAVE file through the player and write the device bytes to a raw PCM file
    Render {
        /// Path to a WAVE file
        path: PathBuf,
        /// Output path for headerless PCM in the device's sample format
        out: PathBuf,
    },
}
