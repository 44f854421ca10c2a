//! streamplay: play a WAVE file through the streaming player as if it were arriving over a
//! network.
//!
//! ## Pipeline
//! 1. **Feed**: a background thread reads the file in chunks and appends them to the player's
//!    input, optionally throttled with `--feed-interval-ms`.
//! 2. **Decode**: once `--prebuffer-bytes` are in and the header parses, the player spawns its
//!    decoder thread, which converts frames into a bounded ring.
//! 3. **Output**: the device callback pulls whole buffers from the ring, or silence when the ring
//!    runs short.
//!
//! ## Modes
//! - `play`: stream to an output device until drained or Ctrl-C.
//! - `render`: stream through a caller-driven device and write the raw PCM it receives.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use streamplay::cli::{Args, Command};
use streamplay::config::{FeedConfig, PlayerConfig, StreamPlayConfig, StreamRenderConfig};
use streamplay::runtime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,streamplay=info,stream_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let player = PlayerConfig {
        gain: args.gain,
        ..Default::default()
    };
    let feed = FeedConfig {
        chunk_bytes: args.chunk_bytes,
        interval: Duration::from_millis(args.feed_interval_ms),
        prebuffer_bytes: args.prebuffer_bytes,
    };

    match args.cmd {
        Some(Command::Play { path }) => {
            let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
            let handler_tx = shutdown_tx.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                let _ = handler_tx.try_send(());
            }) {
                tracing::warn!("ctrl-c handler not installed: {e}");
            }
            let result = runtime::run_play(
                StreamPlayConfig {
                    path,
                    device: args.device,
                    player,
                    feed,
                },
                shutdown_rx,
            );
            drop(shutdown_tx);
            result
        }
        Some(Command::Render { path, out }) => runtime::run_render(StreamRenderConfig {
            path,
            out,
            player,
            feed,
        }),
        None => bail!("no command given; try `streamplay play <path>` or `--help`"),
    }
}
