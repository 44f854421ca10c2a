//! Feeder thread: reads a file in chunks and appends it to the player's input.
//!
//! The feeder stands in for a network source. It never waits on the player; the main thread
//! learns about progress through [`FeedEvent`]s.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use stream_player::SourceFeed;

use crate::config::FeedConfig;

#[derive(Debug)]
pub(crate) enum FeedEvent {
    /// A chunk was appended; `total` bytes buffered so far.
    Appended { total: usize },
    /// End of file reached and the input marked complete.
    Finished { total: usize },
    Failed(anyhow::Error),
}

pub(crate) struct FeederHandle {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl FeederHandle {
    /// Stop appending and wait for the thread.
    pub(crate) fn cancel(self) {
        self.cancel.store(true, Ordering::Relaxed);
        if self.join.join().is_err() {
            tracing::warn!("feeder thread panicked");
        }
    }
}

pub(crate) fn spawn_feeder(
    path: PathBuf,
    feed: SourceFeed,
    config: FeedConfig,
    evt_tx: Sender<FeedEvent>,
) -> Result<FeederHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_for_thread = cancel.clone();
    let join = std::thread::Builder::new()
        .name("stream-feeder".to_string())
        .spawn(move || {
            let file = match File::open(&path).with_context(|| format!("open {path:?}")) {
                Ok(f) => f,
                Err(e) => {
                    let _ = evt_tx.send(FeedEvent::Failed(e));
                    return;
                }
            };
            if let Err(e) = feed_reader(file, &feed, &config, &cancel_for_thread, &evt_tx) {
                let _ = evt_tx.send(FeedEvent::Failed(e));
            }
        })
        .context("spawn feeder thread")?;
    Ok(FeederHandle { cancel, join })
}

/// Append `reader` to `feed` chunk by chunk, then mark the input complete.
fn feed_reader(
    mut reader: impl Read,
    feed: &SourceFeed,
    config: &FeedConfig,
    cancel: &AtomicBool,
    evt_tx: &Sender<FeedEvent>,
) -> Result<()> {
    let mut buf = vec![0u8; config.chunk_bytes.max(1)];
    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(total = feed.len(), "feeder cancelled");
            return Ok(());
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read input"),
        };
        feed.append(&buf[..n]);
        let total = feed.len();
        if evt_tx.send(FeedEvent::Appended { total }).is_err() {
            return Ok(());
        }
        // Only pace once the prebuffer is in.
        if !config.interval.is_zero() && total >= config.prebuffer_bytes {
            std::thread::sleep(config.interval);
        }
    }

    feed.mark_complete();
    let total = feed.len();
    tracing::debug!(total, "input complete");
    let _ = evt_tx.send(FeedEvent::Finished { total });
    Ok(())
}
