//! Streamplay runtime helpers.
//!
//! Provides device enumeration, device playback and offline rendering. Both playback paths feed
//! the file from a background thread and start the player once enough of the header is in.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, select, tick};
use stream_player::device::{CpalBackend, ManualBackend};
use stream_player::{HeaderError, Player, StartError};

use crate::config::{FeedConfig, StreamPlayConfig, StreamRenderConfig};
use crate::feed::{self, FeedEvent};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    for name in stream_player::device::list_devices()? {
        println!("{name}");
    }
    Ok(())
}

/// Stream a file to the output device until it drains or `shutdown` fires.
pub fn run_play(config: StreamPlayConfig, shutdown: Receiver<()>) -> Result<()> {
    let backend = CpalBackend::new(normalize_device_name(config.device));
    let mut player = Player::with_config(backend, config.player);
    let (evt_tx, evt_rx) = crossbeam_channel::unbounded();
    let feeder = feed::spawn_feeder(config.path.clone(), player.feed(), config.feed.clone(), evt_tx)?;
    tracing::info!(path = ?config.path, "streaming");

    let progress = tick(PROGRESS_INTERVAL);
    let poll = tick(DRAIN_POLL_INTERVAL);
    let closed = crossbeam_channel::never();
    let mut feed_open = true;
    let mut feed_done = false;
    let mut playout = PlayoutWatch::default();
    let result = loop {
        let events = if feed_open { &evt_rx } else { &closed };
        select! {
            recv(events) -> evt => match evt {
                Ok(FeedEvent::Appended { total }) => {
                    if let Err(e) = try_begin(&mut player, &config.feed, total, false) {
                        break Err(e);
                    }
                }
                Ok(FeedEvent::Finished { total }) => {
                    feed_done = true;
                    tracing::info!(bytes = total, "input fully received");
                    if let Err(e) = try_begin(&mut player, &config.feed, total, true) {
                        break Err(e);
                    }
                }
                Ok(FeedEvent::Failed(e)) => break Err(e),
                // Feeder gone; keep draining what was delivered.
                Err(_) => feed_open = false,
            },
            recv(shutdown) -> _ => {
                tracing::info!("interrupted");
                break Ok(());
            }
            recv(progress) -> _ => {
                if player.is_started() {
                    log_progress(&player);
                }
            }
            recv(poll) -> _ => {
                if feed_done && playout.is_played_out(&player) {
                    tracing::info!("playback finished");
                    break Ok(());
                }
            }
        }
    };

    feeder.cancel();
    let status = player.status();
    player.stop();
    tracing::info!(
        underrun_events = status.underrun_events,
        underrun_frames = status.underrun_frames,
        "session ended"
    );
    result
}

/// Stream a file through a caller-driven device and write every pulled buffer to `config.out`.
pub fn run_render(config: StreamRenderConfig) -> Result<()> {
    let backend = ManualBackend::new();
    let mut player = Player::with_config(backend.clone(), config.player);
    let (evt_tx, evt_rx) = crossbeam_channel::unbounded();
    let feeder = feed::spawn_feeder(config.path.clone(), player.feed(), config.feed.clone(), evt_tx)?;

    let result = (|| -> Result<u64> {
        wait_for_start(&mut player, &config.feed, &evt_rx)?;
        let file = File::create(&config.out).with_context(|| format!("create {:?}", config.out))?;
        let mut out = BufWriter::new(file);
        let frames = render_until_drained(&player, &backend, &evt_rx, &mut out)?;
        out.flush().context("flush output")?;
        Ok(frames)
    })();

    feeder.cancel();
    let spec = player.output_spec().copied();
    player.stop();
    let frames = result?;
    if let Some(spec) = spec {
        tracing::info!(
            out = ?config.out,
            frames,
            format = %spec.format,
            channels = spec.channels,
            rate_hz = spec.freq,
            "render complete"
        );
    }
    Ok(())
}

/// Start once the prebuffer is in. A header that is still arriving is not an error until the
/// input is complete.
fn try_begin(player: &mut Player, feed: &FeedConfig, total: usize, complete: bool) -> Result<()> {
    if player.is_started() || (!complete && total < feed.prebuffer_bytes) {
        return Ok(());
    }
    match player.try_start() {
        Ok(()) => {
            let status = player.status();
            tracing::info!(
                buffered_bytes = total,
                duration = %status.duration_label(),
                "playback started"
            );
            Ok(())
        }
        Err(StartError::Header(HeaderError::Truncated { available })) if !complete => {
            tracing::debug!(available, "header incomplete; waiting for more input");
            Ok(())
        }
        Err(e) => Err(anyhow!(e)),
    }
}

fn wait_for_start(
    player: &mut Player,
    feed: &FeedConfig,
    evt_rx: &Receiver<FeedEvent>,
) -> Result<()> {
    while !player.is_started() {
        match evt_rx.recv() {
            Ok(FeedEvent::Appended { total }) => try_begin(player, feed, total, false)?,
            Ok(FeedEvent::Finished { total }) => {
                try_begin(player, feed, total, true)?;
            }
            Ok(FeedEvent::Failed(e)) => return Err(e),
            Err(_) => return Err(anyhow!("input ended before playback could start")),
        }
    }
    Ok(())
}

/// Pull whole callbacks while they are available and the final partial callback once the input
/// is exhausted. Returns the number of frames written.
fn render_until_drained(
    player: &Player,
    backend: &ManualBackend,
    evt_rx: &Receiver<FeedEvent>,
    out: &mut impl Write,
) -> Result<u64> {
    let spec = *player
        .output_spec()
        .ok_or_else(|| anyhow!("player not started"))?;
    let per_callback = spec.frames_per_callback.max(1) as usize;
    let mut written = 0u64;
    let mut last_progress = Instant::now();

    loop {
        let buffered = player.status().buffered_frames;
        let frames = if buffered >= per_callback {
            per_callback
        } else if buffered > 0 && player.is_input_exhausted() {
            buffered
        } else if player.is_drained() {
            break;
        } else {
            match evt_rx.recv_timeout(Duration::from_millis(5)) {
                Ok(FeedEvent::Failed(e)) => return Err(e),
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(Duration::from_millis(5)),
            }
            continue;
        };

        let bytes = backend
            .pull(frames)
            .ok_or_else(|| anyhow!("output device closed"))?;
        out.write_all(&bytes).context("write output")?;
        written += frames as u64;

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            log_progress(player);
            last_progress = Instant::now();
        }
    }
    Ok(written)
}

/// Decides when play mode is done once the input is exhausted.
///
/// The ring is done when it is empty, or when the device has answered a callback with silence
/// since the input ran out: no more frames will arrive, so whatever is left is shorter than the
/// device's real callback size and can never be played.
#[derive(Debug, Default)]
struct PlayoutWatch {
    underruns_at_exhaustion: Option<u64>,
}

impl PlayoutWatch {
    fn is_played_out(&mut self, player: &Player) -> bool {
        if !player.is_started() || !player.is_input_exhausted() {
            self.underruns_at_exhaustion = None;
            return false;
        }
        let status = player.status();
        if status.buffered_frames == 0 {
            return true;
        }
        let baseline = *self
            .underruns_at_exhaustion
            .get_or_insert(status.underrun_events);
        status.underrun_events > baseline
    }
}

fn log_progress(player: &Player) {
    let status = player.status();
    tracing::info!(
        elapsed = %status.elapsed_label(),
        duration = %status.duration_label(),
        received_pct = (status.stream_progress * 100.0).round() as u32,
        buffered_frames = status.buffered_frames,
        underruns = status.underrun_events,
        "progress"
    );
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_player::{PlayerConfig, UpdateMode};

    fn wav_pcm16(samples: &[i16]) -> Vec<u8> {
        let data: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&16000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB DAC ".to_string())),
            Some("USB DAC".to_string())
        );
    }

    #[test]
    fn try_begin_waits_for_prebuffer_and_header() {
        let mut player = Player::new(ManualBackend::new());
        let feed = FeedConfig {
            prebuffer_bytes: 30,
            ..Default::default()
        };
        let file = wav_pcm16(&[1, 2, 3]);

        player.update_source(&file[..20], UpdateMode::Append);
        try_begin(&mut player, &feed, 20, false).unwrap();
        assert!(!player.is_started());

        // Past the prebuffer but the header is still short.
        player.update_source(&file[..40], UpdateMode::Append);
        try_begin(&mut player, &feed, 40, false).unwrap();
        assert!(!player.is_started());

        player.update_source(&file, UpdateMode::Append);
        try_begin(&mut player, &feed, file.len(), false).unwrap();
        assert!(player.is_started());
    }

    #[test]
    fn try_begin_fails_on_truncated_complete_input() {
        let mut player = Player::new(ManualBackend::new());
        let file = wav_pcm16(&[1]);
        player.update_source(&file[..30], UpdateMode::Append);
        player.update_source(&[], UpdateMode::MarkComplete);
        assert!(try_begin(&mut player, &FeedConfig::default(), 30, true).is_err());
    }

    #[test]
    fn playout_waits_for_tail_to_underrun() {
        let samples: Vec<i16> = (0..20).collect();
        let backend = ManualBackend::new();
        let config = PlayerConfig {
            frames_per_callback: 16,
            ..Default::default()
        };
        let mut player = Player::with_config(backend.clone(), config);
        let mut watch = PlayoutWatch::default();
        player.update_source(&wav_pcm16(&samples), UpdateMode::Append);
        assert!(player.start());
        assert!(!watch.is_played_out(&player));

        player.update_source(&[], UpdateMode::MarkComplete);
        let deadline = Instant::now() + Duration::from_secs(2);
        while !player.is_input_exhausted() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(!watch.is_played_out(&player));

        backend.pull(16).unwrap();
        // Four frames left; the device has not asked for them yet.
        assert!(!watch.is_played_out(&player));

        backend.pull(16).unwrap();
        assert_eq!(player.status().buffered_frames, 4);
        assert!(watch.is_played_out(&player));
    }

    #[test]
    fn playout_done_when_ring_empties() {
        let backend = ManualBackend::new();
        let mut player = Player::new(backend.clone());
        let mut watch = PlayoutWatch::default();
        player.update_source(&wav_pcm16(&[1, 2, 3, 4]), UpdateMode::Append);
        player.update_source(&[], UpdateMode::MarkComplete);
        assert!(player.start());
        let deadline = Instant::now() + Duration::from_secs(2);
        while player.status().buffered_frames < 4 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        backend.pull(4).unwrap();
        assert!(watch.is_played_out(&player));
    }

    #[test]
    fn render_writes_every_frame_including_partial_tail() {
        let samples: Vec<i16> = (0..100).collect();
        let file = wav_pcm16(&samples);
        let backend = ManualBackend::new();
        let config = PlayerConfig {
            frames_per_callback: 16,
            ..Default::default()
        };
        let mut player = Player::with_config(backend.clone(), config);
        player.update_source(&file, UpdateMode::Append);
        player.update_source(&[], UpdateMode::MarkComplete);
        assert!(player.start());

        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut out = Vec::new();
        let frames = render_until_drained(&player, &backend, &rx, &mut out).unwrap();
        assert_eq!(frames, 100);
        let got: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(got, samples);
        assert!(player.is_drained());
    }
}
