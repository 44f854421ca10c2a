//! Player façade: owns the input, the decoder and the output device.
//!
//! Lifecycle:
//! 1. bytes arrive through [`Player::update_source`] (or a [`SourceFeed`] on another thread)
//! 2. [`Player::start`] parses the buffered header, opens the device paused, spawns the decoder
//!    and unpauses
//! 3. the device pulls frames through the output callback until [`Player::stop`]
//!
//! The callback only holds a weak reference to the decoder's ring. It never waits: it either
//! reads a whole request or answers with silence, then signals the decoder.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::config::PlayerConfig;
use crate::content::ContentSpec;
use crate::decoder::Decoder;
use crate::device::{AudioBackend, AudioDevice, DeviceStatus, OutputCallback};
use crate::error::StartError;
use crate::format::OutputSpec;
use crate::input::InputBuffer;
use crate::ring::{SampleOutput, SampleRing};
use crate::status::PlayerStatus;

/// How [`Player::update_source`] treats the supplied bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// Overwrite the input and clear completion. Only valid before the decoder starts.
    Replace,
    /// The bytes are the whole stream so far; the part beyond the current size is appended.
    Append,
    /// No more bytes will follow. The supplied bytes are ignored.
    MarkComplete,
}

/// Cloneable producer handle for feeding input from another thread.
#[derive(Clone)]
pub struct SourceFeed {
    input: Arc<InputBuffer>,
}

impl SourceFeed {
    /// Append the next chunk of the stream.
    pub fn append(&self, chunk: &[u8]) {
        self.input.append(chunk);
    }

    pub fn mark_complete(&self) {
        self.input.mark_complete();
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.input.is_complete()
    }
}

/// Frame accounting the callback reads; set from the negotiated spec once the device is open.
struct CallbackSpec {
    frame_size: AtomicUsize,
    silence: AtomicU8,
}

impl CallbackSpec {
    fn new(spec: &OutputSpec) -> Self {
        Self {
            frame_size: AtomicUsize::new(spec.frame_size()),
            silence: AtomicU8::new(spec.silence),
        }
    }

    fn store(&self, spec: &OutputSpec) {
        self.frame_size.store(spec.frame_size(), Ordering::Relaxed);
        self.silence.store(spec.silence, Ordering::Relaxed);
    }
}

pub struct Player {
    backend: Box<dyn AudioBackend>,
    config: PlayerConfig,
    input: Arc<InputBuffer>,
    content: Option<ContentSpec>,
    /// Negotiated device spec while started.
    spec: Option<OutputSpec>,
    device: Option<Box<dyn AudioDevice>>,
    decoder: Option<Decoder>,
    format_hint: Option<String>,
}

impl Player {
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        Self::with_config(backend, PlayerConfig::default())
    }

    pub fn with_config(backend: impl AudioBackend + 'static, config: PlayerConfig) -> Self {
        Self {
            backend: Box::new(backend),
            config,
            input: Arc::new(InputBuffer::new()),
            content: None,
            spec: None,
            device: None,
            decoder: None,
            format_hint: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Handle for appending input from another thread.
    pub fn feed(&self) -> SourceFeed {
        SourceFeed {
            input: self.input.clone(),
        }
    }

    /// Reserved for container detection; only WAVE is recognized.
    pub fn set_format_hint(&mut self, hint: &str) {
        tracing::trace!(hint, "format hint ignored");
        self.format_hint = Some(hint.to_string());
    }

    pub fn update_source(&self, bytes: &[u8], mode: UpdateMode) {
        match mode {
            UpdateMode::Replace => {
                debug_assert!(self.decoder.is_none(), "input replaced while decoding");
                if self.decoder.is_some() {
                    tracing::warn!("input replaced while the decoder is running");
                }
                self.input.replace(bytes);
            }
            UpdateMode::Append => self.input.append_suffix(bytes),
            UpdateMode::MarkComplete => self.input.mark_complete(),
        }
    }

    /// Start playback from the buffered header. Returns `false` if already started, if the
    /// header is not a usable WAVE header (yet), or if the device cannot be opened.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(StartError::AlreadyStarted) => false,
            Err(e) => {
                tracing::warn!("playback not started: {e}");
                false
            }
        }
    }

    /// [`Player::start`] with the reason for refusing.
    pub fn try_start(&mut self) -> Result<(), StartError> {
        if self.is_started() {
            return Err(StartError::AlreadyStarted);
        }

        let content = {
            let g = self.input.lock();
            ContentSpec::from_wav(g.bytes(), self.config.frames_per_callback)?
        };
        tracing::info!(
            input_format = %content.input_format,
            output_format = %content.output.format,
            channels = content.output.channels,
            rate_hz = content.output.freq,
            data_start = content.data_range.start,
            data_end = content.data_range.end,
            total_samples = content.total_samples,
            "WAVE header parsed"
        );

        let ring = SampleRing::new(
            content.output.format,
            content.output.channels,
            content.ring_frames(self.config.ring_callbacks),
        );
        let output = Arc::new(SampleOutput::new(ring));

        let cb_spec = Arc::new(CallbackSpec::new(&content.output));
        let callback: OutputCallback = {
            let output = Arc::downgrade(&output);
            let cb_spec = cb_spec.clone();
            Box::new(move |stream: &mut [u8]| write_output_samples(&output, &cb_spec, stream))
        };

        let (mut device, negotiated) = self
            .backend
            .open(&content.output, callback)
            .map_err(StartError::Device)?;
        if negotiated.format != content.output.format
            || negotiated.channels != content.output.channels
        {
            device.close();
            return Err(StartError::Device(anyhow::anyhow!(
                "device negotiated {} x{} instead of {} x{}",
                negotiated.format,
                negotiated.channels,
                content.output.format,
                content.output.channels
            )));
        }
        if negotiated.freq != content.output.freq {
            tracing::warn!(
                source_rate_hz = content.output.freq,
                device_rate_hz = negotiated.freq,
                "device rate differs from source"
            );
        }
        cb_spec.store(&negotiated);

        let decoder = match Decoder::start(self.input.clone(), &content, output, self.config.gain)
        {
            Ok(decoder) => decoder,
            Err(e) => {
                device.close();
                return Err(StartError::Spawn(e));
            }
        };

        if let Err(e) = device.set_paused(false) {
            device.close();
            drop(decoder);
            return Err(StartError::Device(e));
        }

        self.content = Some(content);
        self.spec = Some(negotiated);
        self.device = Some(device);
        self.decoder = Some(decoder);
        Ok(())
    }

    /// Pause or resume the device. Ignored when not started.
    pub fn set_paused(&mut self, paused: bool) {
        if let Some(device) = self.device.as_mut() {
            if let Err(e) = device.set_paused(paused) {
                tracing::warn!(paused, "device pause change failed: {e:#}");
            }
        }
    }

    /// Close the device, then stop and join the decoder. Safe to call when not started.
    pub fn stop(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.set_paused(true) {
                tracing::warn!("device pause on stop failed: {e:#}");
            }
            device.close();
            tracing::info!("playback stopped");
        }
        if let Some(decoder) = self.decoder.take() {
            drop(decoder);
        }
        self.spec = None;
        self.content = None;
    }

    pub fn is_started(&self) -> bool {
        self.device.is_some()
    }

    /// `true` when not started.
    pub fn is_paused(&self) -> bool {
        self.device
            .as_ref()
            .map(|d| d.status() == DeviceStatus::Paused)
            .unwrap_or(true)
    }

    /// Adjust gain for the next start and for the running decoder.
    pub fn set_gain(&mut self, gain: f32) {
        self.config.gain = gain.max(0.0);
        if let Some(decoder) = self.decoder.as_ref() {
            decoder.set_gain(self.config.gain);
        }
    }

    /// Content spec of the current stream while started.
    pub fn content(&self) -> Option<&ContentSpec> {
        self.content.as_ref()
    }

    /// Spec negotiated with the device while started.
    pub fn output_spec(&self) -> Option<&OutputSpec> {
        self.spec.as_ref()
    }

    /// Seconds decoded so far, or 0 without a decoder.
    pub fn time(&self) -> f64 {
        match (self.decoder.as_ref(), self.spec.as_ref()) {
            (Some(decoder), Some(spec)) if spec.freq > 0 => {
                decoder.current_sample() as f64 / f64::from(spec.freq)
            }
            _ => 0.0,
        }
    }

    /// Total seconds declared by the header, or 0 when unknown.
    pub fn duration(&self) -> f64 {
        match (self.decoder.as_ref(), self.spec.as_ref()) {
            (Some(decoder), Some(spec)) if spec.freq > 0 => {
                decoder.total_samples() as f64 / f64::from(spec.freq)
            }
            _ => 0.0,
        }
    }

    /// Fraction of the declared stream size received, in `[0, 1]`.
    pub fn stream_progress(&self) -> f32 {
        let Some(total) = self
            .decoder
            .as_ref()
            .map(Decoder::total_input_size)
            .filter(|&t| t > 0)
        else {
            return 0.0;
        };
        let received = self.input.len() as f64;
        (received / total as f64).min(1.0) as f32
    }

    /// Whether the input is complete and every whole frame in it has been decoded into the ring.
    pub fn is_input_exhausted(&self) -> bool {
        let Some(decoder) = self.decoder.as_ref() else {
            return false;
        };
        let (len, complete) = {
            let g = self.input.lock();
            (g.len(), g.is_complete())
        };
        complete && decoder.is_caught_up(len)
    }

    /// Whether the input is exhausted and every decoded frame has been handed to the device.
    ///
    /// The decoder itself keeps running until [`Player::stop`].
    pub fn is_drained(&self) -> bool {
        self.is_input_exhausted()
            && self
                .decoder
                .as_ref()
                .is_some_and(|d| d.output().lock().is_empty())
    }

    pub fn status(&self) -> PlayerStatus {
        let (input_bytes, input_complete) = {
            let g = self.input.lock();
            (g.len(), g.is_complete())
        };
        let mut status = PlayerStatus {
            started: self.is_started(),
            paused: self.is_paused(),
            time_secs: self.time(),
            duration_secs: self.duration(),
            stream_progress: self.stream_progress(),
            input_bytes,
            input_complete,
            ..Default::default()
        };
        if let Some(decoder) = self.decoder.as_ref() {
            let output = decoder.output();
            {
                let ring = output.lock();
                status.buffered_frames = ring.occupancy();
                status.buffer_capacity_frames = ring.capacity() - 1;
            }
            status.underrun_events = output.underrun_events();
            status.underrun_frames = output.underrun_frames();
        }
        status
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Device pull callback body.
///
/// Reads exactly the requested number of frames if the ring holds them, otherwise fills the
/// whole buffer with silence. Always signals the decoder afterwards.
fn write_output_samples(output: &Weak<SampleOutput>, spec: &CallbackSpec, stream: &mut [u8]) {
    let frame_size = spec.frame_size.load(Ordering::Relaxed);
    let silence = spec.silence.load(Ordering::Relaxed);
    let Some(output) = output.upgrade() else {
        stream.fill(silence);
        return;
    };
    let count = stream.len() / frame_size.max(1);
    let whole = count * frame_size;

    let mut ring = output.lock();
    if ring.frame_size() == frame_size && ring.occupancy() >= count {
        ring.read(&mut stream[..whole]);
        stream[whole..].fill(silence);
    } else {
        stream.fill(silence);
        output.record_underrun(count);
    }
    output.signal_more_needed();
    drop(ring);
}
