//! CPAL output backend.
//!
//! Thin wrappers around CPAL for:
//! - selecting either the default device or a device by substring match
//! - finding a stream config that matches the decoder's output exactly (no conversion here)
//! - adapting CPAL's typed callback buffers to the byte-level pull callback

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{AudioBackend, AudioDevice, DeviceStatus, OutputCallback};
use crate::format::{OutputSpec, SampleFormat};

/// Opens CPAL output streams on the default host.
pub struct CpalBackend {
    host: cpal::Host,
    device_name: Option<String>,
}

impl CpalBackend {
    /// Use the device whose name contains `device_name` (case-insensitive), or the default
    /// output device when `None`.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            host: cpal::default_host(),
            device_name,
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open(
        &self,
        desired: &OutputSpec,
        callback: OutputCallback,
    ) -> Result<(Box<dyn AudioDevice>, OutputSpec)> {
        let device = pick_device(&self.host, self.device_name.as_deref())?;
        let config = pick_output_config(&device, desired)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = pick_buffer_size(&config, desired.frames_per_callback) {
            stream_config.buffer_size = buf;
        }
        tracing::info!(
            device = %device.description()?,
            format = %desired.format,
            channels = stream_config.channels,
            rate_hz = stream_config.sample_rate,
            buffer_size = ?stream_config.buffer_size,
            "device output config"
        );

        let stream = match desired.format {
            SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, callback)?,
            SampleFormat::S16 => build_stream::<i16>(&device, &stream_config, callback)?,
            SampleFormat::S32 => build_stream::<i32>(&device, &stream_config, callback)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, callback)?,
            other => bail!("{other} is not a device output format"),
        };
        // Some hosts start streams as soon as they are built.
        stream.pause().context("pause new output stream")?;

        let frames_per_callback = match stream_config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames,
            cpal::BufferSize::Default => desired.frames_per_callback,
        };
        let negotiated = OutputSpec::new(
            desired.format,
            stream_config.channels,
            stream_config.sample_rate,
            frames_per_callback,
        );
        Ok((
            Box::new(CpalDevice {
                stream,
                paused: true,
            }),
            negotiated,
        ))
    }
}

struct CpalDevice {
    stream: cpal::Stream,
    paused: bool,
}

impl AudioDevice for CpalDevice {
    fn set_paused(&mut self, paused: bool) -> Result<()> {
        if paused {
            self.stream.pause().context("pause output stream")?;
        } else {
            self.stream.play().context("play output stream")?;
        }
        self.paused = paused;
        Ok(())
    }

    fn status(&self) -> DeviceStatus {
        if self.paused {
            DeviceStatus::Paused
        } else {
            DeviceStatus::Playing
        }
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("pause on close failed: {e}");
        }
        drop(self);
    }
}

/// Build an output stream whose typed buffers are handed to `callback` as raw bytes.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: OutputCallback,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + bytemuck::Pod,
{
    let err_fn = |err| tracing::warn!("stream error: {err}");
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            callback(bytemuck::cast_slice_mut(data));
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Resolve the configured device name against the host's output devices.
fn pick_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("host has no default output device"));
    };
    host.output_devices()
        .context("enumerate output devices")?
        .find(|d| {
            d.description()
                .is_ok_and(|desc| matches_device_name(&desc.name(), name))
        })
        .ok_or_else(|| anyhow!("no output device name contains {name:?}"))
}

/// Find a supported config with exactly the desired sample format, channel count and rate.
fn pick_output_config(
    device: &cpal::Device,
    desired: &OutputSpec,
) -> Result<cpal::SupportedStreamConfig> {
    let wanted = cpal_format(desired.format)?;
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    ranges
        .into_iter()
        .find(|range| {
            range.sample_format() == wanted
                && range.channels() == desired.channels
                && range.min_sample_rate() <= desired.freq
                && desired.freq <= range.max_sample_rate()
        })
        .map(|range| range.with_sample_rate(desired.freq))
        .ok_or_else(|| {
            anyhow!(
                "device does not support {} x{} at {} Hz",
                desired.format,
                desired.channels,
                desired.freq
            )
        })
}

/// Request `frames` per callback when the device reports a range, clamped into it.
///
/// Returns `None` when the device only supports its default buffer size.
fn pick_buffer_size(config: &cpal::SupportedStreamConfig, frames: u32) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_frames(frames, *min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn clamp_frames(frames: u32, min: u32, max: u32) -> u32 {
    if min > max {
        return min;
    }
    frames.clamp(min, max)
}

fn cpal_format(format: SampleFormat) -> Result<cpal::SampleFormat> {
    Ok(match format {
        SampleFormat::U8 => cpal::SampleFormat::U8,
        SampleFormat::S16 => cpal::SampleFormat::I16,
        SampleFormat::S32 => cpal::SampleFormat::I32,
        SampleFormat::F32 => cpal::SampleFormat::F32,
        other => bail!("{other} is not a device output format"),
    })
}

/// Names of the available output devices, in host order.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.output_devices().context("enumerate output devices")?;
    let mut out = Vec::new();
    for d in devices {
        out.push(d.description()?.to_string());
    }
    Ok(out)
}

/// Case-insensitive substring match; a blank query matches nothing.
fn matches_device_name(device_name: &str, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    !query.is_empty() && device_name.to_lowercase().contains(&query)
}
