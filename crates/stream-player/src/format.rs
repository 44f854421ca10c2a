//! Sample formats and the output spec negotiated with the audio device.

use std::fmt;

/// Default frames requested per device callback.
pub const FRAMES_PER_CALLBACK: u32 = 2048;

/// Encoding of one sample (one channel at one instant).
///
/// Multi-byte input formats are little-endian on disk; output buffers handed to the
/// device use native byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16,
    /// Packed 3-byte signed integer. Input only.
    S24,
    S32,
    F32,
    /// Input only; narrowed to [`SampleFormat::F32`] for output.
    F64,
}

impl SampleFormat {
    pub fn bits(self) -> u16 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24 => 24,
            SampleFormat::S32 | SampleFormat::F32 => 32,
            SampleFormat::F64 => 64,
        }
    }

    pub fn bytes(self) -> usize {
        usize::from(self.bits() / 8)
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F64)
    }

    /// Format presented to the device for this input format.
    ///
    /// 24-bit PCM widens to 16-bit and 64-bit float narrows to 32-bit; everything else passes
    /// through unchanged.
    pub fn output_for(self) -> SampleFormat {
        match self {
            SampleFormat::S24 => SampleFormat::S16,
            SampleFormat::F64 => SampleFormat::F32,
            other => other,
        }
    }

    /// Byte value that encodes silence in every byte of a buffer of this format.
    pub fn silence(self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            _ => 0,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::U8 => "U8",
            SampleFormat::S16 => "S16LE",
            SampleFormat::S24 => "S24LE",
            SampleFormat::S32 => "S32LE",
            SampleFormat::F32 => "F32LE",
            SampleFormat::F64 => "F64LE",
        };
        f.write_str(name)
    }
}

/// Output stream description requested from (and reported back by) the audio device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputSpec {
    pub format: SampleFormat,
    pub channels: u16,
    pub freq: u32,
    /// Frames the device is asked to pull per callback.
    pub frames_per_callback: u32,
    /// Fill byte used on underrun.
    pub silence: u8,
}

impl OutputSpec {
    pub fn new(format: SampleFormat, channels: u16, freq: u32, frames_per_callback: u32) -> Self {
        Self {
            format,
            channels,
            freq,
            frames_per_callback,
            silence: format.silence(),
        }
    }

    /// Bytes per multi-channel frame.
    pub fn frame_size(&self) -> usize {
        self.format.bytes() * usize::from(self.channels)
    }
}
