//! Content description derived from the buffered stream header.
//!
//! Only RIFF/WAVE is recognized. The parser reads from a byte slice without consuming it, so it
//! can be retried as more of a progressively delivered header arrives.

use std::ops::Range;

use crate::decoder::DecoderKind;
use crate::error::HeaderError;
use crate::format::{OutputSpec, SampleFormat};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// Immutable descriptor of a parsed source: input encoding, derived output spec and where the
/// raw samples live in the input stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentSpec {
    pub kind: DecoderKind,
    pub input_format: SampleFormat,
    /// Desired device output; `format` is `input_format.output_for()`.
    pub output: OutputSpec,
    /// Declared size of the whole stream in bytes: the RIFF size field counts everything after
    /// its own 8-byte chunk header, so 8 is added to compare against received bytes.
    pub total_input_size: u64,
    /// Total frames, or 0 when unknown.
    pub total_samples: u64,
    /// Byte offsets of the sample data within the input stream.
    pub data_range: Range<usize>,
}

impl ContentSpec {
    /// Parse a RIFF/WAVE header from the start of `bytes`.
    ///
    /// `bytes` only needs to extend to the start of the `data` chunk payload; the samples
    /// themselves may still be in flight.
    pub fn from_wav(bytes: &[u8], frames_per_callback: u32) -> Result<Self, HeaderError> {
        let mut cur = Cursor::new(bytes);

        if cur.take(4)? != b"RIFF" {
            return Err(HeaderError::NotRiff);
        }
        let riff_size = cur.u32_le()?;
        if cur.take(4)? != b"WAVE" {
            return Err(HeaderError::NotWave);
        }

        let mut fmt: Option<WavFmt> = None;
        loop {
            let id = cur.take(4)?;
            let size = cur.u32_le()?;
            match id {
                b"fmt " => {
                    fmt = Some(WavFmt::parse(&mut cur, size)?);
                }
                b"data" => {
                    let fmt = fmt.ok_or(HeaderError::DataBeforeFmt)?;
                    let start = cur.pos;
                    let data_range = start..start + size as usize;
                    let input_format = fmt.format;
                    let output = OutputSpec::new(
                        input_format.output_for(),
                        fmt.channels,
                        fmt.freq,
                        frames_per_callback,
                    );
                    return Ok(Self {
                        kind: DecoderKind::Wav,
                        input_format,
                        output,
                        total_input_size: u64::from(riff_size) + 8,
                        total_samples: match fmt.block_align {
                            0 => 0,
                            align => u64::from(size) / u64::from(align),
                        },
                        data_range,
                    });
                }
                _ => {
                    // RIFF chunks are word aligned.
                    let padded = size as usize + (size as usize & 1);
                    cur.skip(padded)?;
                }
            }
        }
    }

    /// Bytes per multi-channel frame on the input side.
    pub fn input_frame_size(&self) -> usize {
        self.input_format.bytes() * usize::from(self.output.channels)
    }

    /// Requested ring capacity in frames for the given number of callbacks of slack.
    pub fn ring_frames(&self, callbacks: usize) -> usize {
        self.output.frames_per_callback as usize * callbacks.max(1)
    }
}

#[derive(Clone, Copy, Debug)]
struct WavFmt {
    format: SampleFormat,
    channels: u16,
    freq: u32,
    block_align: u16,
}

impl WavFmt {
    fn parse(cur: &mut Cursor<'_>, size: u32) -> Result<Self, HeaderError> {
        if size != 16 && size != 18 {
            return Err(HeaderError::BadFmtSize(size));
        }
        let mode = cur.u16_le()?;
        let channels = cur.u16_le()?;
        let freq = cur.u32_le()?;
        let _bytes_per_sec = cur.u32_le()?;
        let block_align = cur.u16_le()?;
        let bits = cur.u16_le()?;
        let ext_size = if size == 18 { cur.u16_le()? } else { 0 };

        if mode != WAVE_FORMAT_PCM && mode != WAVE_FORMAT_IEEE_FLOAT {
            return Err(HeaderError::UnsupportedMode(mode));
        }
        if ext_size != 0 {
            return Err(HeaderError::NonEmptyExtension(ext_size));
        }
        if channels != 1 && channels != 2 {
            return Err(HeaderError::UnsupportedChannels(channels));
        }
        let format = match (mode, bits) {
            (WAVE_FORMAT_PCM, 8) => SampleFormat::U8,
            (WAVE_FORMAT_PCM, 16) => SampleFormat::S16,
            (WAVE_FORMAT_PCM, 24) => SampleFormat::S24,
            (WAVE_FORMAT_PCM, 32) => SampleFormat::S32,
            (WAVE_FORMAT_IEEE_FLOAT, 32) => SampleFormat::F32,
            (WAVE_FORMAT_IEEE_FLOAT, 64) => SampleFormat::F64,
            _ => return Err(HeaderError::UnsupportedBits { mode, bits }),
        };
        // Frame size comes from channels and bits; only 24-bit packing is checked against it.
        if format == SampleFormat::S24 && usize::from(block_align) != 3 * usize::from(channels) {
            return Err(HeaderError::BadBlockAlign {
                block_align,
                channels,
                bits,
            });
        }
        Ok(Self {
            format,
            channels,
            freq,
            block_align,
        })
    }
}

/// Little-endian reader over a partially buffered header.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], HeaderError> {
        let end = self.pos + n;
        let out = self.bytes.get(self.pos..end).ok_or(HeaderError::Truncated {
            available: self.bytes.len(),
        })?;
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), HeaderError> {
        self.take(n).map(|_| ())
    }

    fn u16_le(&mut self) -> Result<u16, HeaderError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_le(&mut self) -> Result<u32, HeaderError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Build a canonical 44-byte WAVE header (optionally with extra chunks before `data`).
#[cfg(test)]
pub(crate) fn wav_header(
    mode: u16,
    channels: u16,
    freq: u32,
    bits: u16,
    data_len: u32,
    extra_chunks: &[(&[u8; 4], &[u8])],
) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&mode.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&freq.to_le_bytes());
    fmt.extend_from_slice(&(freq * u32::from(block_align)).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());

    let mut body = Vec::new();
    body.extend_from_slice(b"WAVE");
    body.extend_from_slice(b"fmt ");
    body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    body.extend_from_slice(&fmt);
    for (id, payload) in extra_chunks {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            body.push(0);
        }
    }
    body.extend_from_slice(b"data");
    body.extend_from_slice(&data_len.to_le_bytes());

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(body.len() as u32 + data_len).to_le_bytes());
    out.extend_from_slice(&body);
    out
}
