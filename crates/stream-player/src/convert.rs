//! Gain and sample conversion from input encoding to device encoding.
//!
//! Input bytes are little-endian as stored in the stream; output is written in native byte order
//! for the device. Integer formats are scaled through floating point without clamping, so a gain
//! above 1.0 can wrap.

use crate::format::SampleFormat;

/// Convert interleaved `src` samples of `input` format into `input.output_for()` samples in
/// `dst`, applying `gain` to each sample in the same pass.
///
/// `dst` is cleared first; its allocation is reused across calls.
pub fn apply_gain(input: SampleFormat, src: &[u8], gain: f32, dst: &mut Vec<u8>) {
    debug_assert_eq!(src.len() % input.bytes(), 0);
    dst.clear();
    dst.reserve(src.len() / input.bytes() * input.output_for().bytes());

    match input {
        SampleFormat::U8 => {
            dst.extend(src.iter().map(|&v| {
                let centered = i32::from(v) - 127;
                (centered as f32 * gain + 127.0) as i32 as u8
            }));
        }
        SampleFormat::S16 => {
            for b in src.chunks_exact(2) {
                let v = i16::from_le_bytes([b[0], b[1]]);
                dst.extend_from_slice(&scale_i16(v, gain).to_ne_bytes());
            }
        }
        SampleFormat::S24 => {
            // Keep the two most significant bytes of each packed triple.
            for b in src.chunks_exact(3) {
                let v = i16::from_le_bytes([b[1], b[2]]);
                dst.extend_from_slice(&scale_i16(v, gain).to_ne_bytes());
            }
        }
        SampleFormat::S32 => {
            for b in src.chunks_exact(4) {
                let v = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                let out = (f64::from(v) * f64::from(gain)) as i64 as i32;
                dst.extend_from_slice(&out.to_ne_bytes());
            }
        }
        SampleFormat::F32 => {
            for b in src.chunks_exact(4) {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                dst.extend_from_slice(&(v * gain).to_ne_bytes());
            }
        }
        SampleFormat::F64 => {
            for b in src.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                let v = f64::from_le_bytes(raw);
                let out = (f64::from(gain) * v) as f32;
                dst.extend_from_slice(&out.to_ne_bytes());
            }
        }
    }
}

fn scale_i16(v: i16, gain: f32) -> i16 {
    (f32::from(v) * gain) as i32 as i16
}
