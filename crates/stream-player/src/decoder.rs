//! Decoder worker: turns buffered input bytes into device-ready frames.
//!
//! One dedicated thread per decoder. The worker snapshots how much input is available, converts
//! as many whole frames as both the input and the ring vacancy allow, and otherwise sleeps:
//! - on the input `changed` condition when it has caught up with the producer
//! - on the output `more_needed` condition when the ring is full
//!
//! Input and output locks are never held together. Frames are copied out under the input lock
//! into a scratch buffer, converted without any lock, then written under the output lock.
//!
//! The worker does not exit at end of stream; it parks until [`Decoder::stop`].

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crate::content::ContentSpec;
use crate::convert::apply_gain;
use crate::format::SampleFormat;
use crate::input::InputBuffer;
use crate::ring::SampleOutput;

/// Container decoder selected for a stream. `None` is the terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DecoderKind {
    None = 0,
    Wav = 1,
    Mp3 = 2,
    Vorbis = 3,
    Midi = 4,
}

impl DecoderKind {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => DecoderKind::Wav,
            2 => DecoderKind::Mp3,
            3 => DecoderKind::Vorbis,
            4 => DecoderKind::Midi,
            _ => DecoderKind::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseStatus {
    Ok,
    NeedMoreInput,
}

/// State shared between the decoder handle and its worker thread.
struct DecoderShared {
    kind: AtomicU8,
    /// `f32` bit pattern.
    gain: AtomicU32,
    current_sample: AtomicU64,
    /// Byte offset of the next unread input frame.
    input_pos: AtomicUsize,
}

impl DecoderShared {
    fn kind(&self) -> DecoderKind {
        DecoderKind::from_u8(self.kind.load(Ordering::SeqCst))
    }

    fn is_running(&self) -> bool {
        self.kind() != DecoderKind::None
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }
}

/// Handle to a running decoder. Dropping it stops and joins the worker.
pub struct Decoder {
    shared: Arc<DecoderShared>,
    input: Arc<InputBuffer>,
    output: Arc<SampleOutput>,
    input_frame_size: usize,
    data_range: Range<usize>,
    total_samples: u64,
    total_input_size: u64,
    thread: Option<JoinHandle<()>>,
}

impl Decoder {
    /// Spawn the worker for `content`, reading from `input` and filling `output`.
    pub fn start(
        input: Arc<InputBuffer>,
        content: &ContentSpec,
        output: Arc<SampleOutput>,
        gain: f32,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(DecoderShared {
            kind: AtomicU8::new(content.kind as u8),
            gain: AtomicU32::new(gain.max(0.0).to_bits()),
            current_sample: AtomicU64::new(0),
            input_pos: AtomicUsize::new(content.data_range.start),
        });

        let worker = Worker {
            shared: shared.clone(),
            input: input.clone(),
            output: output.clone(),
            input_format: content.input_format,
            input_frame_size: content.input_frame_size(),
            data_end: content.data_range.end,
            input_pos: content.data_range.start,
            scratch: Vec::new(),
            converted: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name("stream-decoder".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            input,
            output,
            input_frame_size: content.input_frame_size(),
            data_range: content.data_range.clone(),
            total_samples: content.total_samples,
            total_input_size: content.total_input_size,
            thread: Some(thread),
        })
    }

    /// Move to the terminal state, wake the worker wherever it sleeps, and join it.
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        {
            // Publish under the input lock so a worker about to wait on `changed` cannot miss it.
            let _g = self.input.lock();
            self.shared
                .kind
                .store(DecoderKind::None as u8, Ordering::SeqCst);
        }
        self.input.notify();
        drop(self.output.lock());
        self.output.signal_more_needed();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("decoder thread panicked");
            }
        }
    }

    pub fn kind(&self) -> DecoderKind {
        self.shared.kind()
    }

    pub fn gain(&self) -> f32 {
        self.shared.gain()
    }

    /// Takes effect from the next decoded batch.
    pub fn set_gain(&self, gain: f32) {
        self.shared
            .gain
            .store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }

    /// Frames written to the ring so far (best-effort progress).
    pub fn current_sample(&self) -> u64 {
        self.shared.current_sample.load(Ordering::Relaxed)
    }

    /// Total frames declared by the header, or 0 when unknown.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn total_input_size(&self) -> u64 {
        self.total_input_size
    }

    /// Byte offset of the next input frame the worker will read.
    pub fn input_pos(&self) -> usize {
        self.shared.input_pos.load(Ordering::Relaxed)
    }

    pub fn output(&self) -> &Arc<SampleOutput> {
        &self.output
    }

    /// Whether every whole frame of sample data present in `input_len` buffered bytes has been
    /// decoded.
    pub fn is_caught_up(&self, input_len: usize) -> bool {
        let readable_end = input_len.min(self.data_range.end);
        readable_end.saturating_sub(self.input_pos()) < self.input_frame_size
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the worker thread.
struct Worker {
    shared: Arc<DecoderShared>,
    input: Arc<InputBuffer>,
    output: Arc<SampleOutput>,
    input_format: SampleFormat,
    input_frame_size: usize,
    data_end: usize,
    input_pos: usize,
    scratch: Vec<u8>,
    converted: Vec<u8>,
}

impl Worker {
    fn run(mut self) {
        tracing::debug!(
            format = %self.input_format,
            start = self.input_pos,
            end = self.data_end,
            "decoder worker started"
        );
        let mut input_size = self.input.len();

        while self.shared.is_running() {
            let status = if self.input_pos < input_size {
                match self.shared.kind() {
                    DecoderKind::Wav => self.parse_wav(input_size),
                    DecoderKind::None => break,
                    // No parser for these containers; park until stopped.
                    DecoderKind::Mp3 | DecoderKind::Vorbis | DecoderKind::Midi => {
                        ParseStatus::NeedMoreInput
                    }
                }
            } else {
                ParseStatus::NeedMoreInput
            };

            match status {
                ParseStatus::NeedMoreInput => {
                    let mut g = self.input.lock();
                    while g.len() == input_size && self.shared.is_running() {
                        g = self.input.wait(g);
                    }
                    input_size = g.len();
                }
                ParseStatus::Ok => {
                    let mut ring = self.output.lock();
                    while ring.is_full() && self.shared.is_running() {
                        ring = self.output.wait_more_needed(ring);
                    }
                }
            }
        }

        tracing::debug!(
            decoded_frames = self.shared.current_sample.load(Ordering::Relaxed),
            "decoder worker exited"
        );
    }

    /// Convert the next batch of whole WAVE frames.
    fn parse_wav(&mut self, input_size: usize) -> ParseStatus {
        let frame = self.input_frame_size;
        let readable_end = input_size.min(self.data_end);
        let avail = readable_end.saturating_sub(self.input_pos) / frame;
        if avail == 0 {
            return ParseStatus::NeedMoreInput;
        }

        let vacancy = self.output.lock().vacancy();
        let n = vacancy.min(avail);
        if n == 0 {
            return ParseStatus::Ok;
        }

        self.scratch.resize(n * frame, 0);
        self.input.copy_range(self.input_pos, &mut self.scratch);
        apply_gain(
            self.input_format,
            &self.scratch,
            self.shared.gain(),
            &mut self.converted,
        );

        // Only the worker writes, so the vacancy seen above can only have grown.
        self.output.lock().write(&self.converted);

        self.input_pos += n * frame;
        self.shared
            .input_pos
            .store(self.input_pos, Ordering::Relaxed);
        self.shared
            .current_sample
            .fetch_add(n as u64, Ordering::Relaxed);
        ParseStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::wav_header;
    use crate::format::FRAMES_PER_CALLBACK;
    use crate::ring::SampleRing;
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn setup(data_frames: u32, ring_frames: usize) -> (Arc<InputBuffer>, ContentSpec, Arc<SampleOutput>) {
        let header = wav_header(1, 1, 8000, 16, data_frames * 2, &[]);
        let content = ContentSpec::from_wav(&header, FRAMES_PER_CALLBACK).unwrap();
        let input = Arc::new(InputBuffer::new());
        input.append(&header);
        let output = Arc::new(SampleOutput::new(SampleRing::new(
            content.output.format,
            content.output.channels,
            ring_frames,
        )));
        (input, content, output)
    }

    fn pcm16(values: impl IntoIterator<Item = i16>) -> Vec<u8> {
        values.into_iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_buffered_frames_into_ring() {
        let (input, content, output) = setup(4, 16);
        input.append(&pcm16([1, 2, 3, 4]));
        let decoder = Decoder::start(input.clone(), &content, output.clone(), 1.0).unwrap();

        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 4));
        let mut out = [0u8; 8];
        output.lock().read(&mut out);
        let values: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(decoder.input_pos(), content.data_range.end);
        assert!(decoder.is_caught_up(input.len()));
    }

    #[test]
    fn blocks_when_ring_full_and_resumes_on_more_needed() {
        let (input, content, output) = setup(100, 8);
        input.append(&pcm16(0..100));
        let decoder = Decoder::start(input, &content, output.clone(), 1.0).unwrap();

        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 8));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(decoder.current_sample(), 8);

        {
            let mut ring = output.lock();
            let mut out = [0u8; 6];
            ring.read(&mut out);
        }
        output.signal_more_needed();
        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 11));
    }

    #[test]
    fn waits_for_progressive_input() {
        let (input, content, output) = setup(4, 16);
        input.append(&pcm16([7]));
        let decoder = Decoder::start(input.clone(), &content, output.clone(), 1.0).unwrap();
        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 1));

        // Half a frame does not advance the decoder.
        input.append(&[8]);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(decoder.current_sample(), 1);

        input.append(&[0]);
        input.append(&pcm16([9, 10]));
        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 4));
    }

    #[test]
    fn stop_unblocks_worker_waiting_for_input() {
        let (input, content, output) = setup(4, 16);
        let mut decoder = Decoder::start(input, &content, output, 1.0).unwrap();
        thread::sleep(Duration::from_millis(10));

        let started = Instant::now();
        decoder.stop();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(decoder.kind(), DecoderKind::None);
        decoder.stop();
    }

    #[test]
    fn stop_unblocks_worker_waiting_for_space() {
        let (input, content, output) = setup(64, 4);
        input.append(&pcm16(0..64));
        let mut decoder = Decoder::start(input, &content, output, 1.0).unwrap();
        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 4));

        let started = Instant::now();
        decoder.stop();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn gain_applies_to_later_batches() {
        let (input, content, output) = setup(2, 16);
        let decoder = Decoder::start(input.clone(), &content, output.clone(), 1.0).unwrap();
        decoder.set_gain(0.5);
        assert_eq!(decoder.gain(), 0.5);
        input.append(&pcm16([100, -100]));
        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 2));

        let mut out = [0u8; 4];
        output.lock().read(&mut out);
        assert_eq!(i16::from_ne_bytes([out[0], out[1]]), 50);
        assert_eq!(i16::from_ne_bytes([out[2], out[3]]), -50);
    }

    #[test]
    fn ignores_bytes_past_data_chunk() {
        let (input, content, output) = setup(2, 16);
        input.append(&pcm16([5, 6]));
        input.append(b"LIST\x04\x00\x00\x00abcd");
        input.mark_complete();
        let decoder = Decoder::start(input.clone(), &content, output, 1.0).unwrap();
        assert!(wait_until(Duration::from_secs(2), || decoder.current_sample() == 2));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(decoder.current_sample(), 2);
        assert!(decoder.is_caught_up(input.len()));
    }
}
