//! Fixed-capacity ring of decoded output frames.
//!
//! [`SampleRing`] is pure data movement; it never locks. [`SampleOutput`] wraps it in the
//! output mutex together with the `more_needed` condition that the device callback raises
//! after every pull, which is what the decoder waits on while the ring is full.
//!
//! Positions are monotonic 64-bit frame counters: occupancy is `head - tail`, and the physical
//! slot is the counter modulo capacity. One slot is always left unused so a full ring never
//! looks empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::format::SampleFormat;

pub struct SampleRing {
    format: SampleFormat,
    channels: u16,
    frame_size: usize,
    /// Total slots in frames (requested + 1).
    capacity: usize,
    head: u64,
    tail: u64,
    data: Vec<u8>,
}

impl SampleRing {
    /// Create a ring able to hold `frames` frames of `channels` interleaved samples.
    pub fn new(format: SampleFormat, channels: u16, frames: usize) -> Self {
        let frame_size = format.bytes() * usize::from(channels);
        let capacity = frames + 1;
        Self {
            format,
            channels,
            frame_size,
            capacity,
            head: 0,
            tail: 0,
            data: vec![0; frame_size * capacity],
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total slots, including the one that is never filled.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently readable.
    pub fn occupancy(&self) -> usize {
        (self.head - self.tail) as usize
    }

    /// Frames currently writable.
    pub fn vacancy(&self) -> usize {
        self.capacity - self.occupancy() - 1
    }

    pub fn is_full(&self) -> bool {
        self.vacancy() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Total frames ever written.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Total frames ever read.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Copy whole frames from `frames` into the ring.
    ///
    /// Panics if `frames` is not a whole number of frames or does not fit in the vacancy.
    pub fn write(&mut self, frames: &[u8]) {
        assert_eq!(frames.len() % self.frame_size, 0, "partial frame written");
        let n = frames.len() / self.frame_size;
        assert!(n <= self.vacancy(), "ring overflow: {n} > {}", self.vacancy());

        let head_pos = (self.head % self.capacity as u64) as usize;
        let until_wrap = self.capacity - head_pos;
        let start = head_pos * self.frame_size;
        if n > until_wrap {
            let split = until_wrap * self.frame_size;
            self.data[start..].copy_from_slice(&frames[..split]);
            self.data[..frames.len() - split].copy_from_slice(&frames[split..]);
        } else {
            self.data[start..start + frames.len()].copy_from_slice(frames);
        }
        self.head += n as u64;
    }

    /// Fill `out` with whole frames from the ring.
    ///
    /// Panics if `out` is not a whole number of frames or asks for more than the occupancy.
    pub fn read(&mut self, out: &mut [u8]) {
        assert_eq!(out.len() % self.frame_size, 0, "partial frame read");
        let n = out.len() / self.frame_size;
        assert!(n <= self.occupancy(), "ring underflow: {n} > {}", self.occupancy());

        let tail_pos = (self.tail % self.capacity as u64) as usize;
        let until_wrap = self.capacity - tail_pos;
        let start = tail_pos * self.frame_size;
        if n > until_wrap {
            let split = until_wrap * self.frame_size;
            out[..split].copy_from_slice(&self.data[start..]);
            let rest = out.len() - split;
            out[split..].copy_from_slice(&self.data[..rest]);
        } else {
            out.copy_from_slice(&self.data[start..start + out.len()]);
        }
        self.tail += n as u64;
    }
}

/// The ring behind the output mutex, plus the signal the consumer raises for the producer.
pub struct SampleOutput {
    ring: Mutex<SampleRing>,
    more_needed: Condvar,
    underrun_events: AtomicU64,
    underrun_frames: AtomicU64,
}

impl SampleOutput {
    pub fn new(ring: SampleRing) -> Self {
        Self {
            ring: Mutex::new(ring),
            more_needed: Condvar::new(),
            underrun_events: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SampleRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the consumer asks for more. Spurious wakeups are possible.
    pub fn wait_more_needed<'a>(
        &self,
        guard: MutexGuard<'a, SampleRing>,
    ) -> MutexGuard<'a, SampleRing> {
        self.more_needed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn signal_more_needed(&self) {
        self.more_needed.notify_all();
    }

    /// Frames currently buffered (snapshot).
    pub fn buffered_frames(&self) -> usize {
        self.lock().occupancy()
    }

    pub(crate) fn record_underrun(&self, frames: usize) {
        self.underrun_events.fetch_add(1, Ordering::Relaxed);
        self.underrun_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Number of callbacks answered with silence.
    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }

    /// Frames emitted as silence because the ring could not satisfy a callback.
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frames_s16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn new_ring_reserves_one_slot() {
        let ring = SampleRing::new(SampleFormat::S16, 2, 8);
        assert_eq!(ring.capacity(), 9);
        assert_eq!(ring.vacancy(), 8);
        assert_eq!(ring.occupancy(), 0);
        assert_eq!(ring.frame_size(), 4);
        assert!(ring.is_empty());
    }

    #[test]
    fn fill_to_vacancy_reports_full() {
        let mut ring = SampleRing::new(SampleFormat::U8, 1, 4);
        ring.write(&[1, 2, 3, 4]);
        assert!(ring.is_full());
        assert_eq!(ring.occupancy(), 4);
        let mut out = [0u8; 4];
        ring.read(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    #[should_panic]
    fn write_past_vacancy_panics() {
        let mut ring = SampleRing::new(SampleFormat::U8, 1, 2);
        ring.write(&[1, 2, 3]);
    }

    #[test]
    #[should_panic]
    fn read_past_occupancy_panics() {
        let mut ring = SampleRing::new(SampleFormat::U8, 1, 2);
        ring.write(&[1]);
        let mut out = [0u8; 2];
        ring.read(&mut out);
    }

    #[test]
    fn wrapping_writes_and_reads_preserve_order() {
        let mut ring = SampleRing::new(SampleFormat::S16, 1, 5);
        let mut written = Vec::new();
        let mut read = Vec::new();
        let mut next = 0i16;

        // Uneven chunk sizes walk the head and tail around the physical end many times.
        for step in 0..50usize {
            let want = (step % 4) + 1;
            let n = want.min(ring.vacancy());
            let chunk: Vec<i16> = (0..n).map(|_| {
                next += 1;
                next
            }).collect();
            ring.write(&frames_s16(&chunk));
            written.extend_from_slice(&chunk);
            assert!(ring.occupancy() <= ring.capacity() - 1);

            let take = ((step * 7) % 3 + 1).min(ring.occupancy());
            let mut out = vec![0u8; take * 2];
            ring.read(&mut out);
            read.extend(
                out.chunks_exact(2)
                    .map(|b| i16::from_ne_bytes([b[0], b[1]])),
            );
        }
        let rest = ring.occupancy();
        let mut out = vec![0u8; rest * 2];
        ring.read(&mut out);
        read.extend(out.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])));

        assert_eq!(read, written);
        assert_eq!(ring.head(), ring.tail());
        assert!(ring.head() > ring.capacity() as u64);
    }

    #[test]
    fn producer_blocks_until_more_needed() {
        let output = Arc::new(SampleOutput::new(SampleRing::new(SampleFormat::U8, 1, 2)));
        output.lock().write(&[10, 20]);

        let producer = output.clone();
        let handle = thread::spawn(move || {
            let mut ring = producer.lock();
            while ring.is_full() {
                ring = producer.wait_more_needed(ring);
            }
            ring.write(&[30]);
        });

        {
            let mut ring = output.lock();
            let mut out = [0u8; 1];
            ring.read(&mut out);
            assert_eq!(out, [10]);
            output.signal_more_needed();
        }
        handle.join().unwrap();

        let mut ring = output.lock();
        let mut out = [0u8; 2];
        ring.read(&mut out);
        assert_eq!(out, [20, 30]);
    }

    #[test]
    fn underruns_are_counted() {
        let output = SampleOutput::new(SampleRing::new(SampleFormat::S16, 2, 4));
        output.record_underrun(2048);
        output.record_underrun(16);
        assert_eq!(output.underrun_events(), 2);
        assert_eq!(output.underrun_frames(), 2064);
    }
}
