//! Progressively delivered input bytes.
//!
//! [`InputBuffer`] is shared between the producer feeding the player and the decoder worker.
//! Bytes only grow (apart from an explicit [`InputBuffer::replace`] before decoding starts),
//! completion only goes from `false` to `true`, and every mutation wakes all waiters on the
//! `changed` condition.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Contents guarded by the input mutex.
#[derive(Debug, Default)]
pub struct InputState {
    bytes: Vec<u8>,
    complete: bool,
}

impl InputState {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the producer has announced that no more bytes will arrive.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Append-only byte queue with a completion flag and a change notification.
#[derive(Debug, Default)]
pub struct InputBuffer {
    state: Mutex<InputState>,
    changed: Condvar,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buffer. Readers may inspect `len()` and then [`InputBuffer::wait`].
    pub fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the buffer changes. Spurious wakeups are possible.
    pub fn wait<'a>(&self, guard: MutexGuard<'a, InputState>) -> MutexGuard<'a, InputState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every thread blocked in [`InputBuffer::wait`] without mutating anything.
    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    pub fn append(&self, bytes: &[u8]) {
        let mut g = self.lock();
        g.bytes.extend_from_slice(bytes);
        drop(g);
        self.changed.notify_all();
    }

    /// Grow the buffer to `whole`, which must start with the bytes already buffered.
    ///
    /// Only the new tail is copied, so offsets into the existing bytes stay valid.
    pub fn append_suffix(&self, whole: &[u8]) {
        let mut g = self.lock();
        let old_len = g.bytes.len();
        assert!(
            whole.len() >= old_len,
            "appended buffer shrank from {old_len} to {} bytes",
            whole.len()
        );
        debug_assert!(
            g.bytes[..] == whole[..old_len],
            "previously buffered bytes changed"
        );
        g.bytes.extend_from_slice(&whole[old_len..]);
        drop(g);
        self.changed.notify_all();
    }

    /// Replace the contents and clear the completion flag.
    ///
    /// Only meaningful before a decoder reads from the buffer; offsets held by a running decoder
    /// are not adjusted.
    pub fn replace(&self, bytes: &[u8]) {
        let mut g = self.lock();
        g.bytes.clear();
        g.bytes.extend_from_slice(bytes);
        g.complete = false;
        drop(g);
        self.changed.notify_all();
    }

    pub fn mark_complete(&self) {
        let mut g = self.lock();
        g.complete = true;
        drop(g);
        self.changed.notify_all();
    }

    /// Current byte count. A lower bound by the time the caller looks at it.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    /// Copy `dst.len()` bytes starting at `start`.
    ///
    /// Panics if the range is not fully buffered.
    pub fn copy_range(&self, start: usize, dst: &mut [u8]) {
        let g = self.lock();
        let end = start + dst.len();
        assert!(
            end <= g.bytes.len(),
            "input range {start}..{end} exceeds buffered {} bytes",
            g.bytes.len()
        );
        dst.copy_from_slice(&g.bytes[start..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn append_grows_and_preserves_order() {
        let input = InputBuffer::new();
        input.append(b"RIFF");
        input.append(b"WAVE");
        assert_eq!(input.len(), 8);
        assert_eq!(input.lock().bytes(), b"RIFFWAVE");
        assert!(!input.is_complete());
    }

    #[test]
    fn replace_clears_completion() {
        let input = InputBuffer::new();
        input.append(b"old");
        input.mark_complete();
        assert!(input.is_complete());
        input.replace(b"new!");
        assert!(!input.is_complete());
        assert_eq!(input.lock().bytes(), b"new!");
    }

    #[test]
    fn completion_survives_later_appends() {
        let input = InputBuffer::new();
        input.append(b"RIFF");
        input.mark_complete();

        input.append(b"WAVE");
        assert!(input.is_complete());
        assert_eq!(input.len(), 8);

        input.append_suffix(b"RIFFWAVEfmt ");
        assert!(input.is_complete());
        assert_eq!(input.len(), 12);

        input.append_suffix(b"RIFFWAVEfmt ");
        assert!(input.is_complete());
        assert_eq!(input.len(), 12);
    }

    #[test]
    fn append_suffix_copies_only_new_tail() {
        let input = InputBuffer::new();
        input.append_suffix(b"RIFF");
        input.append_suffix(b"RIFF\x24\x00");
        input.append_suffix(b"RIFF\x24\x00");
        assert_eq!(input.lock().bytes(), b"RIFF\x24\x00");
    }

    #[test]
    #[should_panic]
    fn append_suffix_rejects_shrinking() {
        let input = InputBuffer::new();
        input.append(b"RIFF");
        input.append_suffix(b"RI");
    }

    #[test]
    fn copy_range_copies_slice() {
        let input = InputBuffer::new();
        input.append(&[1, 2, 3, 4, 5]);
        let mut out = [0u8; 3];
        input.copy_range(1, &mut out);
        assert_eq!(out, [2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn copy_range_past_end_panics() {
        let input = InputBuffer::new();
        input.append(&[1, 2]);
        let mut out = [0u8; 3];
        input.copy_range(0, &mut out);
    }

    #[test]
    fn waiter_wakes_on_append() {
        let input = Arc::new(InputBuffer::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let reader = input.clone();
        let handle = thread::spawn(move || {
            let mut g = reader.lock();
            let seen = g.len();
            tx.send(()).unwrap();
            while g.len() == seen {
                g = reader.wait(g);
            }
            g.len()
        });

        rx.recv().unwrap();
        input.append(&[0; 7]);
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn waiter_wakes_on_complete() {
        let input = Arc::new(InputBuffer::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let reader = input.clone();
        let handle = thread::spawn(move || {
            let mut g = reader.lock();
            tx.send(()).unwrap();
            while !g.is_complete() {
                g = reader.wait(g);
            }
        });

        rx.recv().unwrap();
        input.mark_complete();
        handle.join().unwrap();
        assert!(input.is_complete());
    }
}
