//! Caller-driven output device.
//!
//! Nothing runs on its own: each [`ManualBackend::pull`] invokes the installed callback on the
//! calling thread, the way an audio subsystem would from its realtime thread. While paused the
//! callback is not invoked and the pull yields silence.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, bail};

use super::{AudioBackend, AudioDevice, DeviceStatus, OutputCallback};
use crate::format::OutputSpec;

#[derive(Default)]
struct ManualState {
    callback: Option<OutputCallback>,
    spec: Option<OutputSpec>,
    paused: bool,
    opened: u32,
    refuse_open: bool,
}

/// A backend whose single device is pulled explicitly. Clones share the same device.
#[derive(Clone, Default)]
pub struct ManualBackend {
    state: Arc<Mutex<ManualState>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail, as a device rejecting the requested spec would.
    pub fn set_refuse_open(&self, refuse: bool) {
        self.lock().refuse_open = refuse;
    }

    /// Whether a device is currently open.
    pub fn is_open(&self) -> bool {
        self.lock().callback.is_some()
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> u32 {
        self.lock().opened
    }

    /// Spec of the open device.
    pub fn spec(&self) -> Option<OutputSpec> {
        self.lock().spec
    }

    /// Request `frames` frames from the device.
    ///
    /// Returns `None` if no device is open.
    pub fn pull(&self, frames: usize) -> Option<Vec<u8>> {
        let spec = self.spec()?;
        let mut buf = vec![spec.silence; frames * spec.frame_size()];
        self.pull_into(&mut buf).then_some(buf)
    }

    /// Fill `out` from the device. Returns `false` if no device is open.
    pub fn pull_into(&self, out: &mut [u8]) -> bool {
        let mut g = self.lock();
        let Some(spec) = g.spec else {
            return false;
        };
        if g.paused {
            out.fill(spec.silence);
            return true;
        }
        match g.callback.as_mut() {
            Some(callback) => {
                callback(out);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioBackend for ManualBackend {
    fn open(
        &self,
        desired: &OutputSpec,
        callback: OutputCallback,
    ) -> Result<(Box<dyn AudioDevice>, OutputSpec)> {
        let mut g = self.lock();
        if g.refuse_open {
            bail!("device refused {} x{} at {} Hz", desired.format, desired.channels, desired.freq);
        }
        if g.callback.is_some() {
            bail!("device already open");
        }
        g.callback = Some(callback);
        g.spec = Some(*desired);
        g.paused = true;
        g.opened += 1;
        Ok((
            Box::new(ManualDevice {
                state: self.state.clone(),
            }),
            *desired,
        ))
    }
}

struct ManualDevice {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDevice {
    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioDevice for ManualDevice {
    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.lock().paused = paused;
        Ok(())
    }

    fn status(&self) -> DeviceStatus {
        if self.lock().paused {
            DeviceStatus::Paused
        } else {
            DeviceStatus::Playing
        }
    }

    fn close(self: Box<Self>) {
        let mut g = self.lock();
        g.callback = None;
        g.spec = None;
        g.paused = true;
    }
}
