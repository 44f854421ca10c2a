//! Audio device abstraction.
//!
//! The player only needs a pull-model output: open a device with a desired [`OutputSpec`],
//! learn the negotiated spec, and have a callback asked periodically to fill a byte buffer
//! holding a whole number of frames. Devices open paused.
//!
//! - [`CpalBackend`] plays through a CPAL output stream.
//! - [`ManualBackend`] is driven by the caller (offline rendering, tests).

mod cpal_backend;
mod manual;

use anyhow::Result;

use crate::format::OutputSpec;

pub use cpal_backend::{CpalBackend, list_devices};
pub use manual::ManualBackend;

/// Device pull callback. Receives the destination buffer; must not block.
pub type OutputCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Playing,
    Paused,
}

/// An open output device.
pub trait AudioDevice {
    fn set_paused(&mut self, paused: bool) -> Result<()>;

    fn status(&self) -> DeviceStatus;

    /// Stop invoking the callback and release the device.
    fn close(self: Box<Self>);
}

/// Factory for output devices.
pub trait AudioBackend {
    /// Open a paused device for `desired`, installing `callback`.
    ///
    /// Returns the device and the spec actually negotiated, which the caller must use for
    /// frame-size accounting.
    fn open(
        &self,
        desired: &OutputSpec,
        callback: OutputCallback,
    ) -> Result<(Box<dyn AudioDevice>, OutputSpec)>;
}
