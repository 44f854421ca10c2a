use crate::format::FRAMES_PER_CALLBACK;

/// Player tuning parameters shared by the decoder and device stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Linear gain applied to every decoded sample.
    pub gain: f32,
    /// Frames the device is asked to pull per callback.
    pub frames_per_callback: u32,
    /// Ring capacity expressed in callbacks' worth of frames.
    pub ring_callbacks: usize,
}

impl Default for PlayerConfig {
    /// Unity gain, 2048-frame callbacks and two callbacks of slack in the ring.
    fn default() -> Self {
        Self {
            gain: 1.0,
            frames_per_callback: FRAMES_PER_CALLBACK,
            ring_callbacks: 2,
        }
    }
}
