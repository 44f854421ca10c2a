//! Point-in-time player status for front ends.

/// Snapshot returned by [`crate::player::Player::status`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerStatus {
    pub started: bool,
    pub paused: bool,
    /// Seconds of audio decoded so far.
    pub time_secs: f64,
    /// Total seconds declared by the header, 0 when unknown.
    pub duration_secs: f64,
    /// Fraction of the declared input size received so far.
    pub stream_progress: f32,
    /// Input bytes received.
    pub input_bytes: usize,
    /// Whether the producer marked the input complete.
    pub input_complete: bool,
    /// Frames waiting in the ring for the device.
    pub buffered_frames: usize,
    /// Frames the ring can hold.
    pub buffer_capacity_frames: usize,
    /// Callbacks answered with silence.
    pub underrun_events: u64,
    /// Frames emitted as silence due to underruns.
    pub underrun_frames: u64,
}

impl PlayerStatus {
    /// Elapsed time formatted as `m:ss`.
    pub fn elapsed_label(&self) -> String {
        format_mmss(self.time_secs)
    }

    /// Duration formatted as `m:ss`, or `--:--` when unknown.
    pub fn duration_label(&self) -> String {
        if self.duration_secs > 0.0 {
            format_mmss(self.duration_secs)
        } else {
            "--:--".to_string()
        }
    }
}

fn format_mmss(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
