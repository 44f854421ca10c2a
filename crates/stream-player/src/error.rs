//! Error types for header parsing and player startup.

use thiserror::Error;

/// Reasons a buffered header cannot be turned into a [`crate::content::ContentSpec`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The header (up to the start of the `data` chunk) is not fully buffered yet.
    #[error("header truncated: need more than {available} bytes")]
    Truncated { available: usize },

    #[error("missing RIFF magic")]
    NotRiff,

    #[error("missing WAVE magic")]
    NotWave,

    #[error("unsupported fmt chunk size: {0}")]
    BadFmtSize(u32),

    #[error("unsupported WAVE mode: {0}")]
    UnsupportedMode(u16),

    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u16),

    #[error("unsupported bits per sample {bits} for mode {mode}")]
    UnsupportedBits { mode: u16, bits: u16 },

    #[error("fmt extension must be empty, got {0} bytes")]
    NonEmptyExtension(u16),

    #[error("block align {block_align} does not match {channels} x {bits}-bit samples")]
    BadBlockAlign {
        block_align: u16,
        channels: u16,
        bits: u16,
    },

    #[error("data chunk before fmt chunk")]
    DataBeforeFmt,
}

/// Why [`crate::player::Player::try_start`] refused to start.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("player already started")]
    AlreadyStarted,

    #[error("malformed header: {0}")]
    Header(#[from] HeaderError),

    #[error("audio device open failed: {0:#}")]
    Device(anyhow::Error),

    #[error("decoder thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}
