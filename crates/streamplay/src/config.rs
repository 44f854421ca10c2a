use std::path::PathBuf;
use std::time::Duration;

pub use stream_player::PlayerConfig;

/// How the file is handed to the player.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub chunk_bytes: usize,
    pub interval: Duration,
    pub prebuffer_bytes: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 16384,
            interval: Duration::ZERO,
            prebuffer_bytes: 4096,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StreamPlayConfig {
    pub path: PathBuf,
    pub device: Option<String>,
    pub player: PlayerConfig,
    pub feed: FeedConfig,
}

#[derive(Clone, Debug)]
pub struct StreamRenderConfig {
    pub path: PathBuf,
    pub out: PathBuf,
    pub player: PlayerConfig,
    pub feed: FeedConfig,
}
