pub mod config;
pub mod content;
pub mod convert;
pub mod decoder;
pub mod device;
pub mod error;
pub mod format;
pub mod input;
pub mod player;
pub mod ring;
pub mod status;

pub use config::PlayerConfig;
pub use error::{HeaderError, StartError};
pub use format::{OutputSpec, SampleFormat};
pub use player::{Player, SourceFeed, UpdateMode};
pub use status::PlayerStatus;
