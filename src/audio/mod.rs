// Audio side of the player - engine, backends, playlist, scanning, tags

pub mod backend;
pub mod channel;
pub mod equalizer;
pub mod player;
pub mod playlist;
pub mod scanner;
pub mod tags;
pub mod track;

pub use channel::{fade_volume, ChannelSession, SessionId};
pub use equalizer::{Equalizer, EqualizerBand};
pub use player::{EngineEvent, EngineMessage, EngineNotice, PlayerEngine};
pub use playlist::{CollectionChanged, PlayListCollection, PlaylistFile, PlaylistNavigator};
pub use scanner::{FileSearchWorker, ScanProgress, SearchOutcome};
pub use tags::{FileTagReader, TagData, TagReader};
pub use track::{MediaRecord, SharedRecord};

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    Wma,
    Ogg,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "wma" => AudioFormat::Wma,
            "ogg" => AudioFormat::Ogg,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Unknown)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }
}
