// Panflute - playback engine and media discovery for a desktop audio player
// The UI lives elsewhere; everything here runs on one owning thread plus workers

pub mod app;       // composition root and the owning-thread loop
pub mod audio;     // engine, channels, equalizer, playlist, scanning, tags
pub mod config;    // persisted settings
pub mod error;     // crate error type
pub mod notify;    // observer plumbing

// Export the stuff callers actually use
pub use app::{App, RunExit};
pub use audio::{
    FileSearchWorker, FileTagReader, MediaRecord, PlayListCollection, PlaybackState,
    PlayerEngine, PlaylistNavigator, SharedRecord,
};
pub use config::Settings;
pub use error::{Error, Result};
