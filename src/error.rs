// Crate-wide error type - library code returns Result, binaries wrap it in anyhow
// Native engine statuses stay in BackendError since most are logged and swallowed

use std::path::PathBuf;

use crate::audio::backend::BackendError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio engine error: {0}")]
    Backend(#[from] BackendError),

    #[error("Tag error for {path}: {message}")]
    Tags { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlRead(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("A file search is already running")]
    SearchInProgress,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn tags(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Tags {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_error_mentions_path() {
        let err = Error::tags("/music/song.mp3", "unreadable");
        let msg = err.to_string();
        assert!(msg.contains("song.mp3"));
        assert!(msg.contains("unreadable"));
    }

    #[test]
    fn test_backend_error_converts() {
        let err: Error = BackendError::InvalidHandle.into();
        assert!(matches!(err, Error::Backend(BackendError::InvalidHandle)));
    }
}
