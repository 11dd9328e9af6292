// Native audio engine boundary - sounds, channels, master group, DSP chain
// Handles are plain ids released exactly once; InvalidHandle during teardown means "already gone"

#[cfg(feature = "audio")]
mod rodio_backend;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "audio")]
pub use rodio_backend::RodioBackend;

use std::path::{Path, PathBuf};
use tracing::warn;

/// Oldest engine version the player accepts.
pub const MIN_BACKEND_VERSION: u32 = 0x0001_0000;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Fired once on the engine's own thread when a channel plays to the end.
pub type EndCallback = Box<dyn Fn() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("invalid or released handle")]
    InvalidHandle,

    #[error("engine version {found:#x} is older than required {required:#x}")]
    VersionTooOld { found: u32, required: u32 },

    #[error("engine not initialized")]
    NotInitialized,

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("cannot open {path}: {message}")]
    File { path: PathBuf, message: String },

    #[error("output device error: {0}")]
    Output(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl BackendError {
    pub fn file(path: &Path, message: impl Into<String>) -> Self {
        Self::File {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Self::InvalidHandle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DspId(pub u64);

/// Init flags passed through to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitFlags {
    pub normal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspKind {
    /// Peaking filter: center, bandwidth, gain.
    ParamEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspParam {
    /// Hz
    Center,
    /// Octaves
    Bandwidth,
    /// dB
    Gain,
}

pub trait AudioBackend {
    fn version(&self) -> BackendResult<u32>;
    fn init(&mut self, max_channels: u32, flags: InitFlags) -> BackendResult<()>;
    fn set_stream_buffer_size(&mut self, bytes: u32) -> BackendResult<()>;

    fn create_stream(&mut self, path: &Path, accurate_time: bool) -> BackendResult<SoundId>;
    fn sound_length_ms(&self, sound: SoundId) -> BackendResult<u32>;
    fn release_sound(&mut self, sound: SoundId) -> BackendResult<()>;

    /// Play on the master channel group.
    fn play_sound(&mut self, sound: SoundId, paused: bool) -> BackendResult<ChannelId>;
    fn channel_set_paused(&mut self, channel: ChannelId, paused: bool) -> BackendResult<()>;
    fn channel_is_paused(&self, channel: ChannelId) -> BackendResult<bool>;
    fn channel_set_volume(&mut self, channel: ChannelId, volume: f32) -> BackendResult<()>;
    fn channel_set_position(&mut self, channel: ChannelId, position_ms: u32) -> BackendResult<()>;
    fn channel_position(&self, channel: ChannelId) -> BackendResult<u32>;
    fn channel_set_end_callback(
        &mut self,
        channel: ChannelId,
        callback: Option<EndCallback>,
    ) -> BackendResult<()>;
    /// Stop the channel and free it.
    fn stop_channel(&mut self, channel: ChannelId) -> BackendResult<()>;

    fn master_set_volume(&mut self, volume: f32) -> BackendResult<()>;
    fn master_set_mute(&mut self, mute: bool) -> BackendResult<()>;

    fn create_dsp(&mut self, kind: DspKind) -> BackendResult<DspId>;
    fn dsp_set_parameter(&mut self, dsp: DspId, param: DspParam, value: f32) -> BackendResult<()>;
    fn dsp_set_active(&mut self, dsp: DspId, active: bool) -> BackendResult<()>;
    fn master_add_dsp(&mut self, dsp: DspId) -> BackendResult<()>;
    fn master_remove_dsp(&mut self, dsp: DspId) -> BackendResult<()>;
    fn release_dsp(&mut self, dsp: DspId) -> BackendResult<()>;

    fn lock_dsp(&mut self) -> BackendResult<()>;
    fn unlock_dsp(&mut self) -> BackendResult<()>;
    fn update(&mut self) -> BackendResult<()>;
    fn close(&mut self) -> BackendResult<()>;
    fn release(&mut self) -> BackendResult<()>;
}

/// A native handle that may be empty. `release` hands the raw id to the
/// releaser once; every later call is a no-op.
#[derive(Debug, PartialEq, Eq)]
pub struct Handle<T: Copy> {
    raw: Option<T>,
}

impl<T: Copy> Handle<T> {
    pub fn new(raw: T) -> Self {
        Self { raw: Some(raw) }
    }

    pub fn empty() -> Self {
        Self { raw: None }
    }

    pub fn get(&self) -> Option<T> {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_some()
    }

    /// Release through `releaser`. An already-invalid handle on the engine side
    /// counts as released; any other failure is logged.
    pub fn release<F>(&mut self, what: &str, releaser: F) -> bool
    where
        F: FnOnce(T) -> BackendResult<()>,
    {
        let Some(raw) = self.raw.take() else {
            return false;
        };
        match releaser(raw) {
            Ok(()) | Err(BackendError::InvalidHandle) => {}
            Err(e) => warn!("Failed to release {}: {}", what, e),
        }
        true
    }
}

impl<T: Copy> Default for Handle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Log a failed steady-state call and carry on. `InvalidHandle` stays quiet.
pub(crate) fn check<T>(result: BackendResult<T>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(BackendError::InvalidHandle) => None,
        Err(e) => {
            warn!("Audio engine call failed ({}): {}", what, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_release_is_idempotent() {
        let mut handle = Handle::new(SoundId(3));
        let mut calls = 0;
        assert!(handle.release("sound", |id| {
            calls += 1;
            assert_eq!(id, SoundId(3));
            Ok(())
        }));
        assert!(!handle.release("sound", |_| {
            calls += 1;
            Ok(())
        }));
        assert_eq!(calls, 1);
        assert!(!handle.is_valid());
    }

    #[test]
    fn test_release_tolerates_invalid_handle() {
        let mut handle = Handle::new(ChannelId(1));
        assert!(handle.release("channel", |_| Err(BackendError::InvalidHandle)));
        assert!(handle.get().is_none());
    }

    #[test]
    fn test_check_swallows_failures() {
        assert_eq!(check(Ok(5), "ok"), Some(5));
        assert_eq!(check::<u32>(Err(BackendError::InvalidHandle), "gone"), None);
        assert_eq!(
            check::<u32>(Err(BackendError::Output("device lost".into())), "volume"),
            None
        );
    }
}
