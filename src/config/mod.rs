// Persisted settings for Panflute
// Loaded once at startup, written back at shutdown; missing file means defaults

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::audio::equalizer::clamp_gain;
use crate::error::{Error, Result};

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 0-100, the master group gets `volume / 100`.
    pub volume: f32,
    pub mute: bool,
    pub fade_in_ms: f32,
    pub fade_out_ms: f32,
    pub shuffle: bool,
    pub repeat: bool,
    pub music_directories: Vec<PathBuf>,
    pub playlist_path: PathBuf,
    // Tables go last in TOML
    pub equalizer: EqualizerSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerSettings {
    pub is_enabled: bool,
    /// Gain in dB keyed by band label ("32" .. "16K").
    pub band_gains: BTreeMap<String, f32>,
}

impl EqualizerSettings {
    pub fn gain_for(&self, label: &str) -> f32 {
        self.band_gains
            .get(label)
            .copied()
            .map(clamp_gain)
            .unwrap_or(0.0)
    }
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("panflute");

        Self {
            volume: 80.0,
            mute: false,
            fade_in_ms: 1000.0,
            fade_out_ms: 1000.0,
            shuffle: false,
            repeat: false,
            music_directories: vec![
                dirs::audio_dir().unwrap_or_else(|| PathBuf::from("~/Music")),
            ],
            playlist_path: data_dir.join("playlist.json"),
            equalizer: EqualizerSettings::default(),
        }
    }
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        MIN_VOLUME
    } else {
        volume.clamp(MIN_VOLUME, MAX_VOLUME)
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Read settings from `path`, writing defaults there first if it doesn't
    /// exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No settings at {}, writing defaults", path.display());
            let settings = Settings::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)?;
        settings.volume = clamp_volume(settings.volume);
        settings.fade_in_ms = settings.fade_in_ms.max(0.0);
        settings.fade_out_ms = settings.fade_out_ms.max(0.0);
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let dir = config_dir()
            .ok_or_else(|| Error::config("Could not find config directory"))?
            .join("panflute");

        Ok(dir.join("config.toml"))
    }
}
