// A media record - one file and the tags read from it
// Shared as Rc<RefCell<..>> on the owning thread

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use uuid::Uuid;

use super::tags::TagData;
use super::PlaybackState;

/// A record shared between the playlist, the navigator and the engine.
/// `Rc` keeps it on the owning thread.
pub type SharedRecord = Rc<RefCell<MediaRecord>>;

/// Index carried by records that are not inside a playlist collection.
pub const NO_PLAYLIST_INDEX: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    // Per-entry identity: duplicates of one file stay distinct entries
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,
    pub file_path: PathBuf,
    pub display_name: String,
    #[serde(default)]
    pub tags: TrackTags,
    #[serde(default)]
    pub file_size: u64,

    // Session fields, never persisted
    #[serde(skip, default = "no_playlist_index")]
    pub playlist_index: i32,
    #[serde(skip)]
    pub playback_state: PlaybackState,
}

/// Tag-derived descriptive fields. Everything is optional because half the
/// files out there have broken or missing tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackTags {
    pub title: Option<String>,
    pub performer: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_count: Option<u32>,
    pub year: Option<i32>,
    pub duration_ms: Option<u64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub is_vbr: bool,
}

fn no_playlist_index() -> i32 {
    NO_PLAYLIST_INDEX
}

impl MediaRecord {
    pub fn new(file_path: PathBuf) -> Self {
        let display_name = file_stem(&file_path);
        Self {
            id: Uuid::new_v4(),
            file_path,
            display_name,
            tags: TrackTags::default(),
            file_size: 0,
            playlist_index: NO_PLAYLIST_INDEX,
            playback_state: PlaybackState::Stopped,
        }
    }

    /// Build a record from what the tag reader found. When neither title nor
    /// performer is present, the filename stands in as the title.
    pub fn from_tags(file_path: PathBuf, data: TagData) -> Self {
        let mut record = Self::new(file_path);
        record.file_size = data.file_size;
        record.tags = TrackTags {
            title: non_empty(data.title),
            performer: join_values(&data.performers),
            album: non_empty(data.album),
            genre: join_values(&data.genres),
            track_number: data.track,
            track_count: data.track_count,
            disc_number: data.disc,
            disc_count: data.disc_count,
            year: data.year,
            duration_ms: data.duration.map(|d| d.as_millis() as u64),
            bitrate_kbps: data.bitrate_kbps,
            sample_rate: data.sample_rate,
            is_vbr: data.is_vbr,
        };

        if record.tags.title.is_none() && record.tags.performer.is_none() {
            record.tags.title = Some(file_stem(&record.file_path));
        }
        record.display_name = record.compose_display_name();
        record
    }

    /// Wrap for use inside a collection.
    pub fn into_shared(self) -> SharedRecord {
        Rc::new(RefCell::new(self))
    }

    pub fn is_vbr(&self) -> bool {
        self.tags.is_vbr
    }

    pub fn duration(&self) -> Option<Duration> {
        self.tags.duration_ms.map(Duration::from_millis)
    }

    pub fn display_title(&self) -> String {
        self.tags
            .title
            .clone()
            .unwrap_or_else(|| file_stem(&self.file_path))
    }

    pub fn display_performer(&self) -> String {
        self.tags
            .performer
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }

    pub fn display_album(&self) -> String {
        self.tags
            .album
            .clone()
            .unwrap_or_else(|| "Unknown Album".to_string())
    }

    pub fn duration_string(&self) -> String {
        match self.tags.duration_ms {
            Some(ms) => {
                let total = ms / 1000;
                let hours = total / 3600;
                let minutes = (total % 3600) / 60;
                let seconds = total % 60;
                if hours > 0 {
                    format!("{}:{:02}:{:02}", hours, minutes, seconds)
                } else {
                    format!("{}:{:02}", minutes, seconds)
                }
            }
            None => "Unknown".to_string(),
        }
    }

    /// Performer, album, disc, track - the order an album listing expects.
    pub fn album_order(&self, other: &MediaRecord) -> Ordering {
        let key = |r: &MediaRecord| {
            (
                r.tags.performer.clone().unwrap_or_default().to_lowercase(),
                r.tags.album.clone().unwrap_or_default().to_lowercase(),
                r.tags.disc_number.unwrap_or(0),
                r.tags.track_number.unwrap_or(0),
            )
        };
        key(self)
            .cmp(&key(other))
            .then_with(|| self.file_path.cmp(&other.file_path))
    }

    /// Fresh copy for a new playlist entry: new id, no session state.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            playlist_index: NO_PLAYLIST_INDEX,
            playback_state: PlaybackState::Stopped,
            ..self.clone()
        }
    }

    fn compose_display_name(&self) -> String {
        match (&self.tags.performer, &self.tags.title) {
            (Some(performer), Some(title)) => format!("{} - {}", performer, title),
            (None, Some(title)) => title.clone(),
            _ => file_stem(&self.file_path),
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Multi-valued frames: drop blanks, join what's left with '/'
fn join_values(values: &[String]) -> Option<String> {
    let parts: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
