// Tag reading - the opaque collaborator the scanner asks "what is this file?"
// ID3 for descriptive fields, symphonia (when `probe` is on) for stream properties

use id3::TagLike;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Everything a tag reader can say about one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagData {
    pub title: Option<String>,
    pub performers: Vec<String>,
    pub album: Option<String>,
    pub genres: Vec<String>,
    pub track: Option<u32>,
    pub track_count: Option<u32>,
    pub disc: Option<u32>,
    pub disc_count: Option<u32>,
    pub year: Option<i32>,
    pub duration: Option<Duration>,
    pub is_vbr: bool,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub file_size: u64,
}

pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TagData>;
}

/// Reads real files. Missing or broken tags are not an error, an unreadable
/// file is.
#[derive(Debug, Clone, Default)]
pub struct FileTagReader;

// How far into an mp3 we look for a Xing/VBRI header
const VBR_SCAN_BYTES: u64 = 64 * 1024;

impl FileTagReader {
    pub fn new() -> Self {
        Self
    }

    fn read_id3(&self, path: &Path, data: &mut TagData) {
        let tag = match id3::Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(e) => {
                debug!("No ID3 tag in {}: {}", path.display(), e);
                return;
            }
        };

        data.title = tag.title().map(|s| s.to_string());
        data.performers = split_multi(tag.artist());
        data.album = tag.album().map(|s| s.to_string());
        data.genres = split_multi(tag.genre());
        data.track = tag.track();
        data.track_count = tag.total_tracks();
        data.disc = tag.disc();
        data.disc_count = tag.total_discs();
        data.year = tag.year();
        data.duration = tag.duration().map(|ms| Duration::from_millis(ms as u64));
    }

    fn detect_vbr(&self, path: &Path) -> Result<bool> {
        let file = File::open(path)?;
        let mut head = Vec::new();
        file.take(VBR_SCAN_BYTES).read_to_end(&mut head)?;
        Ok(head.windows(4).any(|w| w == b"Xing" || w == b"VBRI"))
    }

    /// Duration and sample rate straight from the container.
    #[cfg(feature = "probe")]
    fn probe_stream(&self, path: &Path) -> Result<(Option<Duration>, Option<u32>)> {
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::tags(path, e.to_string()))?;

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| Error::tags(path, "no supported audio tracks"))?;

        let params = &track.codec_params;
        let duration = match (params.time_base, params.n_frames) {
            (Some(time_base), Some(n_frames)) => {
                let time = time_base.calc_time(n_frames);
                Some(Duration::from_secs_f64(time.seconds as f64 + time.frac))
            }
            _ => None,
        };

        Ok((duration, params.sample_rate))
    }

    #[cfg(not(feature = "probe"))]
    fn probe_stream(&self, _path: &Path) -> Result<(Option<Duration>, Option<u32>)> {
        Ok((None, None))
    }
}

impl TagReader for FileTagReader {
    fn read_tags(&self, path: &Path) -> Result<TagData> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::tags(path, "not a regular file"));
        }

        let mut data = TagData {
            file_size: metadata.len(),
            ..TagData::default()
        };

        let is_mp3 = has_extension(path, "mp3");
        if is_mp3 || has_extension(path, "wav") {
            self.read_id3(path, &mut data);
        }

        if is_mp3 {
            data.is_vbr = self.detect_vbr(path)?;
        }

        match self.probe_stream(path) {
            Ok((duration, sample_rate)) => {
                if duration.is_some() {
                    data.duration = duration;
                }
                data.sample_rate = sample_rate;
            }
            Err(e) => debug!("Could not probe {}: {}", path.display(), e),
        }

        data.bitrate_kbps = data.duration.and_then(|d| {
            let secs = d.as_secs_f64();
            (secs > 0.0).then(|| (data.file_size as f64 * 8.0 / secs / 1000.0).round() as u32)
        });

        Ok(data)
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case(wanted))
}

// ID3v2.4 packs multiple values into one frame separated by NUL
fn split_multi(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split('\0')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
