// Background file search - expands folders, reads tags, reports progress
// Runs on the blocking pool; results come back sorted and a cancel keeps what was found

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::tags::TagReader;
use super::track::MediaRecord;
use super::AudioFormat;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { inputs: usize },
    DirectoryStarted { path: PathBuf },
    RecordFound { path: PathBuf, found: usize },
    Error { path: PathBuf, error: String },
    Completed { total_records: usize, cancelled: bool },
}

/// What a finished (or cancelled) search hands back. A cancelled search keeps
/// everything it found before the cancel.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub records: Vec<MediaRecord>,
    pub cancelled: bool,
}

/// Append-only queue the scan fills while it runs; readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    inner: Arc<Mutex<Vec<MediaRecord>>>,
}

impl SearchResults {
    fn lock(&self) -> MutexGuard<'_, Vec<MediaRecord>> {
        // A panicked scan leaves a perfectly usable list behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, record: MediaRecord) {
        self.lock().push(record);
    }

    fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<MediaRecord> {
        self.lock().clone()
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    AudioFormat::from_path(path).is_supported()
}

/// Background file discovery. One search at a time per worker.
pub struct FileSearchWorker<R: TagReader + 'static> {
    reader: Arc<R>,
    working: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    results: SearchResults,
    progress: Option<mpsc::UnboundedSender<ScanProgress>>,
}

impl<R: TagReader + 'static> FileSearchWorker<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Arc::new(reader),
            working: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            results: SearchResults::default(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<ScanProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    /// Ask the running search to stop. It returns what it has so far.
    pub fn cancel(&self) {
        if self.is_working() {
            debug!("File search cancellation requested");
        }
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn results(&self) -> &SearchResults {
        &self.results
    }

    /// Scan `inputs` (files and directories) on the blocking pool. Must be
    /// called from inside a tokio runtime.
    pub fn start_search(&self, inputs: Vec<PathBuf>) -> Result<JoinHandle<SearchOutcome>> {
        if self.working.swap(true, Ordering::SeqCst) {
            return Err(Error::SearchInProgress);
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.results.clear();

        let reader = Arc::clone(&self.reader);
        let cancel = Arc::clone(&self.cancel);
        let results = self.results.clone();
        let progress = self.progress.clone();
        let working = WorkingGuard(Arc::clone(&self.working));

        Ok(tokio::task::spawn_blocking(move || {
            let _working = working;
            run_search(reader.as_ref(), &inputs, &cancel, &results, progress.as_ref())
        }))
    }
}

// Clears the busy flag however the scan ends
struct WorkingGuard(Arc<AtomicBool>);

impl Drop for WorkingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The scan itself, synchronous. Direct files first in path order, then every
/// directory under the inputs in path order, one level each. `cancel` is
/// checked before every file and every directory.
pub fn run_search<R: TagReader + ?Sized>(
    reader: &R,
    inputs: &[PathBuf],
    cancel: &AtomicBool,
    results: &SearchResults,
    progress: Option<&mpsc::UnboundedSender<ScanProgress>>,
) -> SearchOutcome {
    let mut scan = Scan {
        reader,
        cancel,
        results,
        progress,
        records: Vec::new(),
    };
    scan.report(ScanProgress::Started {
        inputs: inputs.len(),
    });

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut roots = Vec::new();
    for input in inputs {
        if !seen.insert(input.clone()) {
            continue;
        }
        if input.is_dir() {
            roots.push(input.clone());
        } else if is_audio_file(input) {
            files.push(input.clone());
        } else {
            debug!("Skipping non-audio input {}", input.display());
        }
    }

    files.sort();
    for file in &files {
        if scan.cancelled() {
            break;
        }
        scan.convert(file);
    }

    let directories = scan.expand(&roots);
    for dir in &directories {
        if scan.cancelled() {
            break;
        }
        scan.scan_directory(dir);
    }

    let cancelled = scan.cancelled();
    let total_records = scan.records.len();
    scan.report(ScanProgress::Completed {
        total_records,
        cancelled,
    });
    if cancelled {
        info!("File search cancelled after {} records", total_records);
    } else {
        info!("File search found {} records", total_records);
    }

    SearchOutcome {
        records: scan.records,
        cancelled,
    }
}

struct Scan<'a, R: TagReader + ?Sized> {
    reader: &'a R,
    cancel: &'a AtomicBool,
    results: &'a SearchResults,
    progress: Option<&'a mpsc::UnboundedSender<ScanProgress>>,
    records: Vec<MediaRecord>,
}

impl<R: TagReader + ?Sized> Scan<'_, R> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn report(&self, event: ScanProgress) {
        if let Some(progress) = self.progress {
            let _ = progress.send(event);
        }
    }

    fn report_error(&self, path: &Path, error: impl ToString) {
        self.report(ScanProgress::Error {
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }

    /// Every directory under `roots` (roots included), deduplicated and sorted.
    fn expand(&self, roots: &[PathBuf]) -> BTreeSet<PathBuf> {
        let mut directories = BTreeSet::new();
        'roots: for root in roots {
            let walker = WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.file_type().is_dir());
            for entry in walker {
                if self.cancelled() {
                    break 'roots;
                }
                match entry {
                    Ok(entry) => {
                        directories.insert(entry.into_path());
                    }
                    Err(e) => {
                        let path = e.path().unwrap_or(root).to_path_buf();
                        warn!("Skipping directory {}: {}", path.display(), e);
                        self.report_error(&path, &e);
                    }
                }
            }
        }
        directories
    }

    fn scan_directory(&mut self, dir: &Path) {
        self.report(ScanProgress::DirectoryStarted {
            path: dir.to_path_buf(),
        });

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read directory {}: {}", dir.display(), e);
                self.report_error(dir, &e);
                return;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| is_audio_file(path))
            .collect();
        files.sort();

        for file in &files {
            if self.cancelled() {
                return;
            }
            self.convert(file);
        }
    }

    fn convert(&mut self, path: &Path) {
        match self.reader.read_tags(path) {
            Ok(data) => {
                let record = MediaRecord::from_tags(path.to_path_buf(), data);
                self.results.push(record.clone());
                self.records.push(record);
                self.report(ScanProgress::RecordFound {
                    path: path.to_path_buf(),
                    found: self.records.len(),
                });
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                self.report_error(path, &e);
            }
        }
    }
}
