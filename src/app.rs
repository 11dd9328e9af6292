// Composition root - engine, playlist, cursor and file search wired together
// run() is the owning-thread loop: timer ticks, engine messages, shutdown

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::backend::{AudioBackend, BackendResult};
use crate::audio::player::{EngineMessage, EngineNotice, PlayerEngine, TIMER_INTERVAL};
use crate::audio::{
    FileSearchWorker, MediaRecord, PlayListCollection, PlaybackState, PlaylistFile,
    PlaylistNavigator, TagReader,
};
use crate::config::Settings;
use crate::error::Result;

/// Why [`App::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Shutdown,
    PlaylistFinished,
}

pub struct App<B: AudioBackend, R: TagReader + 'static> {
    engine: PlayerEngine<B>,
    playlist: PlayListCollection,
    navigator: PlaylistNavigator,
    search: FileSearchWorker<R>,
    messages: UnboundedReceiver<EngineMessage>,
    settings_path: Option<PathBuf>,
    exit_when_finished: bool,
    finished: bool,
    shuffle_this_run: bool,
    repeat_this_run: bool,
}

impl<B: AudioBackend, R: TagReader + 'static> App<B, R> {
    pub fn new<F>(factory: F, reader: R, settings: Settings) -> Self
    where
        F: FnMut() -> BackendResult<B> + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            engine: PlayerEngine::new(factory, settings, tx),
            playlist: PlayListCollection::new(),
            navigator: PlaylistNavigator::new(),
            search: FileSearchWorker::new(reader),
            messages: rx,
            settings_path: None,
            exit_when_finished: false,
            finished: false,
            shuffle_this_run: false,
            repeat_this_run: false,
        }
    }

    pub fn with_navigator(mut self, navigator: PlaylistNavigator) -> Self {
        self.navigator = navigator;
        self
    }

    /// Save settings here instead of the default config location.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    /// Make [`run`](Self::run) return once the last track of a non-repeating
    /// playlist has ended.
    pub fn set_exit_when_finished(&mut self, exit: bool) {
        self.exit_when_finished = exit;
    }

    /// Turn shuffle and/or repeat on until shutdown. The saved settings
    /// keep their own values.
    pub fn force_modes(&mut self, shuffle: bool, repeat: bool) {
        self.shuffle_this_run = shuffle;
        self.repeat_this_run = repeat;
    }

    pub fn engine(&self) -> &PlayerEngine<B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlayerEngine<B> {
        &mut self.engine
    }

    pub fn playlist(&self) -> &PlayListCollection {
        &self.playlist
    }

    pub fn playlist_mut(&mut self) -> &mut PlayListCollection {
        &mut self.playlist
    }

    pub fn navigator(&self) -> &PlaylistNavigator {
        &self.navigator
    }

    pub fn search(&self) -> &FileSearchWorker<R> {
        &self.search
    }

    pub fn configure(&mut self) -> bool {
        self.engine.configure()
    }

    /// Replace the playlist with whatever was saved last time.
    pub fn load_playlist(&mut self) {
        let path = self.engine.settings().playlist_path.clone();
        let records = PlaylistFile::load_or_empty(&path).into_shared();
        self.playlist.reset(records);
        self.navigator.clear();
    }

    fn shuffle(&self) -> bool {
        self.shuffle_this_run || self.engine.settings().shuffle
    }

    fn repeat(&self) -> bool {
        self.repeat_this_run || self.engine.settings().repeat
    }

    pub fn play_current(&mut self) -> bool {
        let shuffle = self.shuffle();
        match self.navigator.get_current(&self.playlist, shuffle) {
            Some(record) => {
                self.engine.play(&record);
                true
            }
            None => false,
        }
    }

    pub fn play_next(&mut self) -> bool {
        let shuffle = self.shuffle();
        match self.navigator.get_next(&self.playlist, shuffle) {
            Some(record) => {
                self.engine.play(&record);
                true
            }
            None => false,
        }
    }

    pub fn play_previous(&mut self) -> bool {
        let shuffle = self.shuffle();
        match self.navigator.get_prev(&self.playlist, shuffle) {
            Some(record) => {
                self.engine.play(&record);
                true
            }
            None => false,
        }
    }

    /// Pause or resume; from stopped, start the current record.
    pub fn toggle_pause(&mut self) {
        match self.engine.playback_state() {
            PlaybackState::Stopped => {
                self.play_current();
            }
            PlaybackState::Playing | PlaybackState::Paused => self.engine.pause(),
        }
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// A track played out. Keep going unless this was the last one and
    /// neither shuffle nor repeat is on. Returns whether playback continues.
    pub fn on_track_ended(&mut self) -> bool {
        if !self.shuffle() && !self.repeat() && self.navigator.is_last_playlist_file(&self.playlist)
        {
            info!("End of playlist");
            self.engine.stop();
            self.finished = true;
            return false;
        }
        self.play_next()
    }

    pub fn handle_message(&mut self, message: EngineMessage) {
        if self.engine.handle_message(message) == Some(EngineNotice::TrackEnded) {
            self.on_track_ended();
        }
    }

    /// Handle everything already posted without waiting.
    pub fn pump_messages(&mut self) {
        while let Ok(message) = self.messages.try_recv() {
            self.handle_message(message);
        }
    }

    /// Search `paths`, then append what was found in album order as one bulk
    /// add. Returns how many records were added.
    pub async fn add_paths(&mut self, paths: Vec<PathBuf>) -> Result<usize> {
        let handle = self.search.start_search(paths)?;
        let mut outcome = handle.await?;
        if outcome.cancelled {
            warn!("Search cancelled, adding {} partial results", outcome.records.len());
        }

        outcome.records.sort_by(|a, b| a.album_order(b));
        let count = outcome.records.len();
        self.playlist
            .add_items(outcome.records.into_iter().map(MediaRecord::into_shared));
        Ok(count)
    }

    /// The owning-thread loop: engine ticks, end-of-track posts, shutdown.
    pub async fn run<F>(&mut self, shutdown: F) -> RunExit
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(TIMER_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        self.finished = false;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Shutdown requested");
                    return RunExit::Shutdown;
                }
                Some(message) = self.messages.recv() => {
                    self.handle_message(message);
                    if self.exit_when_finished && self.finished {
                        return RunExit::PlaylistFinished;
                    }
                }
                _ = ticker.tick() => {
                    if self.engine.timer().is_running() {
                        self.engine.on_timer_tick();
                    }
                }
            }
        }
    }

    /// Save the playlist and settings, then release the engine. The engine is
    /// released even when saving fails.
    pub fn shutdown(&mut self) -> Result<()> {
        self.search.cancel();

        let playlist_path = self.engine.settings().playlist_path.clone();
        let saved_playlist = PlaylistFile::from_collection(&self.playlist).save(&playlist_path);

        self.engine.cleanup();

        let saved_settings = match &self.settings_path {
            Some(path) => self.engine.settings().save_to(path),
            None => self.engine.settings().save(),
        };

        saved_playlist.and(saved_settings)
    }
}
