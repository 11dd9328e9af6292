// Playback engine - native system, current sound + session, EQ, volume/mute, poll timer
// Driven from one thread: ticked every TIMER_INTERVAL and fed the end-of-track messages

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::backend::{
    check, AudioBackend, BackendError, BackendResult, Handle, InitFlags, SoundId,
    MIN_BACKEND_VERSION,
};
use super::channel::{ChannelSession, SessionId};
use super::equalizer::Equalizer;
use super::track::SharedRecord;
use super::PlaybackState;
use crate::config::{clamp_volume, Settings, MAX_VOLUME};
use crate::notify::{Notifier, Observable, SubscriptionId};

pub const MAX_CHANNELS: u32 = 16;
pub const STREAM_BUFFER_BYTES: u32 = 64 * 1024;
pub const TIMER_INTERVAL: Duration = Duration::from_millis(10);

/// Posted from the native engine's thread to the owning thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    TrackEnded { session: SessionId },
}

/// What the owning thread should react to after handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineNotice {
    TrackEnded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlaybackStateChanged(PlaybackState),
    PositionChanged(u32),
    LengthChanged(u32),
    VolumeChanged(f32),
    MuteChanged(bool),
    CurrentMediaChanged(Option<PathBuf>),
}

/// Armed once by `configure`, then started and stopped with playback.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollTimer {
    armed: bool,
    running: bool,
}

impl PollTimer {
    pub fn interval(&self) -> Duration {
        TIMER_INTERVAL
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn start(&mut self) {
        self.running = self.armed;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.running = false;
    }
}

type BackendFactory<B> = Box<dyn FnMut() -> BackendResult<B>>;

pub struct PlayerEngine<B: AudioBackend> {
    factory: BackendFactory<B>,
    system: Option<B>,
    initialized: bool,

    sound: Handle<SoundId>,
    session: Option<ChannelSession>,
    last_session: u64,
    current: Option<SharedRecord>,
    equalizer: Option<Equalizer>,

    settings: Settings,
    length_ms: u32,
    position_ms: u32,
    state: PlaybackState,
    timer: PollTimer,

    messages: UnboundedSender<EngineMessage>,
    events: Notifier<EngineEvent>,
}

impl<B: AudioBackend> PlayerEngine<B> {
    /// `factory` creates the native system; it runs on every `configure`
    /// attempt. `messages` is where end-of-track callbacks post to.
    pub fn new<F>(factory: F, settings: Settings, messages: UnboundedSender<EngineMessage>) -> Self
    where
        F: FnMut() -> BackendResult<B> + 'static,
    {
        Self {
            factory: Box::new(factory),
            system: None,
            initialized: false,
            sound: Handle::empty(),
            session: None,
            last_session: 0,
            current: None,
            equalizer: None,
            settings,
            length_ms: 0,
            position_ms: 0,
            state: PlaybackState::Stopped,
            timer: PollTimer::default(),
            messages,
            events: Notifier::new(),
        }
    }

    /// Bring the native system up. False means it stays down and every
    /// playback call is a no-op; a half-built system is closed first.
    pub fn configure(&mut self) -> bool {
        if self.initialized {
            return true;
        }

        match self.try_configure() {
            Ok(()) => {
                self.initialized = true;
                self.state = PlaybackState::Stopped;
                self.timer.arm();
                info!(
                    "Audio engine ready (volume {}, mute {}, equalizer {})",
                    self.settings.volume, self.settings.mute, self.settings.equalizer.is_enabled
                );
                true
            }
            Err(e) => {
                error!("Audio engine configuration failed: {}", e);
                false
            }
        }
    }

    fn try_configure(&mut self) -> BackendResult<()> {
        let mut system = (self.factory)()?;

        if let Err(e) = init_system(&mut system) {
            close_system(&mut system);
            return Err(e);
        }

        let mut equalizer = match Equalizer::get_equalizer(&mut system, &self.settings.equalizer) {
            Ok(equalizer) => equalizer,
            Err(e) => {
                close_system(&mut system);
                return Err(e);
            }
        };

        let restored = system
            .master_set_volume(self.settings.volume / MAX_VOLUME)
            .and_then(|_| system.master_set_mute(self.settings.mute));
        if let Err(e) = restored {
            equalizer.release(&mut system, &mut self.settings.equalizer);
            close_system(&mut system);
            return Err(e);
        }

        self.system = Some(system);
        self.equalizer = Some(equalizer);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn length_ms(&self) -> u32 {
        self.length_ms
    }

    pub fn position_ms(&self) -> u32 {
        self.position_ms
    }

    pub fn current_media(&self) -> Option<&SharedRecord> {
        self.current.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(ChannelSession::id)
    }

    pub fn timer(&self) -> PollTimer {
        self.timer
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn equalizer(&self) -> Option<&Equalizer> {
        self.equalizer.as_ref()
    }

    /// Start `record` from the top. Whatever was playing is torn down first.
    /// An unreadable file leaves the engine stopped with nothing dangling.
    pub fn play(&mut self, record: &SharedRecord) {
        if !self.initialized {
            warn!("Play ignored, audio engine not initialized");
            return;
        }

        let replaced = self.release_current();

        let Some(system) = self.system.as_mut() else {
            return;
        };
        let (path, accurate_time) = {
            let r = record.borrow();
            (r.file_path.clone(), r.is_vbr())
        };

        let sound = match system.create_stream(&path, accurate_time) {
            Ok(sound) => sound,
            Err(e) => {
                warn!("Cannot play {}: {}", path.display(), e);
                self.reset_stopped(replaced);
                return;
            }
        };
        self.sound = Handle::new(sound);
        let length_ms = check(system.sound_length_ms(sound), "sound length").unwrap_or(0);

        // Start paused so the session and its callback exist before the
        // engine can report the end of the track
        let session = system.play_sound(sound, true).and_then(|channel| {
            self.last_session += 1;
            ChannelSession::new(
                system,
                channel,
                Rc::clone(record),
                SessionId(self.last_session),
                &self.messages,
            )
        });
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot start playback of {}: {}", path.display(), e);
                self.sound.release("sound", |raw| system.release_sound(raw));
                self.reset_stopped(replaced);
                return;
            }
        };

        let fade_in = self.settings.fade_in_ms;
        if !session.apply_fade(system, 0.0, 1.0, 0.0, fade_in, 0.0) {
            check(session.set_volume(system, 1.0), "channel volume");
        }

        self.timer.start();
        self.length_ms = length_ms;
        self.position_ms = 0;
        self.state = PlaybackState::Playing;
        record.borrow_mut().playback_state = PlaybackState::Playing;
        check(session.set_paused(system, false), "unpause");
        self.session = Some(session);
        self.current = Some(Rc::clone(record));

        info!("Playing {} ({} ms)", path.display(), length_ms);
        self.events.notify(&EngineEvent::CurrentMediaChanged(Some(path)));
        self.events.notify(&EngineEvent::LengthChanged(length_ms));
        self.events.notify(&EngineEvent::PositionChanged(0));
        self.events
            .notify(&EngineEvent::PlaybackStateChanged(PlaybackState::Playing));
    }

    /// Toggle pause on the current session.
    pub fn pause(&mut self) {
        if !self.initialized {
            warn!("Pause ignored, audio engine not initialized");
            return;
        }
        let (Some(system), Some(session)) = (self.system.as_mut(), self.session.as_ref()) else {
            return;
        };

        match session.toggle_pause(system) {
            Ok(paused) => {
                let state = if paused {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                };
                session.record().borrow_mut().playback_state = state;
                self.set_state(state);
            }
            Err(e) => warn!("Pause toggle failed: {}", e),
        }
    }

    pub fn stop(&mut self) {
        if !self.initialized {
            warn!("Stop ignored, audio engine not initialized");
            return;
        }
        let cleared = self.release_current();
        self.reset_stopped(cleared);
    }

    /// Seek, clamped to the track. Pause state is preserved.
    pub fn set_current_position(&mut self, position_ms: i64) {
        if !self.initialized {
            warn!("Seek ignored, audio engine not initialized");
            return;
        }
        let (Some(system), Some(session)) = (self.system.as_mut(), self.session.as_ref()) else {
            return;
        };
        if self.length_ms == 0 {
            return;
        }

        let target = position_ms.clamp(0, i64::from(self.length_ms) - 1) as u32;
        match session.set_position(system, target) {
            Ok(()) => {
                self.position_ms = target;
                self.events.notify(&EngineEvent::PositionChanged(target));
            }
            Err(BackendError::InvalidHandle) => {}
            Err(e) => warn!("Seek to {} ms failed: {}", target, e),
        }
    }

    pub fn volume(&self) -> f32 {
        self.settings.volume
    }

    /// 0-100; persisted even while the engine is down.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = clamp_volume(volume);
        self.settings.volume = volume;
        if let Some(system) = self.system.as_mut() {
            check(
                system.master_set_volume(volume / MAX_VOLUME),
                "master volume",
            );
        }
        self.events.notify(&EngineEvent::VolumeChanged(volume));
    }

    pub fn is_mute(&self) -> bool {
        self.settings.mute
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.settings.mute = mute;
        if let Some(system) = self.system.as_mut() {
            check(system.master_set_mute(mute), "master mute");
        }
        self.events.notify(&EngineEvent::MuteChanged(mute));
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        match (self.system.as_mut(), self.equalizer.as_mut()) {
            (Some(system), Some(equalizer)) => {
                if let Err(e) = equalizer.set_enabled(system, enabled, &mut self.settings.equalizer)
                {
                    warn!("Equalizer toggle failed: {}", e);
                }
            }
            _ => self.settings.equalizer.is_enabled = enabled,
        }
    }

    pub fn set_band_gain(&mut self, index: usize, gain: f32) {
        let (Some(system), Some(equalizer)) = (self.system.as_mut(), self.equalizer.as_mut())
        else {
            warn!("Band gain ignored, audio engine not initialized");
            return;
        };
        if let Err(e) = equalizer.set_band_gain(system, index, gain, &mut self.settings.equalizer) {
            warn!("Equalizer band {} gain failed: {}", index, e);
        }
    }

    pub fn reset_equalizer(&mut self) {
        let (Some(system), Some(equalizer)) = (self.system.as_mut(), self.equalizer.as_mut())
        else {
            return;
        };
        if let Err(e) = equalizer.set_to_default(system, &mut self.settings.equalizer) {
            warn!("Equalizer reset failed: {}", e);
        }
    }

    /// One poll: position, fades, native update. A channel that just went
    /// away skips the tick.
    pub fn on_timer_tick(&mut self) {
        if !self.timer.is_running() {
            return;
        }
        let (Some(system), Some(session)) = (self.system.as_mut(), self.session.as_ref()) else {
            return;
        };
        let Some(position) = check(session.position(&*system), "channel position") else {
            return;
        };

        self.position_ms = position;
        let now = position as f32;
        let length = self.length_ms as f32;
        let fade_in = self.settings.fade_in_ms;
        let fade_out = self.settings.fade_out_ms;

        let fading = session.apply_fade(system, 0.0, 1.0, 0.0, fade_in, now)
            || session.apply_fade(system, 1.0, 0.0, length - fade_out, fade_out, now);
        if !fading {
            check(session.set_volume(system, 1.0), "channel volume");
        }
        check(system.update(), "update");

        self.events.notify(&EngineEvent::PositionChanged(position));
    }

    /// Handle a post from an end-of-track callback. Posts from sessions that
    /// are already gone are dropped.
    pub fn handle_message(&mut self, message: EngineMessage) -> Option<EngineNotice> {
        match message {
            EngineMessage::TrackEnded { session } => {
                if self.session_id() != Some(session) {
                    debug!("Ignoring end of stale session {:?}", session);
                    return None;
                }
                debug!("Session {:?} reached the end", session);
                let cleared = self.release_current();
                self.reset_stopped(cleared);
                Some(EngineNotice::TrackEnded)
            }
        }
    }

    /// Shut everything down. Safe before `configure` and safe to repeat.
    pub fn cleanup(&mut self) {
        self.timer.disarm();
        if self.release_current() {
            self.events.notify(&EngineEvent::CurrentMediaChanged(None));
        }

        if let Some(mut system) = self.system.take() {
            if let Some(mut equalizer) = self.equalizer.take() {
                equalizer.release(&mut system, &mut self.settings.equalizer);
            }
            close_system(&mut system);
            info!("Audio engine shut down");
        }

        self.initialized = false;
        self.length_ms = 0;
        self.position_ms = 0;
        self.state = PlaybackState::Stopped;
    }

    /// Tear down the session and sound. True when a record was current.
    fn release_current(&mut self) -> bool {
        if let Some(system) = self.system.as_mut() {
            if let Some(mut session) = self.session.take() {
                session.cleanup(system);
            }
            self.sound.release("sound", |raw| system.release_sound(raw));
        }
        self.current.take().is_some()
    }

    fn reset_stopped(&mut self, cleared: bool) {
        self.timer.stop();
        self.length_ms = 0;
        self.position_ms = 0;
        self.events.notify(&EngineEvent::LengthChanged(0));
        self.events.notify(&EngineEvent::PositionChanged(0));
        self.set_state(PlaybackState::Stopped);
        if cleared {
            self.events.notify(&EngineEvent::CurrentMediaChanged(None));
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.events.notify(&EngineEvent::PlaybackStateChanged(state));
        }
    }
}

fn init_system<B: AudioBackend>(system: &mut B) -> BackendResult<()> {
    let found = system.version()?;
    if found < MIN_BACKEND_VERSION {
        return Err(BackendError::VersionTooOld {
            found,
            required: MIN_BACKEND_VERSION,
        });
    }
    system.init(MAX_CHANNELS, InitFlags { normal: true })?;
    system.set_stream_buffer_size(STREAM_BUFFER_BYTES)
}

fn close_system<B: AudioBackend>(system: &mut B) {
    check(system.close(), "close system");
    check(system.release(), "release system");
}

impl<B: AudioBackend> Observable<EngineEvent> for PlayerEngine<B> {
    fn subscribe(&mut self, observer: Box<dyn FnMut(&EngineEvent)>) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl<B: AudioBackend> Drop for PlayerEngine<B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
