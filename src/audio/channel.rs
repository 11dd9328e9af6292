// One live channel bound to one record, torn down before the next track starts
// The end callback runs on the engine's thread and only posts the session id back

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::backend::{check, AudioBackend, BackendError, BackendResult, ChannelId, Handle};
use super::player::EngineMessage;
use super::track::SharedRecord;
use super::PlaybackState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// Linear fade between two volumes.
///
/// Returns the volume for `current_time` while it lies inside
/// `[start_point, start_point + fade_length]`, `None` otherwise. A fade of zero
/// or negative length is never active.
pub fn fade_volume(
    start_volume: f32,
    end_volume: f32,
    start_point: f32,
    fade_length: f32,
    current_time: f32,
) -> Option<f32> {
    if fade_length <= 0.0 {
        return None;
    }
    if current_time < start_point || current_time > start_point + fade_length {
        return None;
    }
    let delta = end_volume - start_volume;
    let step = ((delta / fade_length) * (current_time - start_point)).abs();
    Some(start_volume + delta.signum() * step)
}

pub struct ChannelSession {
    id: SessionId,
    channel: Handle<ChannelId>,
    record: SharedRecord,
}

impl ChannelSession {
    /// Wrap a freshly started channel and wire its end callback. If the
    /// callback can't be installed the channel is stopped and nothing is left
    /// behind.
    pub fn new<B: AudioBackend>(
        system: &mut B,
        channel: ChannelId,
        record: SharedRecord,
        id: SessionId,
        messages: &UnboundedSender<EngineMessage>,
    ) -> BackendResult<Self> {
        let tx = messages.clone();
        let on_end = Box::new(move || {
            // Receiver gone means the app is shutting down
            let _ = tx.send(EngineMessage::TrackEnded { session: id });
        });

        if let Err(e) = system.channel_set_end_callback(channel, Some(on_end)) {
            warn!("Could not attach end callback to {:?}: {}", channel, e);
            check(system.stop_channel(channel), "stop channel");
            return Err(e);
        }

        debug!("Session {:?} bound to {:?}", id, channel);
        Ok(Self {
            id,
            channel: Handle::new(channel),
            record,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn record(&self) -> &SharedRecord {
        &self.record
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel.get()
    }

    fn raw(&self) -> BackendResult<ChannelId> {
        self.channel.get().ok_or(BackendError::InvalidHandle)
    }

    pub fn is_paused<B: AudioBackend>(&self, system: &B) -> BackendResult<bool> {
        system.channel_is_paused(self.raw()?)
    }

    pub fn set_paused<B: AudioBackend>(&self, system: &mut B, paused: bool) -> BackendResult<()> {
        system.channel_set_paused(self.raw()?, paused)
    }

    /// Flip pause; returns the new paused state.
    pub fn toggle_pause<B: AudioBackend>(&self, system: &mut B) -> BackendResult<bool> {
        let paused = !self.is_paused(system)?;
        self.set_paused(system, paused)?;
        Ok(paused)
    }

    pub fn position<B: AudioBackend>(&self, system: &B) -> BackendResult<u32> {
        system.channel_position(self.raw()?)
    }

    /// Seek with the channel paused, then put the pause state back the way
    /// it was.
    pub fn set_position<B: AudioBackend>(
        &self,
        system: &mut B,
        position_ms: u32,
    ) -> BackendResult<()> {
        let channel = self.raw()?;
        let was_paused = system.channel_is_paused(channel)?;
        system.channel_set_paused(channel, true)?;
        let seeked = system.channel_set_position(channel, position_ms);
        system.channel_set_paused(channel, was_paused)?;
        seeked
    }

    pub fn set_volume<B: AudioBackend>(&self, system: &mut B, volume: f32) -> BackendResult<()> {
        system.channel_set_volume(self.raw()?, volume)
    }

    /// Apply [`fade_volume`] to the channel. Returns whether the fade window
    /// is active.
    pub fn apply_fade<B: AudioBackend>(
        &self,
        system: &mut B,
        start_volume: f32,
        end_volume: f32,
        start_point: f32,
        fade_length: f32,
        current_time: f32,
    ) -> bool {
        match fade_volume(start_volume, end_volume, start_point, fade_length, current_time) {
            Some(volume) => {
                check(self.set_volume(system, volume), "fade volume");
                true
            }
            None => false,
        }
    }

    /// Mute, detach the callback, mark the record stopped and free the
    /// channel. Runs once; a channel the engine already dropped is fine.
    pub fn cleanup<B: AudioBackend>(&mut self, system: &mut B) {
        let Some(channel) = self.channel.get() else {
            return;
        };
        check(system.channel_set_volume(channel, 0.0), "mute channel");
        check(
            system.channel_set_end_callback(channel, None),
            "detach end callback",
        );
        self.record.borrow_mut().playback_state = PlaybackState::Stopped;
        self.channel
            .release("channel", |raw| system.stop_channel(raw));
        debug!("Session {:?} cleaned up", self.id);
    }
}
