// In-memory engine for tests - records every call, fails on request

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{
    AudioBackend, BackendError, BackendResult, ChannelId, DspId, DspKind, DspParam, EndCallback,
    InitFlags, SoundId,
};

pub(crate) struct MockChannel {
    pub sound: SoundId,
    pub paused: bool,
    pub volume: f32,
    pub position_ms: u32,
    pub callback: Option<EndCallback>,
    pub valid: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockDsp {
    pub center: f32,
    pub bandwidth: f32,
    pub gain: f32,
    pub active: bool,
}

pub(crate) struct MockState {
    pub version: u32,
    pub fail_init: bool,
    pub fail_buffer_size: bool,
    pub fail_volume: bool,
    pub fail_end_callback: bool,
    pub unreadable: HashSet<PathBuf>,
    pub sound_length_ms: u32,

    pub initialized: bool,
    pub closed: bool,
    pub released: bool,

    pub sounds: BTreeMap<SoundId, (PathBuf, bool)>,
    pub released_sounds: Vec<SoundId>,
    pub channels: BTreeMap<ChannelId, MockChannel>,
    pub play_calls: Vec<(SoundId, bool)>,
    pub stopped_channels: Vec<ChannelId>,

    pub master_volume: f32,
    pub master_mute: bool,

    pub dsps: BTreeMap<DspId, MockDsp>,
    pub chain: Vec<DspId>,
    pub released_dsps: Vec<DspId>,
    pub lock_depth: u32,
    pub lock_calls: u32,
    pub unlock_calls: u32,
    pub updates: u32,

    /// Ordered log of DSP mutations, e.g. "active 3 false".
    pub ops: Vec<String>,
    next_id: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            version: super::MIN_BACKEND_VERSION,
            fail_init: false,
            fail_buffer_size: false,
            fail_volume: false,
            fail_end_callback: false,
            unreadable: HashSet::new(),
            sound_length_ms: 180_000,
            initialized: false,
            closed: false,
            released: false,
            sounds: BTreeMap::new(),
            released_sounds: Vec::new(),
            channels: BTreeMap::new(),
            play_calls: Vec::new(),
            stopped_channels: Vec::new(),
            master_volume: 1.0,
            master_mute: false,
            dsps: BTreeMap::new(),
            chain: Vec::new(),
            released_dsps: Vec::new(),
            lock_depth: 0,
            lock_calls: 0,
            unlock_calls: 0,
            updates: 0,
            ops: Vec::new(),
            next_id: 1,
        }
    }
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn channel_mut(&mut self, channel: ChannelId) -> BackendResult<&mut MockChannel> {
        match self.channels.get_mut(&channel) {
            Some(ch) if ch.valid => Ok(ch),
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn channel(&self, channel: ChannelId) -> BackendResult<&MockChannel> {
        match self.channels.get(&channel) {
            Some(ch) if ch.valid => Ok(ch),
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn dsp_mut(&mut self, dsp: DspId) -> BackendResult<&mut MockDsp> {
        self.dsps.get_mut(&dsp).ok_or(BackendError::InvalidHandle)
    }

    /// The only channel still playing, if exactly one is.
    pub fn live_channel(&self) -> Option<ChannelId> {
        let live: Vec<_> = self
            .channels
            .iter()
            .filter(|(_, ch)| ch.valid)
            .map(|(id, _)| *id)
            .collect();
        (live.len() == 1).then(|| live[0])
    }

    pub fn dsp_gain_at(&self, center: f32) -> Option<f32> {
        self.chain
            .iter()
            .filter_map(|id| self.dsps.get(id))
            .find(|dsp| dsp.center == center)
            .map(|dsp| dsp.gain)
    }
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    pub state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    pub fn new() -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }

    pub fn with_state(state: &Rc<RefCell<MockState>>) -> Self {
        Self {
            state: Rc::clone(state),
        }
    }
}

/// Play a channel to its end: it becomes invalid and its callback fires.
pub(crate) fn finish_channel(state: &Rc<RefCell<MockState>>, channel: ChannelId) {
    let callback = {
        let mut state = state.borrow_mut();
        state.channels.get_mut(&channel).and_then(|ch| {
            ch.valid = false;
            ch.callback.take()
        })
    };
    if let Some(callback) = callback {
        callback();
    }
}

impl AudioBackend for MockBackend {
    fn version(&self) -> BackendResult<u32> {
        Ok(self.state.borrow().version)
    }

    fn init(&mut self, max_channels: u32, _flags: InitFlags) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_init || max_channels == 0 {
            return Err(BackendError::Init("mock init failure".into()));
        }
        state.initialized = true;
        Ok(())
    }

    fn set_stream_buffer_size(&mut self, bytes: u32) -> BackendResult<()> {
        if self.state.borrow().fail_buffer_size {
            return Err(BackendError::InvalidParam(format!("buffer size {}", bytes)));
        }
        Ok(())
    }

    fn create_stream(&mut self, path: &Path, accurate_time: bool) -> BackendResult<SoundId> {
        let mut state = self.state.borrow_mut();
        if state.unreadable.contains(path) {
            return Err(BackendError::file(path, "mock unreadable"));
        }
        let id = SoundId(state.next_id());
        state.sounds.insert(id, (path.to_path_buf(), accurate_time));
        Ok(id)
    }

    fn sound_length_ms(&self, sound: SoundId) -> BackendResult<u32> {
        let state = self.state.borrow();
        if state.sounds.contains_key(&sound) {
            Ok(state.sound_length_ms)
        } else {
            Err(BackendError::InvalidHandle)
        }
    }

    fn release_sound(&mut self, sound: SoundId) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state
            .sounds
            .remove(&sound)
            .ok_or(BackendError::InvalidHandle)?;
        state.released_sounds.push(sound);
        Ok(())
    }

    fn play_sound(&mut self, sound: SoundId, paused: bool) -> BackendResult<ChannelId> {
        let mut state = self.state.borrow_mut();
        if !state.sounds.contains_key(&sound) {
            return Err(BackendError::InvalidHandle);
        }
        let id = ChannelId(state.next_id());
        state.play_calls.push((sound, paused));
        state.channels.insert(
            id,
            MockChannel {
                sound,
                paused,
                volume: 1.0,
                position_ms: 0,
                callback: None,
                valid: true,
            },
        );
        Ok(id)
    }

    fn channel_set_paused(&mut self, channel: ChannelId, paused: bool) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.channel_mut(channel)?.paused = paused;
        state.ops.push(format!("paused {}", paused));
        Ok(())
    }

    fn channel_is_paused(&self, channel: ChannelId) -> BackendResult<bool> {
        Ok(self.state.borrow().channel(channel)?.paused)
    }

    fn channel_set_volume(&mut self, channel: ChannelId, volume: f32) -> BackendResult<()> {
        self.state.borrow_mut().channel_mut(channel)?.volume = volume;
        Ok(())
    }

    fn channel_set_position(&mut self, channel: ChannelId, position_ms: u32) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.channel_mut(channel)?.position_ms = position_ms;
        state.ops.push(format!("seek {}", position_ms));
        Ok(())
    }

    fn channel_position(&self, channel: ChannelId) -> BackendResult<u32> {
        Ok(self.state.borrow().channel(channel)?.position_ms)
    }

    fn channel_set_end_callback(
        &mut self,
        channel: ChannelId,
        callback: Option<EndCallback>,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_end_callback {
            return Err(BackendError::Unsupported("mock end callback".into()));
        }
        state.channel_mut(channel)?.callback = callback;
        Ok(())
    }

    fn stop_channel(&mut self, channel: ChannelId) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let ch = state.channel_mut(channel)?;
        ch.valid = false;
        ch.callback = None;
        state.stopped_channels.push(channel);
        Ok(())
    }

    fn master_set_volume(&mut self, volume: f32) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_volume {
            return Err(BackendError::Output("mock volume failure".into()));
        }
        state.master_volume = volume;
        Ok(())
    }

    fn master_set_mute(&mut self, mute: bool) -> BackendResult<()> {
        self.state.borrow_mut().master_mute = mute;
        Ok(())
    }

    fn create_dsp(&mut self, _kind: DspKind) -> BackendResult<DspId> {
        let mut state = self.state.borrow_mut();
        let id = DspId(state.next_id());
        state.dsps.insert(id, MockDsp::default());
        Ok(id)
    }

    fn dsp_set_parameter(&mut self, dsp: DspId, param: DspParam, value: f32) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let node = state.dsp_mut(dsp)?;
        match param {
            DspParam::Center => node.center = value,
            DspParam::Bandwidth => node.bandwidth = value,
            DspParam::Gain => node.gain = value,
        }
        state.ops.push(format!("param {} {:?} {}", dsp.0, param, value));
        Ok(())
    }

    fn dsp_set_active(&mut self, dsp: DspId, active: bool) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.dsp_mut(dsp)?.active = active;
        state.ops.push(format!("active {} {}", dsp.0, active));
        Ok(())
    }

    fn master_add_dsp(&mut self, dsp: DspId) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.dsps.contains_key(&dsp) {
            return Err(BackendError::InvalidHandle);
        }
        state.chain.push(dsp);
        Ok(())
    }

    fn master_remove_dsp(&mut self, dsp: DspId) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let before = state.chain.len();
        state.chain.retain(|id| *id != dsp);
        if state.chain.len() == before {
            return Err(BackendError::InvalidHandle);
        }
        Ok(())
    }

    fn release_dsp(&mut self, dsp: DspId) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.dsps.remove(&dsp).ok_or(BackendError::InvalidHandle)?;
        state.released_dsps.push(dsp);
        Ok(())
    }

    fn lock_dsp(&mut self) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.lock_depth += 1;
        state.lock_calls += 1;
        Ok(())
    }

    fn unlock_dsp(&mut self) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        if state.lock_depth == 0 {
            return Err(BackendError::InvalidParam("unlock without lock".into()));
        }
        state.lock_depth -= 1;
        state.unlock_calls += 1;
        Ok(())
    }

    fn update(&mut self) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.updates += 1;
        state.ops.push("update".to_string());
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }

    fn release(&mut self) -> BackendResult<()> {
        self.state.borrow_mut().released = true;
        Ok(())
    }
}
