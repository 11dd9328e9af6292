// rodio-backed engine - one Sink per channel, peaking biquads for DSP nodes
// Sinks play on rodio's mixer thread; that's where end callbacks fire

use rodio::source::{EmptyCallback, SeekError};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, info};

use super::{
    AudioBackend, BackendError, BackendResult, ChannelId, DspId, DspKind, DspParam, EndCallback,
    InitFlags, SoundId,
};

const BACKEND_VERSION: u32 = 0x0001_0019;
const MIN_STREAM_BUFFER: u32 = 4 * 1024;
// Samples between checks for a newly published DSP chain
const CHAIN_REFRESH_SAMPLES: usize = 512;

struct LoadedSound {
    path: PathBuf,
    length_ms: u32,
}

struct LiveChannel {
    sink: Sink,
    volume: f32,
    end_callback: Arc<Mutex<Option<EndCallback>>>,
}

#[derive(Debug, Clone, Copy)]
struct DspNode {
    center: f32,
    bandwidth: f32,
    gain: f32,
    active: bool,
    attached: bool,
}

impl Default for DspNode {
    fn default() -> Self {
        Self {
            center: 8000.0,
            bandwidth: 1.0,
            gain: 0.0,
            active: false,
            attached: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PeakingParams {
    center: f32,
    bandwidth: f32,
    gain: f32,
}

/// The chain as the audio thread sees it. Swapped whole, never edited in place.
#[derive(Default)]
struct PublishedChain {
    generation: AtomicU64,
    nodes: Mutex<Vec<PeakingParams>>,
}

pub struct RodioBackend {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    initialized: bool,
    max_channels: u32,
    buffer_bytes: usize,
    sounds: HashMap<SoundId, LoadedSound>,
    channels: HashMap<ChannelId, LiveChannel>,
    master_volume: f32,
    master_mute: bool,
    dsps: HashMap<DspId, DspNode>,
    chain_order: Vec<DspId>,
    lock_depth: u32,
    published: Arc<PublishedChain>,
    next_id: u64,
}

impl RodioBackend {
    /// Open the default output device.
    pub fn create() -> BackendResult<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| BackendError::Output(e.to_string()))?;
        info!("Opened default audio output");

        Ok(Self {
            _stream: stream,
            handle,
            initialized: false,
            max_channels: 0,
            buffer_bytes: 64 * 1024,
            sounds: HashMap::new(),
            channels: HashMap::new(),
            master_volume: 1.0,
            master_mute: false,
            dsps: HashMap::new(),
            chain_order: Vec::new(),
            lock_depth: 0,
            published: Arc::new(PublishedChain::default()),
            next_id: 1,
        })
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_initialized(&self) -> BackendResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }

    fn open_decoder(&self, path: &Path) -> BackendResult<Decoder<BufReader<File>>> {
        let file = File::open(path).map_err(|e| BackendError::file(path, e.to_string()))?;
        Decoder::new(BufReader::with_capacity(self.buffer_bytes, file))
            .map_err(|e| BackendError::file(path, e.to_string()))
    }

    fn master_gain(&self) -> f32 {
        if self.master_mute {
            0.0
        } else {
            self.master_volume
        }
    }

    // A sink that ran dry is a channel the engine already finished with
    fn channel(&self, channel: ChannelId) -> BackendResult<&LiveChannel> {
        match self.channels.get(&channel) {
            Some(live) if !live.sink.empty() => Ok(live),
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn channel_mut(&mut self, channel: ChannelId) -> BackendResult<&mut LiveChannel> {
        match self.channels.get_mut(&channel) {
            Some(live) if !live.sink.empty() => Ok(live),
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn apply_master(&mut self) {
        let gain = self.master_gain();
        for live in self.channels.values() {
            live.sink.set_volume(live.volume * gain);
        }
    }

    fn prune_finished(&mut self) {
        self.channels.retain(|_, live| !live.sink.empty());
    }

    fn dsp_mut(&mut self, dsp: DspId) -> BackendResult<&mut DspNode> {
        self.dsps.get_mut(&dsp).ok_or(BackendError::InvalidHandle)
    }

    /// Hand the current chain to the audio thread, unless someone holds the
    /// DSP lock - then it goes out on the last unlock.
    fn publish_chain(&mut self) {
        if self.lock_depth > 0 {
            return;
        }
        let nodes: Vec<PeakingParams> = self
            .chain_order
            .iter()
            .filter_map(|id| self.dsps.get(id))
            .filter(|node| node.active)
            .map(|node| PeakingParams {
                center: node.center,
                bandwidth: node.bandwidth,
                gain: node.gain,
            })
            .collect();

        if let Ok(mut guard) = self.published.nodes.lock() {
            *guard = nodes;
            self.published.generation.fetch_add(1, Ordering::Release);
        }
    }
}

fn time_to_ms(time: Time) -> u64 {
    time.seconds * 1000 + (time.frac * 1000.0).round() as u64
}

/// Length from the container's frame count, or from decoding every packet
/// when `accurate` is set. Zero when the container doesn't say and `accurate`
/// is off.
fn stream_length_ms(path: &Path, accurate: bool) -> BackendResult<u32> {
    let file = File::open(path).map_err(|e| BackendError::file(path, e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let mut format = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BackendError::file(path, e.to_string()))?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BackendError::file(path, "no supported audio tracks"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    if !accurate {
        let length = match (params.time_base, params.n_frames, params.sample_rate) {
            (Some(time_base), Some(n_frames), _) => time_to_ms(time_base.calc_time(n_frames)),
            (None, Some(n_frames), Some(rate)) if rate > 0 => n_frames * 1000 / rate as u64,
            _ => 0,
        };
        return Ok(length.min(u32::MAX as u64) as u32);
    }

    let rate = params
        .sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| BackendError::file(path, "unknown sample rate"))? as u64;
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| BackendError::file(path, e.to_string()))?;

    let mut frames: u64 = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(BackendError::file(path, e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => frames += decoded.frames() as u64,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping bad packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(BackendError::file(path, e.to_string())),
        }
    }

    Ok((frames * 1000 / rate).min(u32::MAX as u64) as u32)
}

impl AudioBackend for RodioBackend {
    fn version(&self) -> BackendResult<u32> {
        Ok(BACKEND_VERSION)
    }

    fn init(&mut self, max_channels: u32, _flags: InitFlags) -> BackendResult<()> {
        if max_channels == 0 {
            return Err(BackendError::Init("channel budget must be positive".into()));
        }
        self.max_channels = max_channels;
        self.initialized = true;
        debug!("Audio engine initialized with {} channels", max_channels);
        Ok(())
    }

    fn set_stream_buffer_size(&mut self, bytes: u32) -> BackendResult<()> {
        if bytes < MIN_STREAM_BUFFER {
            return Err(BackendError::InvalidParam(format!(
                "stream buffer of {} bytes is below {}",
                bytes, MIN_STREAM_BUFFER
            )));
        }
        self.buffer_bytes = bytes as usize;
        Ok(())
    }

    fn create_stream(&mut self, path: &Path, accurate_time: bool) -> BackendResult<SoundId> {
        self.ensure_initialized()?;
        // rodio has to be able to play it, the length comes from symphonia
        self.open_decoder(path)?;
        let length_ms = stream_length_ms(path, accurate_time)?;

        let id = SoundId(self.next_id());
        self.sounds.insert(
            id,
            LoadedSound {
                path: path.to_path_buf(),
                length_ms,
            },
        );
        debug!("Created stream {:?} for {} ({} ms)", id, path.display(), length_ms);
        Ok(id)
    }

    fn sound_length_ms(&self, sound: SoundId) -> BackendResult<u32> {
        self.sounds
            .get(&sound)
            .map(|s| s.length_ms)
            .ok_or(BackendError::InvalidHandle)
    }

    fn release_sound(&mut self, sound: SoundId) -> BackendResult<()> {
        self.sounds
            .remove(&sound)
            .map(|_| ())
            .ok_or(BackendError::InvalidHandle)
    }

    fn play_sound(&mut self, sound: SoundId, paused: bool) -> BackendResult<ChannelId> {
        self.ensure_initialized()?;
        self.prune_finished();
        if self.channels.len() as u32 >= self.max_channels {
            return Err(BackendError::Unsupported("channel budget exhausted".into()));
        }

        let path = self
            .sounds
            .get(&sound)
            .map(|s| s.path.clone())
            .ok_or(BackendError::InvalidHandle)?;
        let source = EqualizedSource::new(
            self.open_decoder(&path)?.convert_samples::<f32>(),
            Arc::clone(&self.published),
        );

        let sink = Sink::try_new(&self.handle).map_err(|e| BackendError::Output(e.to_string()))?;
        if paused {
            sink.pause();
        }
        sink.set_volume(self.master_gain());

        let end_callback: Arc<Mutex<Option<EndCallback>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&end_callback);
        sink.append(source);
        sink.append(EmptyCallback::<f32>::new(Box::new(move || {
            let callback = slot.lock().ok().and_then(|mut guard| guard.take());
            if let Some(callback) = callback {
                callback();
            }
        })));

        let id = ChannelId(self.next_id());
        self.channels.insert(
            id,
            LiveChannel {
                sink,
                volume: 1.0,
                end_callback,
            },
        );
        Ok(id)
    }

    fn channel_set_paused(&mut self, channel: ChannelId, paused: bool) -> BackendResult<()> {
        let live = self.channel(channel)?;
        if paused {
            live.sink.pause();
        } else {
            live.sink.play();
        }
        Ok(())
    }

    fn channel_is_paused(&self, channel: ChannelId) -> BackendResult<bool> {
        Ok(self.channel(channel)?.sink.is_paused())
    }

    fn channel_set_volume(&mut self, channel: ChannelId, volume: f32) -> BackendResult<()> {
        let gain = self.master_gain();
        let live = self.channel_mut(channel)?;
        live.volume = volume.clamp(0.0, 1.0);
        live.sink.set_volume(live.volume * gain);
        Ok(())
    }

    fn channel_set_position(&mut self, channel: ChannelId, position_ms: u32) -> BackendResult<()> {
        self.channel(channel)?
            .sink
            .try_seek(Duration::from_millis(position_ms as u64))
            .map_err(|e| BackendError::Unsupported(format!("seek failed: {:?}", e)))
    }

    fn channel_position(&self, channel: ChannelId) -> BackendResult<u32> {
        Ok(self.channel(channel)?.sink.get_pos().as_millis() as u32)
    }

    fn channel_set_end_callback(
        &mut self,
        channel: ChannelId,
        callback: Option<EndCallback>,
    ) -> BackendResult<()> {
        let live = self.channel(channel)?;
        let mut guard = live
            .end_callback
            .lock()
            .map_err(|_| BackendError::Output("end callback lock poisoned".into()))?;
        *guard = callback;
        Ok(())
    }

    fn stop_channel(&mut self, channel: ChannelId) -> BackendResult<()> {
        let live = self
            .channels
            .remove(&channel)
            .ok_or(BackendError::InvalidHandle)?;
        if let Ok(mut guard) = live.end_callback.lock() {
            guard.take();
        }
        live.sink.stop();
        Ok(())
    }

    fn master_set_volume(&mut self, volume: f32) -> BackendResult<()> {
        self.master_volume = volume.clamp(0.0, 1.0);
        self.apply_master();
        Ok(())
    }

    fn master_set_mute(&mut self, mute: bool) -> BackendResult<()> {
        self.master_mute = mute;
        self.apply_master();
        Ok(())
    }

    fn create_dsp(&mut self, kind: DspKind) -> BackendResult<DspId> {
        match kind {
            DspKind::ParamEq => {
                let id = DspId(self.next_id());
                self.dsps.insert(id, DspNode::default());
                Ok(id)
            }
        }
    }

    fn dsp_set_parameter(&mut self, dsp: DspId, param: DspParam, value: f32) -> BackendResult<()> {
        let node = self.dsp_mut(dsp)?;
        match param {
            DspParam::Center if (20.0..=22_000.0).contains(&value) => node.center = value,
            DspParam::Bandwidth if (0.2..=5.0).contains(&value) => node.bandwidth = value,
            DspParam::Gain if (-30.0..=30.0).contains(&value) => node.gain = value,
            _ => {
                return Err(BackendError::InvalidParam(format!(
                    "{:?} = {} out of range",
                    param, value
                )))
            }
        }
        if node.attached {
            self.publish_chain();
        }
        Ok(())
    }

    fn dsp_set_active(&mut self, dsp: DspId, active: bool) -> BackendResult<()> {
        let node = self.dsp_mut(dsp)?;
        node.active = active;
        if node.attached {
            self.publish_chain();
        }
        Ok(())
    }

    fn master_add_dsp(&mut self, dsp: DspId) -> BackendResult<()> {
        let node = self.dsp_mut(dsp)?;
        if node.attached {
            return Err(BackendError::InvalidParam("DSP already attached".into()));
        }
        node.attached = true;
        self.chain_order.push(dsp);
        self.publish_chain();
        Ok(())
    }

    fn master_remove_dsp(&mut self, dsp: DspId) -> BackendResult<()> {
        let node = self.dsp_mut(dsp)?;
        if !node.attached {
            return Err(BackendError::InvalidHandle);
        }
        node.attached = false;
        self.chain_order.retain(|id| *id != dsp);
        self.publish_chain();
        Ok(())
    }

    fn release_dsp(&mut self, dsp: DspId) -> BackendResult<()> {
        let node = self.dsps.remove(&dsp).ok_or(BackendError::InvalidHandle)?;
        if node.attached {
            self.chain_order.retain(|id| *id != dsp);
            self.publish_chain();
        }
        Ok(())
    }

    fn lock_dsp(&mut self) -> BackendResult<()> {
        self.lock_depth += 1;
        Ok(())
    }

    fn unlock_dsp(&mut self) -> BackendResult<()> {
        if self.lock_depth == 0 {
            return Err(BackendError::InvalidParam("DSP unlock without lock".into()));
        }
        self.lock_depth -= 1;
        self.publish_chain();
        Ok(())
    }

    fn update(&mut self) -> BackendResult<()> {
        self.ensure_initialized()
    }

    fn close(&mut self) -> BackendResult<()> {
        for (_, live) in self.channels.drain() {
            if let Ok(mut guard) = live.end_callback.lock() {
                guard.take();
            }
            live.sink.stop();
        }
        self.sounds.clear();
        self.initialized = false;
        info!("Audio engine closed");
        Ok(())
    }

    fn release(&mut self) -> BackendResult<()> {
        self.dsps.clear();
        self.chain_order.clear();
        self.publish_chain();
        Ok(())
    }
}

/// RBJ peaking filter, transposed direct form II, one state pair per channel.
#[derive(Debug, Clone)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    state: Vec<[f32; 2]>,
}

impl Biquad {
    fn peaking(params: PeakingParams, sample_rate: u32, channels: usize) -> Option<Self> {
        let fs = sample_rate as f32;
        if params.center >= fs / 2.0 {
            return None;
        }
        let a = 10f32.powf(params.gain / 40.0);
        let w0 = 2.0 * PI * params.center / fs;
        let (sin_w0, cos_w0) = (w0.sin(), w0.cos());
        let alpha = sin_w0 * ((2f32.ln() / 2.0) * params.bandwidth * w0 / sin_w0).sinh();

        let a0 = 1.0 + alpha / a;
        Some(Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
            state: vec![[0.0; 2]; channels],
        })
    }

    fn process(&mut self, channel: usize, x: f32) -> f32 {
        let Some(z) = self.state.get_mut(channel) else {
            return x;
        };
        let y = self.b0 * x + z[0];
        z[0] = self.b1 * x - self.a1 * y + z[1];
        z[1] = self.b2 * x - self.a2 * y;
        y
    }

    fn reset(&mut self) {
        for z in self.state.iter_mut() {
            *z = [0.0; 2];
        }
    }
}

/// Runs every sample of a channel through the published EQ chain.
struct EqualizedSource<S> {
    inner: S,
    chain: Arc<PublishedChain>,
    seen_generation: u64,
    filters: Vec<Biquad>,
    channels: u16,
    sample_rate: u32,
    channel_index: usize,
    countdown: usize,
}

impl<S> EqualizedSource<S>
where
    S: Source<Item = f32>,
{
    fn new(inner: S, chain: Arc<PublishedChain>) -> Self {
        let channels = inner.channels();
        let sample_rate = inner.sample_rate();
        let mut source = Self {
            inner,
            chain,
            seen_generation: u64::MAX,
            filters: Vec::new(),
            channels,
            sample_rate,
            channel_index: 0,
            countdown: 0,
        };
        source.refresh();
        source
    }

    fn refresh(&mut self) {
        let generation = self.chain.generation.load(Ordering::Acquire);
        let format_changed =
            self.inner.channels() != self.channels || self.inner.sample_rate() != self.sample_rate;
        if generation == self.seen_generation && !format_changed {
            return;
        }

        self.channels = self.inner.channels();
        self.sample_rate = self.inner.sample_rate();
        let nodes = match self.chain.nodes.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        self.filters = nodes
            .into_iter()
            .filter_map(|params| {
                Biquad::peaking(params, self.sample_rate, self.channels.max(1) as usize)
            })
            .collect();
        self.seen_generation = generation;
    }
}

impl<S> Iterator for EqualizedSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        // Only swap filters on a frame boundary
        if self.channel_index == 0 && self.countdown == 0 {
            self.refresh();
            self.countdown = CHAIN_REFRESH_SAMPLES;
        }
        self.countdown = self.countdown.saturating_sub(1);

        let sample = self.inner.next()?;
        let channel = self.channel_index;
        self.channel_index = (channel + 1) % self.channels.max(1) as usize;

        Some(
            self.filters
                .iter_mut()
                .fold(sample, |acc, filter| filter.process(channel, acc)),
        )
    }
}

impl<S> Source for EqualizedSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.inner.try_seek(pos)?;
        self.channel_index = 0;
        for filter in self.filters.iter_mut() {
            filter.reset();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Silent 16-bit mono PCM.
    fn write_wav(path: &Path, sample_rate: u32, frames: u32) {
        let data_len = frames * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_whole_second_stream_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ten.wav");
        write_wav(&path, 44_100, 441_000);

        assert_eq!(stream_length_ms(&path, false).unwrap(), 10_000);
        assert_eq!(stream_length_ms(&path, true).unwrap(), 10_000);
    }

    #[test]
    fn test_fractional_stream_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ten_and_a_half.wav");
        write_wav(&path, 44_100, 463_050);

        assert_eq!(stream_length_ms(&path, false).unwrap(), 10_500);
        assert_eq!(stream_length_ms(&path, true).unwrap(), 10_500);
    }

    #[test]
    fn test_stream_length_of_garbage_is_a_file_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(matches!(
            stream_length_ms(&path, false),
            Err(BackendError::File { .. })
        ));
    }

    fn params(gain: f32) -> PeakingParams {
        PeakingParams {
            center: 1000.0,
            bandwidth: 1.0,
            gain,
        }
    }

    #[test]
    fn test_flat_peaking_filter_passes_signal() {
        let mut filter = Biquad::peaking(params(0.0), 44_100, 1).unwrap();
        for i in 0..64 {
            let x = (i as f32 * 0.1).sin();
            assert!((filter.process(0, x) - x).abs() < 1e-5);
        }
    }

    #[test]
    fn test_center_above_nyquist_is_bypassed() {
        let high = PeakingParams {
            center: 16_000.0,
            bandwidth: 1.0,
            gain: 6.0,
        };
        assert!(Biquad::peaking(high, 22_050, 2).is_none());
        assert!(Biquad::peaking(high, 44_100, 2).is_some());
    }

    #[test]
    fn test_boost_raises_level_at_center() {
        let mut filter = Biquad::peaking(params(12.0), 48_000, 1).unwrap();
        let mut peak: f32 = 0.0;
        for i in 0..4800 {
            let x = (2.0 * PI * 1000.0 * i as f32 / 48_000.0).sin();
            let y = filter.process(0, x);
            if i > 2400 {
                peak = peak.max(y.abs());
            }
        }
        // +12 dB is roughly 4x
        assert!(peak > 3.5 && peak < 4.5, "peak was {}", peak);
    }
}
