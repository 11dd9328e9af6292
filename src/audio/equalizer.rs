// Ten-band peaking EQ on the master group - every chain change happens under one DSP lock
// Gains are kept in settings by band label so a rebuilt equalizer finds them again

use tracing::{debug, info};

use super::backend::{check, AudioBackend, BackendError, BackendResult, DspId, DspKind, DspParam, Handle};
use crate::config::EqualizerSettings;

pub const BAND_FREQUENCIES: [f32; 10] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];
pub const BAND_WIDTH_OCTAVES: f32 = 1.0;
pub const MIN_GAIN_DB: f32 = -30.0;
pub const MAX_GAIN_DB: f32 = 30.0;

/// "32", "500", "1K", "16K".
pub fn band_label(frequency: f32) -> String {
    if frequency >= 1000.0 {
        format!("{}K", (frequency / 1000.0).round() as u32)
    } else {
        format!("{}", frequency.round() as u32)
    }
}

pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    }
}

#[derive(Debug)]
pub struct EqualizerBand {
    frequency: f32,
    bandwidth: f32,
    gain: f32,
    is_active: bool,
    dsp: Handle<DspId>,
}

impl EqualizerBand {
    fn create<B: AudioBackend>(system: &mut B, frequency: f32, gain: f32) -> BackendResult<Self> {
        let mut band = Self {
            frequency,
            bandwidth: BAND_WIDTH_OCTAVES,
            gain: clamp_gain(gain),
            is_active: false,
            dsp: Handle::new(system.create_dsp(DspKind::ParamEq)?),
        };

        if let Err(e) = band.attach(system) {
            band.release(system);
            return Err(e);
        }
        band.is_active = true;
        Ok(band)
    }

    fn attach<B: AudioBackend>(&self, system: &mut B) -> BackendResult<()> {
        let dsp = self.dsp.get().ok_or(BackendError::InvalidHandle)?;
        system.dsp_set_parameter(dsp, DspParam::Center, self.frequency)?;
        system.dsp_set_parameter(dsp, DspParam::Bandwidth, self.bandwidth)?;
        system.dsp_set_parameter(dsp, DspParam::Gain, self.gain)?;
        system.master_add_dsp(dsp)?;
        system.dsp_set_active(dsp, true)
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn bandwidth(&self) -> f32 {
        self.bandwidth
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn label(&self) -> String {
        band_label(self.frequency)
    }

    /// Take the node offline, change it, bring it back, all inside one DSP
    /// lock. Editing a live node clicks.
    pub fn set_gain<B: AudioBackend>(&mut self, system: &mut B, gain: f32) -> BackendResult<()> {
        let gain = clamp_gain(gain);
        let Some(dsp) = self.dsp.get().filter(|_| self.is_active) else {
            self.gain = gain;
            return Ok(());
        };

        system.lock_dsp()?;
        let result = Self::retune(system, dsp, gain);
        check(system.unlock_dsp(), "unlock DSP");
        result?;
        self.gain = gain;
        Ok(())
    }

    fn retune<B: AudioBackend>(system: &mut B, dsp: DspId, gain: f32) -> BackendResult<()> {
        system.dsp_set_active(dsp, false)?;
        let changed = system.dsp_set_parameter(dsp, DspParam::Gain, gain);
        system.dsp_set_active(dsp, true)?;
        changed?;
        system.update()
    }

    fn release<B: AudioBackend>(&mut self, system: &mut B) {
        self.is_active = false;
        self.dsp.release("equalizer band", |raw| {
            check(system.master_remove_dsp(raw), "detach equalizer band");
            system.release_dsp(raw)
        });
    }
}

#[derive(Debug, Default)]
pub struct Equalizer {
    bands: Vec<EqualizerBand>,
    is_enabled: bool,
}

impl Equalizer {
    /// Build the equalizer the settings describe: all ten bands with their
    /// saved gains when enabled, no nodes at all when not.
    pub fn get_equalizer<B: AudioBackend>(
        system: &mut B,
        settings: &EqualizerSettings,
    ) -> BackendResult<Self> {
        let mut equalizer = Self {
            bands: Vec::new(),
            is_enabled: settings.is_enabled,
        };
        if equalizer.is_enabled {
            equalizer.init(system, settings)?;
        }
        Ok(equalizer)
    }

    fn init<B: AudioBackend>(
        &mut self,
        system: &mut B,
        settings: &EqualizerSettings,
    ) -> BackendResult<()> {
        system.lock_dsp()?;

        let mut result = Ok(());
        for frequency in BAND_FREQUENCIES {
            let gain = settings.gain_for(&band_label(frequency));
            match EqualizerBand::create(system, frequency, gain) {
                Ok(band) => self.bands.push(band),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if result.is_err() {
            for band in self.bands.iter_mut() {
                band.release(system);
            }
            self.bands.clear();
        }

        check(system.unlock_dsp(), "unlock DSP");
        if result.is_ok() {
            debug!("Equalizer built with {} bands", self.bands.len());
        }
        result
    }

    fn deinit<B: AudioBackend>(&mut self, system: &mut B, settings: &mut EqualizerSettings) {
        self.persist(settings);
        if self.bands.is_empty() {
            return;
        }

        check(system.lock_dsp(), "lock DSP");
        for band in self.bands.iter_mut() {
            band.release(system);
        }
        self.bands.clear();
        check(system.unlock_dsp(), "unlock DSP");
    }

    fn persist(&self, settings: &mut EqualizerSettings) {
        for band in &self.bands {
            settings.band_gains.insert(band.label(), band.gain());
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn bands(&self) -> &[EqualizerBand] {
        &self.bands
    }

    pub fn set_enabled<B: AudioBackend>(
        &mut self,
        system: &mut B,
        enabled: bool,
        settings: &mut EqualizerSettings,
    ) -> BackendResult<()> {
        if enabled == self.is_enabled {
            return Ok(());
        }

        if enabled {
            self.init(system, settings)?;
        } else {
            self.deinit(system, settings);
        }
        self.is_enabled = enabled;
        settings.is_enabled = enabled;
        info!("Equalizer {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Change one band. While disabled only the saved gain moves.
    pub fn set_band_gain<B: AudioBackend>(
        &mut self,
        system: &mut B,
        index: usize,
        gain: f32,
        settings: &mut EqualizerSettings,
    ) -> BackendResult<()> {
        let frequency = *BAND_FREQUENCIES
            .get(index)
            .ok_or_else(|| BackendError::InvalidParam(format!("no equalizer band {}", index)))?;
        let gain = clamp_gain(gain);

        if let Some(band) = self.bands.get_mut(index) {
            band.set_gain(system, gain)?;
        }
        settings.band_gains.insert(band_label(frequency), gain);
        Ok(())
    }

    /// Flatten every band, keeping the enabled state.
    pub fn set_to_default<B: AudioBackend>(
        &mut self,
        system: &mut B,
        settings: &mut EqualizerSettings,
    ) -> BackendResult<()> {
        self.deinit(system, settings);
        for frequency in BAND_FREQUENCIES {
            settings.band_gains.insert(band_label(frequency), 0.0);
        }
        if self.is_enabled {
            self.init(system, settings)?;
        }
        Ok(())
    }

    /// Save gains and free every node. Used at engine shutdown.
    pub fn release<B: AudioBackend>(&mut self, system: &mut B, settings: &mut EqualizerSettings) {
        self.deinit(system, settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::mock::MockBackend;

    fn enabled_settings() -> EqualizerSettings {
        EqualizerSettings {
            is_enabled: true,
            ..EqualizerSettings::default()
        }
    }

    #[test]
    fn test_labels() {
        let labels: Vec<String> = BAND_FREQUENCIES.iter().map(|f| band_label(*f)).collect();
        assert_eq!(
            labels,
            vec!["32", "64", "125", "250", "500", "1K", "2K", "4K", "8K", "16K"]
        );
    }

    #[test]
    fn test_build_is_one_lock_bracket() {
        let (mut backend, state) = MockBackend::new();
        let mut settings = enabled_settings();
        settings.band_gains.insert("4K".to_string(), -4.5);

        let equalizer = Equalizer::get_equalizer(&mut backend, &settings).unwrap();

        let state = state.borrow();
        assert_eq!(equalizer.bands().len(), 10);
        assert_eq!(state.chain.len(), 10);
        assert_eq!((state.lock_calls, state.unlock_calls), (1, 1));
        assert_eq!(state.dsp_gain_at(4000.0), Some(-4.5));
        assert_eq!(state.dsp_gain_at(32.0), Some(0.0));
        assert!(equalizer.bands().iter().all(|b| b.is_active()));
    }

    #[test]
    fn test_disabled_builds_nothing() {
        let (mut backend, state) = MockBackend::new();
        let equalizer =
            Equalizer::get_equalizer(&mut backend, &EqualizerSettings::default()).unwrap();
        assert!(equalizer.bands().is_empty());
        assert!(state.borrow().dsps.is_empty());
    }

    #[test]
    fn test_gain_survives_disable_enable() {
        let (mut backend, state) = MockBackend::new();
        let mut settings = enabled_settings();
        let mut equalizer = Equalizer::get_equalizer(&mut backend, &settings).unwrap();

        equalizer
            .set_band_gain(&mut backend, 5, 6.0, &mut settings)
            .unwrap();
        equalizer
            .set_enabled(&mut backend, false, &mut settings)
            .unwrap();
        assert!(state.borrow().chain.is_empty());
        assert_eq!(state.borrow().released_dsps.len(), 10);
        assert!(!settings.is_enabled);

        equalizer
            .set_enabled(&mut backend, true, &mut settings)
            .unwrap();
        let band = &equalizer.bands()[5];
        assert_eq!(band.label(), "1K");
        assert_eq!(band.gain(), 6.0);
        assert_eq!(state.borrow().dsp_gain_at(1000.0), Some(6.0));
    }

    #[test]
    fn test_live_gain_change_order() {
        let (mut backend, state) = MockBackend::new();
        let mut settings = enabled_settings();
        let mut equalizer = Equalizer::get_equalizer(&mut backend, &settings).unwrap();
        let dsp = state.borrow().chain[2].0;
        state.borrow_mut().ops.clear();
        let locks_before = (state.borrow().lock_calls, state.borrow().unlock_calls);

        equalizer
            .set_band_gain(&mut backend, 2, 45.0, &mut settings)
            .unwrap();

        let locks_after = (state.borrow().lock_calls, state.borrow().unlock_calls);
        assert_eq!(locks_after, (locks_before.0 + 1, locks_before.1 + 1));
        assert_eq!(state.borrow().lock_depth, 0);

        assert_eq!(
            state.borrow().ops,
            vec![
                format!("active {} false", dsp),
                format!("param {} Gain 30", dsp),
                format!("active {} true", dsp),
                "update".to_string(),
            ]
        );
        assert_eq!(settings.band_gains.get("125"), Some(&30.0));
    }

    #[test]
    fn test_gain_while_disabled_only_persists() {
        let (mut backend, state) = MockBackend::new();
        let mut settings = EqualizerSettings::default();
        let mut equalizer = Equalizer::get_equalizer(&mut backend, &settings).unwrap();

        equalizer
            .set_band_gain(&mut backend, 9, -12.0, &mut settings)
            .unwrap();
        assert!(state.borrow().ops.is_empty());
        assert_eq!(settings.gain_for("16K"), -12.0);
        assert!(equalizer
            .set_band_gain(&mut backend, 10, 1.0, &mut settings)
            .is_err());
    }

    #[test]
    fn test_set_to_default_keeps_enabled_state() {
        let (mut backend, state) = MockBackend::new();
        let mut settings = enabled_settings();
        settings.band_gains.insert("64".to_string(), 9.0);
        let mut equalizer = Equalizer::get_equalizer(&mut backend, &settings).unwrap();

        equalizer.set_to_default(&mut backend, &mut settings).unwrap();

        assert!(equalizer.is_enabled());
        assert_eq!(equalizer.bands().len(), 10);
        assert!(equalizer.bands().iter().all(|b| b.gain() == 0.0));
        assert_eq!(state.borrow().chain.len(), 10);
        assert_eq!(settings.gain_for("64"), 0.0);
    }

    #[test]
    fn test_release_frees_every_node_once() {
        let (mut backend, state) = MockBackend::new();
        let mut settings = enabled_settings();
        let mut equalizer = Equalizer::get_equalizer(&mut backend, &settings).unwrap();

        equalizer.release(&mut backend, &mut settings);
        equalizer.release(&mut backend, &mut settings);

        let state = state.borrow();
        assert!(state.dsps.is_empty());
        assert_eq!(state.released_dsps.len(), 10);
        assert_eq!(state.lock_depth, 0);
    }
}
