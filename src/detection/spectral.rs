//! Spectral heuristics: the VAD voice check and the interruption sound
//! classifier.
//!
//! Both work on the analyser-style [`Spectrum`]. The thresholds are hand-tuned
//! and live in the detection configs.

use std::collections::VecDeque;

use super::config::{DetectionConfig, InterruptionConfig};
use crate::audio::Spectrum;

/// Voice-band energy check used by the VAD
#[derive(Debug, Clone)]
pub struct VoiceGate {
    low_hz: f32,
    high_hz: f32,
    energy_floor: f32,
    variance_floor: f32,
    enabled: bool,
}

impl VoiceGate {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            low_hz: config.voice_band_low_hz,
            high_hz: config.voice_band_high_hz,
            energy_floor: config.voice_energy_floor,
            variance_floor: config.voice_variance_floor,
            enabled: config.require_voice_spectrum,
        }
    }

    /// True when the voice band is loud enough and uneven enough to be speech
    pub fn has_voice(&self, spectrum: &Spectrum) -> bool {
        if !self.enabled {
            return true;
        }
        spectrum.band_mean(self.low_hz, self.high_hz) >= self.energy_floor
            && spectrum.band_variance(self.low_hz, self.high_hz) >= self.variance_floor
    }
}

/// What a sound most plausibly is, for interruption purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundClass {
    ExtremeVolume,
    Doorbell,
    Sneeze,
    Explosive,
    Wind,
    Voice,
    Other,
}

/// Features extracted from one sample
#[derive(Debug, Clone, Copy, Default)]
pub struct SoundFeatures {
    pub volume: f32,
    /// Volume relative to the previous sample
    pub onset_ratio: f32,
    /// Share of spectral energy below the voice band
    pub low_ratio: f32,
    /// Share of spectral energy inside the voice band
    pub voice_ratio: f32,
    /// Share of spectral energy above the voice band
    pub high_ratio: f32,
    /// Strongest bin over the mean bin level
    pub peak_ratio: f32,
    pub peak_hz: f32,
    /// Coefficient of variation over recent volumes
    pub volume_variation: f32,
}

const VOICE_LOW_HZ: f32 = 300.0;
const VOICE_HIGH_HZ: f32 = 3400.0;
const RECENT_VOLUMES: usize = 8;

/// Stateful classifier (tracks previous and recent volumes)
#[derive(Debug, Clone)]
pub struct SoundClassifier {
    config: InterruptionConfig,
    previous_volume: Option<f32>,
    recent: VecDeque<f32>,
}

impl SoundClassifier {
    pub fn new(config: InterruptionConfig) -> Self {
        Self {
            config,
            previous_volume: None,
            recent: VecDeque::with_capacity(RECENT_VOLUMES),
        }
    }

    pub fn reset(&mut self) {
        self.previous_volume = None;
        self.recent.clear();
    }

    pub fn features(&mut self, volume: f32, spectrum: &Spectrum) -> SoundFeatures {
        let total = spectrum.total_energy().max(1e-6);
        let low = spectrum.band_energy(0.0, VOICE_LOW_HZ);
        let voice = spectrum.band_energy(VOICE_LOW_HZ, VOICE_HIGH_HZ);
        let high = (total - low - voice).max(0.0);

        let mean_bin = total / spectrum.bins.len().max(1) as f32;
        let (peak_hz, peak_level) = spectrum.peak();

        let onset_ratio = match self.previous_volume {
            Some(prev) => volume / prev.max(1e-4),
            None => 1.0,
        };
        self.previous_volume = Some(volume);

        if self.recent.len() == RECENT_VOLUMES {
            self.recent.pop_front();
        }
        self.recent.push_back(volume);

        SoundFeatures {
            volume,
            onset_ratio,
            low_ratio: low / total,
            voice_ratio: voice / total,
            high_ratio: high / total,
            peak_ratio: peak_level / mean_bin.max(1e-6),
            peak_hz,
            volume_variation: variation(&self.recent),
        }
    }

    pub fn classify(&mut self, volume: f32, spectrum: &Spectrum) -> (SoundClass, SoundFeatures) {
        let features = self.features(volume, spectrum);
        (classify_features(&features, &self.config), features)
    }
}

/// Rule order matters: the first matching class wins
pub fn classify_features(f: &SoundFeatures, config: &InterruptionConfig) -> SoundClass {
    if f.volume >= config.extreme_volume {
        return SoundClass::ExtremeVolume;
    }

    let tonal = f.peak_ratio >= config.doorbell_peak_ratio
        && f.peak_hz >= config.doorbell_low_hz
        && f.peak_hz <= config.doorbell_high_hz;
    if tonal {
        return SoundClass::Doorbell;
    }

    if f.onset_ratio >= config.explosive_onset_ratio {
        if f.high_ratio >= config.sneeze_high_ratio {
            return SoundClass::Sneeze;
        }
        return SoundClass::Explosive;
    }

    if f.low_ratio >= config.wind_low_ratio && f.volume_variation <= config.wind_steadiness {
        return SoundClass::Wind;
    }

    if f.voice_ratio >= config.voice_band_ratio {
        return SoundClass::Voice;
    }

    SoundClass::Other
}

fn variation(values: &VecDeque<f32>) -> f32 {
    if values.len() < 2 {
        return 1.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    if mean <= 1e-6 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt() / mean
}
