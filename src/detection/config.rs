use serde::{Deserialize, Serialize};

/// Ambient-noise calibration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    /// Length of the sampling window
    pub duration_ms: u64,
    /// Progress reporting interval
    pub tick_ms: u64,
    /// Samples above this percentile are treated as outliers
    pub outlier_percentile: f32,
    pub stddev_multiplier: f32,
    /// Lowest threshold calibration may produce
    pub min_threshold: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 3000,
            tick_ms: 100,
            outlier_percentile: 0.9,
            stddev_multiplier: 2.5,
            min_threshold: 0.005,
        }
    }
}

/// Voice activity detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Threshold used until calibration replaces it
    pub silence_threshold: f32,
    /// Grace period of continued quiet before speech is declared over
    pub silence_timeout_ms: u64,
    /// How long the speech condition must hold before speech is confirmed
    pub min_speech_duration_ms: u64,
    /// Consecutive qualifying samples required on top of the duration
    pub stability_samples: u32,
    /// Threshold multiplier applied once speech has been heard in the session
    pub retrigger_multiplier: f32,

    pub smoothing_alpha: f32,
    pub smoothing_history: usize,

    /// Quiet samples needed before the grace period starts, right after speech begins
    pub max_silence_samples: u32,
    /// Quiet samples needed once `silence_adapt_window_ms` of speech has elapsed
    pub min_silence_samples: u32,
    pub silence_adapt_window_ms: u64,

    /// Require the spectral voice check in addition to the volume threshold
    pub require_voice_spectrum: bool,
    pub voice_band_low_hz: f32,
    pub voice_band_high_hz: f32,
    /// Minimum mean analyser level within the voice band
    pub voice_energy_floor: f32,
    /// Minimum bin variance within the voice band (steady noise is flat)
    pub voice_variance_floor: f32,

    pub calibration: CalibrationConfig,

    /// Named interruption tuning; takes precedence over `interruption`
    pub interruption_preset: Option<InterruptionPreset>,
    pub interruption: InterruptionConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.01,
            silence_timeout_ms: 1000,
            min_speech_duration_ms: 250,
            stability_samples: 3,
            retrigger_multiplier: 0.8,
            smoothing_alpha: 0.5,
            smoothing_history: 10,
            max_silence_samples: 15,
            min_silence_samples: 5,
            silence_adapt_window_ms: 10_000,
            require_voice_spectrum: true,
            voice_band_low_hz: 300.0,
            voice_band_high_hz: 3400.0,
            voice_energy_floor: 0.35,
            voice_variance_floor: 0.002,
            calibration: CalibrationConfig::default(),
            interruption_preset: None,
            interruption: InterruptionConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Interruption settings after applying the preset, if any
    pub fn interruption_config(&self) -> InterruptionConfig {
        match self.interruption_preset {
            Some(preset) => preset.config(),
            None => self.interruption.clone(),
        }
    }
}

/// Interruption detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptionConfig {
    /// Absolute volume that counts towards an interruption
    pub volume_threshold: f32,
    /// The effective threshold is at least the calibrated noise threshold times this
    pub noise_multiplier: f32,
    /// Volume that interrupts immediately
    pub extreme_volume: f32,
    /// Volume above which doorbell/sneeze sounds interrupt immediately
    pub secondary_volume_threshold: f32,

    /// Accumulator value that confirms an interruption
    pub confirmation_bound: f32,
    pub base_increment: f32,
    pub voice_increment: f32,
    /// Increment for explosive or wind-like samples (capped below the bound)
    pub transient_increment: f32,
    /// Per-sample multiplier applied while quiet or on transients
    pub decay: f32,
    /// Quiet samples after which the accumulator resets
    pub reset_after_quiet_samples: u32,

    /// Volume jump over the previous sample that marks an explosive onset
    pub explosive_onset_ratio: f32,
    /// Peak-to-mean spectral ratio of a tonal (doorbell) sound
    pub doorbell_peak_ratio: f32,
    pub doorbell_low_hz: f32,
    pub doorbell_high_hz: f32,
    /// Share of energy above the voice band marking a sneeze/cough burst
    pub sneeze_high_ratio: f32,
    /// Share of energy below the voice band marking wind/rumble
    pub wind_low_ratio: f32,
    /// Coefficient of variation of recent volumes under which a sound is steady
    pub wind_steadiness: f32,
    /// Share of energy inside the voice band for plausible speech
    pub voice_band_ratio: f32,
}

impl Default for InterruptionConfig {
    fn default() -> Self {
        InterruptionPreset::Balanced.config()
    }
}

/// Hand-tuned interruption settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptionPreset {
    /// Long confirmation, high thresholds; for noisy rooms
    Cautious,
    Balanced,
    /// Short confirmation; for quiet rooms and headsets
    Responsive,
}

impl InterruptionPreset {
    pub fn config(self) -> InterruptionConfig {
        let balanced = InterruptionConfig {
            volume_threshold: 0.08,
            noise_multiplier: 3.0,
            extreme_volume: 0.6,
            secondary_volume_threshold: 0.25,
            confirmation_bound: 6.0,
            base_increment: 1.0,
            voice_increment: 2.0,
            transient_increment: 0.5,
            decay: 0.8,
            reset_after_quiet_samples: 10,
            explosive_onset_ratio: 4.0,
            doorbell_peak_ratio: 6.0,
            doorbell_low_hz: 500.0,
            doorbell_high_hz: 2500.0,
            sneeze_high_ratio: 0.4,
            wind_low_ratio: 0.55,
            wind_steadiness: 0.15,
            voice_band_ratio: 0.5,
        };

        match self {
            InterruptionPreset::Balanced => balanced,
            InterruptionPreset::Cautious => InterruptionConfig {
                volume_threshold: 0.12,
                extreme_volume: 0.8,
                secondary_volume_threshold: 0.35,
                confirmation_bound: 10.0,
                voice_increment: 1.5,
                reset_after_quiet_samples: 6,
                ..balanced
            },
            InterruptionPreset::Responsive => InterruptionConfig {
                volume_threshold: 0.05,
                noise_multiplier: 2.0,
                secondary_volume_threshold: 0.2,
                confirmation_bound: 4.0,
                voice_increment: 2.5,
                decay: 0.85,
                reset_after_quiet_samples: 15,
                ..balanced
            },
        }
    }
}
