//! Microphone preprocessing: band-pass filter and gain.
//!
//! The band-pass is a Butterworth high-pass followed by a Butterworth
//! low-pass. Filter state is preserved between frames so frame boundaries
//! don't click.

use anyhow::{anyhow, Result};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use serde::Deserialize;

/// Band-pass and gain settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// High-pass corner in Hz
    pub low_cut_hz: f32,
    /// Low-pass corner in Hz (clamped below Nyquist)
    pub high_cut_hz: f32,
    /// Linear gain applied after filtering
    pub gain: f32,
    pub enabled: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            low_cut_hz: 85.0,
            high_cut_hz: 8000.0,
            gain: 1.5,
            enabled: true,
        }
    }
}

pub struct Preprocessor {
    highpass: DirectForm2Transposed<f32>,
    lowpass: DirectForm2Transposed<f32>,
    gain: f32,
    enabled: bool,
}

impl Preprocessor {
    pub fn new(sample_rate: u32, config: &PreprocessConfig) -> Result<Self> {
        let nyquist = sample_rate as f32 / 2.0;
        // Corners at or past Nyquist are invalid for the biquad design
        let high_cut = config.high_cut_hz.min(nyquist * 0.95);

        let highpass = Coefficients::<f32>::from_params(
            Type::HighPass,
            sample_rate.hz(),
            config.low_cut_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| anyhow!("Invalid high-pass parameters: {:?}", e))?;

        let lowpass = Coefficients::<f32>::from_params(
            Type::LowPass,
            sample_rate.hz(),
            high_cut.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| anyhow!("Invalid low-pass parameters: {:?}", e))?;

        Ok(Self {
            highpass: DirectForm2Transposed::<f32>::new(highpass),
            lowpass: DirectForm2Transposed::<f32>::new(lowpass),
            gain: config.gain,
            enabled: config.enabled,
        })
    }

    /// Filter samples in place
    pub fn process_inplace(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for sample in samples.iter_mut() {
            let filtered = self.lowpass.run(self.highpass.run(*sample));
            *sample = (filtered * self.gain).clamp(-1.0, 1.0);
        }
    }

    /// Clear filter memory between sessions
    pub fn reset(&mut self) {
        self.highpass.reset_state();
        self.lowpass.reset_state();
    }
}
