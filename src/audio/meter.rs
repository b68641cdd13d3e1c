//! Volume metering and analyser spectrum.
//!
//! Incoming mono audio is cut into fixed analysis windows. Each window yields
//! one [`VolumeSample`]: the RMS level plus a magnitude spectrum mapped onto
//! a 0..1 scale between `min_db` and `max_db`, the same shape a browser
//! analyser node reports.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Deserialize;
use std::sync::Arc;

/// Analyser settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Length of one analysis window in milliseconds
    pub window_ms: u64,
    /// FFT size (window is zero-padded or truncated to this length)
    pub fft_size: usize,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            window_ms: 20,
            fft_size: 512,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Normalised magnitude spectrum
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    /// One value per bin in [0, 1], bin 0 is DC
    pub bins: Vec<f32>,
    /// Width of one bin in Hz
    pub bin_hz: f32,
}

impl Spectrum {
    fn band(&self, low_hz: f32, high_hz: f32) -> &[f32] {
        if self.bins.is_empty() || self.bin_hz <= 0.0 {
            return &[];
        }
        let start = ((low_hz / self.bin_hz).floor() as usize).min(self.bins.len());
        let end = ((high_hz / self.bin_hz).ceil() as usize).clamp(start, self.bins.len());
        &self.bins[start..end]
    }

    /// Mean bin level within `[low_hz, high_hz)`
    pub fn band_mean(&self, low_hz: f32, high_hz: f32) -> f32 {
        let band = self.band(low_hz, high_hz);
        if band.is_empty() {
            return 0.0;
        }
        band.iter().sum::<f32>() / band.len() as f32
    }

    /// Variance of bin levels within `[low_hz, high_hz)`
    pub fn band_variance(&self, low_hz: f32, high_hz: f32) -> f32 {
        let band = self.band(low_hz, high_hz);
        if band.is_empty() {
            return 0.0;
        }
        let mean = band.iter().sum::<f32>() / band.len() as f32;
        band.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / band.len() as f32
    }

    /// Sum of bin levels within `[low_hz, high_hz)`
    pub fn band_energy(&self, low_hz: f32, high_hz: f32) -> f32 {
        self.band(low_hz, high_hz).iter().sum()
    }

    pub fn total_energy(&self) -> f32 {
        self.bins.iter().sum()
    }

    /// Frequency and level of the strongest bin (DC excluded)
    pub fn peak(&self) -> (f32, f32) {
        self.bins
            .iter()
            .enumerate()
            .skip(1)
            .fold((0.0, 0.0), |(hz, level), (i, &v)| {
                if v > level {
                    (i as f32 * self.bin_hz, v)
                } else {
                    (hz, level)
                }
            })
    }
}

/// One analysis window
#[derive(Debug, Clone)]
pub struct VolumeSample {
    /// Window start in milliseconds since capture start
    pub timestamp_ms: u64,
    /// RMS level in [0, ~1]
    pub volume: f32,
    pub spectrum: Spectrum,
}

pub struct VolumeMeter {
    sample_rate: u32,
    window_len: usize,
    fft_size: usize,
    min_db: f32,
    max_db: f32,
    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
    window_gain: f32,
    pending: Vec<f32>,
    samples_seen: u64,
}

impl VolumeMeter {
    pub fn new(sample_rate: u32, config: &MeterConfig) -> Self {
        let fft_size = config.fft_size.max(16);
        let window_len = ((sample_rate as u64 * config.window_ms) / 1000).max(1) as usize;
        let analysed = window_len.min(fft_size);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let hann: Vec<f32> = (0..analysed)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (analysed.max(2) - 1) as f32).cos())
            })
            .collect();
        let window_gain = hann.iter().sum::<f32>().max(1e-6);

        Self {
            sample_rate,
            window_len,
            fft_size,
            min_db: config.min_db,
            max_db: config.max_db,
            fft,
            hann,
            window_gain,
            pending: Vec::with_capacity(window_len * 2),
            samples_seen: 0,
        }
    }

    /// Window length in samples
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Feed mono samples, returning one sample per completed window
    pub fn process(&mut self, samples: &[f32]) -> Vec<VolumeSample> {
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        while self.pending.len() >= self.window_len {
            let window: Vec<f32> = self.pending.drain(..self.window_len).collect();
            let timestamp_ms = self.samples_seen * 1000 / self.sample_rate.max(1) as u64;
            self.samples_seen += self.window_len as u64;

            out.push(VolumeSample {
                timestamp_ms,
                volume: rms(&window),
                spectrum: self.spectrum(&window),
            });
        }
        out
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.samples_seen = 0;
    }

    fn spectrum(&self, window: &[f32]) -> Spectrum {
        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); self.fft_size];
        for (i, (&s, &w)) in window.iter().zip(self.hann.iter()).enumerate() {
            buffer[i] = Complex::new(s * w, 0.0);
        }

        self.fft.process(&mut buffer);

        let range = (self.max_db - self.min_db).max(1e-3);
        let bins = buffer[..self.fft_size / 2]
            .iter()
            .map(|c| {
                // Amplitude of a full-scale sinusoid maps to 1.0 (0 dB)
                let amplitude = 2.0 * c.norm() / self.window_gain;
                let db = 20.0 * amplitude.max(1e-10).log10();
                ((db - self.min_db) / range).clamp(0.0, 1.0)
            })
            .collect();

        Spectrum {
            bins,
            bin_hz: self.sample_rate as f32 / self.fft_size as f32,
        }
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}
