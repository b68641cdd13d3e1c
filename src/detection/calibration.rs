//! Ambient noise calibration.
//!
//! Raw volume samples are collected for a fixed window. The resulting
//! threshold is `max(min_threshold, mean + k * stddev)` over the samples at or
//! below the outlier percentile.

use super::config::CalibrationConfig;
use tracing::{debug, info};

/// Outcome of feeding one sample to the calibrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    /// Still sampling, no new progress tick
    Collecting,
    /// A progress tick elapsed (0-100)
    Progress(u8),
    /// Window complete; carries the threshold now in effect
    Complete(f32),
}

#[derive(Debug, Clone)]
pub struct NoiseCalibrator {
    config: CalibrationConfig,
    samples: Vec<f32>,
    started_ms: Option<u64>,
    last_tick: u64,
    finished: bool,
}

impl NoiseCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
            started_ms: None,
            last_tick: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Restart sampling (the previous threshold stays with the caller)
    pub fn restart(&mut self) {
        self.samples.clear();
        self.started_ms = None;
        self.last_tick = 0;
        self.finished = false;
    }

    /// Feed one raw (unsmoothed) volume sample
    ///
    /// `previous_threshold` is returned on completion if no samples were collected.
    pub fn push(&mut self, timestamp_ms: u64, volume: f32, previous_threshold: f32) -> CalibrationStep {
        if self.finished {
            return CalibrationStep::Complete(previous_threshold);
        }

        let started = *self.started_ms.get_or_insert(timestamp_ms);
        let elapsed = timestamp_ms.saturating_sub(started);

        if elapsed >= self.config.duration_ms {
            return CalibrationStep::Complete(self.finish(previous_threshold));
        }

        if volume.is_finite() {
            self.samples.push(volume);
        }

        let tick = elapsed / self.config.tick_ms.max(1);
        if tick > self.last_tick {
            self.last_tick = tick;
            return CalibrationStep::Progress(self.progress(elapsed));
        }

        CalibrationStep::Collecting
    }

    /// Close the window early (end of input) and compute the threshold
    pub fn finish(&mut self, previous_threshold: f32) -> f32 {
        self.finished = true;
        match compute_threshold(&self.samples, &self.config) {
            Some(threshold) => {
                info!(
                    "Calibration complete: threshold {:.4} from {} samples",
                    threshold,
                    self.samples.len()
                );
                threshold
            }
            None => {
                debug!("Calibration collected no samples, keeping threshold {:.4}", previous_threshold);
                previous_threshold
            }
        }
    }

    fn progress(&self, elapsed_ms: u64) -> u8 {
        let duration = self.config.duration_ms.max(1);
        ((elapsed_ms.min(duration) * 100) / duration) as u8
    }
}

/// Threshold from a noise profile; `None` when there are no samples
pub fn compute_threshold(samples: &[f32], config: &CalibrationConfig) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let index = ((sorted.len() as f32 * config.outlier_percentile).floor() as usize).min(sorted.len() - 1);
    let cutoff = sorted[index];

    let kept: Vec<f32> = sorted.into_iter().filter(|&v| v <= cutoff).collect();
    let mean = kept.iter().sum::<f32>() / kept.len() as f32;
    let variance = kept.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / kept.len() as f32;

    Some((mean + config.stddev_multiplier * variance.sqrt()).max(config.min_threshold))
}
