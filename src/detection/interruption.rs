//! Barge-in detection while synthesized speech is playing.
//!
//! Each metered sample is classified by [`SoundClassifier`]. Loud, unambiguous
//! sounds interrupt at once; everything else feeds a decaying accumulator that
//! has to reach the confirmation bound before playback is stopped.

use super::config::InterruptionConfig;
use super::spectral::{SoundClass, SoundClassifier};
use crate::audio::Spectrum;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterruptionState {
    /// No playback; samples are ignored
    Inactive,
    Monitoring { accumulator: f32, quiet_samples: u32 },
    /// Already fired for the current playback
    Detected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterruptionEvent {
    pub at_ms: u64,
    pub class: SoundClass,
    pub volume: f32,
    /// Fired on a single sample rather than through the accumulator
    pub immediate: bool,
}

#[derive(Debug, Clone)]
pub struct InterruptionDetector {
    config: InterruptionConfig,
    classifier: SoundClassifier,
    noise_threshold: f32,
    state: InterruptionState,
    interruptions: u64,
}

impl InterruptionDetector {
    pub fn new(config: InterruptionConfig) -> Self {
        Self {
            classifier: SoundClassifier::new(config.clone()),
            config,
            noise_threshold: 0.0,
            state: InterruptionState::Inactive,
            interruptions: 0,
        }
    }

    pub fn state(&self) -> InterruptionState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, InterruptionState::Monitoring { .. })
    }

    /// Interruptions confirmed over the detector's lifetime
    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }

    pub fn accumulator(&self) -> f32 {
        match self.state {
            InterruptionState::Monitoring { accumulator, .. } => accumulator,
            _ => 0.0,
        }
    }

    /// Calibrated ambient threshold from the VAD
    pub fn set_noise_threshold(&mut self, threshold: f32) {
        self.noise_threshold = threshold;
    }

    pub fn effective_threshold(&self) -> f32 {
        self.config
            .volume_threshold
            .max(self.noise_threshold * self.config.noise_multiplier)
    }

    /// Playback started: arm (or re-arm) detection
    pub fn begin_playback(&mut self) {
        debug!("Interruption detection armed (threshold {:.4})", self.effective_threshold());
        self.classifier.reset();
        self.state = InterruptionState::Monitoring {
            accumulator: 0.0,
            quiet_samples: 0,
        };
    }

    /// Playback finished or was stopped
    pub fn end_playback(&mut self) {
        if self.state != InterruptionState::Inactive {
            debug!("Interruption detection disarmed");
        }
        self.state = InterruptionState::Inactive;
    }

    pub fn process(&mut self, timestamp_ms: u64, volume: f32, spectrum: &Spectrum) -> Option<InterruptionEvent> {
        let InterruptionState::Monitoring {
            accumulator,
            quiet_samples,
        } = self.state
        else {
            return None;
        };

        let (class, _) = self.classifier.classify(volume, spectrum);
        self.step(timestamp_ms, volume, class, accumulator, quiet_samples)
    }

    fn step(
        &mut self,
        at_ms: u64,
        volume: f32,
        class: SoundClass,
        accumulator: f32,
        quiet_samples: u32,
    ) -> Option<InterruptionEvent> {
        let immediate = match class {
            SoundClass::ExtremeVolume => true,
            SoundClass::Doorbell | SoundClass::Sneeze => volume >= self.config.secondary_volume_threshold,
            _ => false,
        };
        if immediate {
            return Some(self.confirm(at_ms, class, volume, true));
        }

        if volume <= self.effective_threshold() {
            let quiet_samples = quiet_samples + 1;
            let accumulator = if quiet_samples >= self.config.reset_after_quiet_samples {
                0.0
            } else {
                accumulator * self.config.decay
            };
            self.state = InterruptionState::Monitoring {
                accumulator,
                quiet_samples,
            };
            return None;
        }

        if matches!(class, SoundClass::Explosive | SoundClass::Wind) {
            let cap = self.config.confirmation_bound * 0.5;
            let accumulator = (accumulator * self.config.decay + self.config.transient_increment).min(cap);
            debug!("Transient {:?} at {}ms, accumulator {:.2}", class, at_ms, accumulator);
            self.state = InterruptionState::Monitoring {
                accumulator,
                quiet_samples: 0,
            };
            return None;
        }

        let increment = if class == SoundClass::Voice {
            self.config.voice_increment
        } else {
            self.config.base_increment
        };
        let accumulator = accumulator + increment;

        if accumulator >= self.config.confirmation_bound {
            return Some(self.confirm(at_ms, class, volume, false));
        }

        self.state = InterruptionState::Monitoring {
            accumulator,
            quiet_samples: 0,
        };
        None
    }

    fn confirm(&mut self, at_ms: u64, class: SoundClass, volume: f32, immediate: bool) -> InterruptionEvent {
        self.interruptions += 1;
        self.state = InterruptionState::Detected;
        info!(
            "Interruption at {}ms: {:?} (volume {:.3}, immediate {})",
            at_ms, class, volume, immediate
        );
        InterruptionEvent {
            at_ms,
            class,
            volume,
            immediate,
        }
    }
}
