//! Volume-based voice activity detector.
//!
//! Transitions `Idle -> Validating -> Speaking -> Idle` on a stream of
//! smoothed volume samples. Time comes from the sample timestamps, so the
//! detector behaves the same on live and replayed audio.

use super::config::DetectionConfig;
use super::smoothing::VolumeSmoother;
use tracing::{debug, info};

/// One metered sample as seen by the detector
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput {
    pub timestamp_ms: u64,
    /// Raw (unsmoothed) volume
    pub volume: f32,
    /// Result of the spectral voice check
    pub has_voice: bool,
}

/// Completed transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    Started { at_ms: u64 },
    Ended { at_ms: u64, speech_ms: u64 },
}

/// The detector's single authoritative state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    /// Speech condition holding, not yet confirmed
    Validating { since_ms: u64, stable_samples: u32 },
    Speaking {
        started_ms: u64,
        quiet_samples: u32,
        /// Set once enough quiet samples have been seen
        grace_started_ms: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct SpeechDetector {
    config: DetectionConfig,
    threshold: f32,
    smoother: VolumeSmoother,
    state: SpeechState,
    first_speech_detected: bool,
}

impl SpeechDetector {
    pub fn new(config: DetectionConfig) -> Self {
        let smoother = VolumeSmoother::new(config.smoothing_alpha, config.smoothing_history);
        Self {
            threshold: config.silence_threshold,
            config,
            smoother,
            state: SpeechState::Idle,
            first_speech_detected: false,
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, SpeechState::Speaking { .. })
    }

    pub fn first_speech_detected(&self) -> bool {
        self.first_speech_detected
    }

    /// Calibrated threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        debug!("VAD threshold {:.4} -> {:.4}", self.threshold, threshold);
        self.threshold = threshold;
    }

    /// Threshold in effect, eased once speech has been heard
    pub fn current_threshold(&self) -> f32 {
        if self.first_speech_detected {
            self.threshold * self.config.retrigger_multiplier
        } else {
            self.threshold
        }
    }

    /// Most recent smoothed volume
    pub fn smoothed_volume(&self) -> f32 {
        self.smoother.last()
    }

    pub fn process(&mut self, input: DetectorInput) -> Option<SpeechEvent> {
        let volume = self.smoother.smooth(input.volume);
        let loud = volume > self.current_threshold();
        let now = input.timestamp_ms;

        match self.state {
            SpeechState::Idle => {
                if loud && input.has_voice {
                    debug!("Speech candidate at {}ms (volume {:.4})", now, volume);
                    self.state = SpeechState::Validating {
                        since_ms: now,
                        stable_samples: 1,
                    };
                    return self.confirm_if_ready(now);
                }
                None
            }

            SpeechState::Validating { since_ms, stable_samples } => {
                if loud && input.has_voice {
                    self.state = SpeechState::Validating {
                        since_ms,
                        stable_samples: stable_samples + 1,
                    };
                    self.confirm_if_ready(now)
                } else {
                    debug!("Speech candidate dropped after {}ms", now.saturating_sub(since_ms));
                    self.state = SpeechState::Idle;
                    None
                }
            }

            SpeechState::Speaking {
                started_ms,
                quiet_samples,
                grace_started_ms,
            } => {
                if loud {
                    if grace_started_ms.is_some() {
                        debug!("Speech resumed during grace period at {}ms", now);
                    }
                    self.state = SpeechState::Speaking {
                        started_ms,
                        quiet_samples: 0,
                        grace_started_ms: None,
                    };
                    return None;
                }

                let quiet_samples = quiet_samples + 1;
                let required = self.required_silence_samples(now.saturating_sub(started_ms));
                let grace_started_ms = if quiet_samples >= required {
                    Some(grace_started_ms.unwrap_or(now))
                } else {
                    None
                };

                if let Some(grace) = grace_started_ms {
                    if now.saturating_sub(grace) >= self.config.silence_timeout_ms {
                        return Some(self.end_speech(now, started_ms));
                    }
                }

                self.state = SpeechState::Speaking {
                    started_ms,
                    quiet_samples,
                    grace_started_ms,
                };
                None
            }
        }
    }

    /// End speech immediately (session end); no event when not speaking
    pub fn force_end(&mut self, now_ms: u64) -> Option<SpeechEvent> {
        match self.state {
            SpeechState::Speaking { started_ms, .. } => Some(self.end_speech(now_ms, started_ms)),
            _ => {
                self.state = SpeechState::Idle;
                None
            }
        }
    }

    /// Back to idle without an event, keeping threshold and session history
    pub fn reset(&mut self) {
        self.state = SpeechState::Idle;
        self.smoother.reset();
    }

    /// Quiet samples needed before the grace timer starts; shrinks linearly
    /// from `max_silence_samples` to `min_silence_samples` as speech goes on
    pub fn required_silence_samples(&self, speech_ms: u64) -> u32 {
        let max = self.config.max_silence_samples.max(self.config.min_silence_samples);
        let min = self.config.min_silence_samples;
        let window = self.config.silence_adapt_window_ms.max(1);
        let progress = speech_ms.min(window) as f32 / window as f32;
        let span = (max - min) as f32;
        (max as f32 - span * progress).round().max(min as f32) as u32
    }

    fn confirm_if_ready(&mut self, now: u64) -> Option<SpeechEvent> {
        let SpeechState::Validating { since_ms, stable_samples } = self.state else {
            return None;
        };

        let held_ms = now.saturating_sub(since_ms);
        if held_ms < self.config.min_speech_duration_ms || stable_samples < self.config.stability_samples {
            return None;
        }

        info!(
            "Speech started at {}ms (held {}ms, threshold {:.4})",
            now,
            held_ms,
            self.current_threshold()
        );
        self.first_speech_detected = true;
        self.state = SpeechState::Speaking {
            started_ms: now,
            quiet_samples: 0,
            grace_started_ms: None,
        };
        Some(SpeechEvent::Started { at_ms: now })
    }

    fn end_speech(&mut self, now: u64, started_ms: u64) -> SpeechEvent {
        let speech_ms = now.saturating_sub(started_ms);
        info!("Speech ended at {}ms after {}ms", now, speech_ms);
        self.state = SpeechState::Idle;
        SpeechEvent::Ended { at_ms: now, speech_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP_MS: u64 = 20;

    fn feed(detector: &mut SpeechDetector, t: &mut u64, volume: f32, has_voice: bool, count: usize) -> Vec<SpeechEvent> {
        let mut events = Vec::new();
        for _ in 0..count {
            if let Some(event) = detector.process(DetectorInput {
                timestamp_ms: *t,
                volume,
                has_voice,
            }) {
                events.push(event);
            }
            *t += STEP_MS;
        }
        events
    }

    #[test]
    fn quiet_input_stays_idle() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let threshold = detector.threshold();
        let mut t = 0;
        for volume in [0.0, threshold * 0.5, threshold * 0.99, threshold] {
            let events = feed(&mut detector, &mut t, volume, true, 200);
            assert!(events.is_empty());
            assert_eq!(detector.state(), SpeechState::Idle);
        }
    }

    #[test]
    fn sustained_speech_starts_once() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let mut t = 0;
        let volume = detector.threshold() * 1.1;
        let events = feed(&mut detector, &mut t, volume, true, 100);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SpeechEvent::Started { .. }));
        assert!(detector.is_speaking());
    }

    #[test]
    fn start_waits_for_min_duration_and_stability() {
        let config = DetectionConfig {
            min_speech_duration_ms: 200,
            ..Default::default()
        };
        let mut detector = SpeechDetector::new(config);
        let mut t = 0;
        // Loud from the first sample; 200ms at 20ms steps is 11 samples
        let events = feed(&mut detector, &mut t, 0.5, true, 10);
        assert!(events.is_empty());
        assert!(matches!(detector.state(), SpeechState::Validating { .. }));
        let events = feed(&mut detector, &mut t, 0.5, true, 1);
        assert_eq!(events, vec![SpeechEvent::Started { at_ms: 200 }]);
    }

    #[test]
    fn loud_noise_without_voice_never_validates() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let mut t = 0;
        let events = feed(&mut detector, &mut t, 0.5, false, 100);
        assert!(events.is_empty());
        assert_eq!(detector.state(), SpeechState::Idle);
    }

    #[test]
    fn reversal_during_validation_resets() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let mut t = 0;
        feed(&mut detector, &mut t, 0.5, true, 5);
        assert!(matches!(detector.state(), SpeechState::Validating { .. }));
        feed(&mut detector, &mut t, 0.5, false, 1);
        assert_eq!(detector.state(), SpeechState::Idle);

        // Counting starts from scratch
        feed(&mut detector, &mut t, 0.5, true, 1);
        assert!(matches!(
            detector.state(),
            SpeechState::Validating { stable_samples: 1, .. }
        ));
    }

    #[test]
    fn silence_ends_speech_once_after_timeout() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let mut t = 0;
        feed(&mut detector, &mut t, 0.3, true, 20);
        assert!(detector.is_speaking());

        let events = feed(&mut detector, &mut t, 0.0, true, 200);
        let ended: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SpeechEvent::Ended { .. }))
            .collect();
        assert_eq!(ended.len(), 1);
        assert_eq!(events.len(), 1);
        assert_eq!(detector.state(), SpeechState::Idle);
    }

    #[test]
    fn end_respects_silence_timeout() {
        let config = DetectionConfig {
            silence_timeout_ms: 1000,
            ..Default::default()
        };
        let mut detector = SpeechDetector::new(config);
        let mut t = 0;
        feed(&mut detector, &mut t, 0.3, true, 20);
        let quiet_from = t;

        let mut ended_at = None;
        for _ in 0..200 {
            if let Some(SpeechEvent::Ended { at_ms, .. }) = detector.process(DetectorInput {
                timestamp_ms: t,
                volume: 0.0,
                has_voice: false,
            }) {
                ended_at = Some(at_ms);
                break;
            }
            t += STEP_MS;
        }

        let ended_at = ended_at.expect("speech should end");
        assert!(ended_at - quiet_from >= 1000);
    }

    #[test]
    fn brief_pause_does_not_end_speech() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let mut t = 0;
        feed(&mut detector, &mut t, 0.3, true, 20);
        // 600ms pause is shorter than the grace period
        let events = feed(&mut detector, &mut t, 0.0, false, 30);
        assert!(events.is_empty());
        feed(&mut detector, &mut t, 0.3, false, 5);
        assert!(matches!(
            detector.state(),
            SpeechState::Speaking { quiet_samples: 0, grace_started_ms: None, .. }
        ));
    }

    #[test]
    fn retrigger_threshold_is_eased_after_first_speech() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        let base = detector.current_threshold();
        let mut t = 0;
        feed(&mut detector, &mut t, 0.3, true, 20);
        assert!(detector.first_speech_detected());
        assert!((detector.current_threshold() - base * 0.8).abs() < 1e-6);
    }

    #[test]
    fn adaptive_silence_count_tightens() {
        let detector = SpeechDetector::new(DetectionConfig::default());
        assert_eq!(detector.required_silence_samples(0), 15);
        assert_eq!(detector.required_silence_samples(5_000), 10);
        assert_eq!(detector.required_silence_samples(10_000), 5);
        assert_eq!(detector.required_silence_samples(60_000), 5);
    }

    #[test]
    fn force_end_only_when_speaking() {
        let mut detector = SpeechDetector::new(DetectionConfig::default());
        assert_eq!(detector.force_end(0), None);
        let mut t = 0;
        feed(&mut detector, &mut t, 0.3, true, 20);
        assert!(matches!(detector.force_end(t), Some(SpeechEvent::Ended { .. })));
        assert_eq!(detector.state(), SpeechState::Idle);
    }
}
