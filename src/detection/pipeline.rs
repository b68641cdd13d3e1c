//! Frame-level detection pipeline.
//!
//! `AudioFrame -> Preprocessor -> VolumeMeter -> calibration | VAD -> recorder`,
//! with the interruption detector watching the same samples while playback
//! is armed. Synchronous and owned by a single task.

use anyhow::Result;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::calibration::{CalibrationStep, NoiseCalibrator};
use super::config::DetectionConfig;
use super::interruption::{InterruptionDetector, InterruptionEvent};
use super::spectral::VoiceGate;
use super::vad::{DetectorInput, SpeechDetector, SpeechEvent};
use crate::audio::{AudioFrame, MeterConfig, PreprocessConfig, Preprocessor, VolumeMeter};
use crate::recording::{RecorderController, Recording, RecordingConfig, StopOutcome, StopReason};

#[derive(Debug)]
pub enum PipelineEvent {
    CalibrationProgress(u8),
    Calibrated { threshold: f32 },
    SpeechStarted { at_ms: u64 },
    SpeechEnded { at_ms: u64, speech_ms: u64 },
    Recorded(Recording),
    RecordingDiscarded { duration_ms: u64, reason: StopReason },
    Interrupted(InterruptionEvent),
}

pub struct SpeechPipeline {
    preprocessor: Preprocessor,
    meter: VolumeMeter,
    gate: VoiceGate,
    calibrator: NoiseCalibrator,
    calibrating: bool,
    vad: SpeechDetector,
    interruption: InterruptionDetector,
    recorder: RecorderController,
    /// Mono PCM handed to the meter but not yet part of a complete window
    unmetered: VecDeque<i16>,
    sample_rate: u32,
    now_ms: u64,
}

impl SpeechPipeline {
    pub fn new(
        sample_rate: u32,
        preprocess: &PreprocessConfig,
        meter: &MeterConfig,
        detection: DetectionConfig,
        recording: RecordingConfig,
    ) -> Result<Self> {
        let calibrating = detection.calibration.enabled;
        Ok(Self {
            preprocessor: Preprocessor::new(sample_rate, preprocess)?,
            meter: VolumeMeter::new(sample_rate, meter),
            gate: VoiceGate::new(&detection),
            calibrator: NoiseCalibrator::new(detection.calibration.clone()),
            calibrating,
            interruption: InterruptionDetector::new(detection.interruption_config()),
            vad: SpeechDetector::new(detection),
            recorder: RecorderController::new(recording, sample_rate),
            unmetered: VecDeque::new(),
            sample_rate,
            now_ms: 0,
        })
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn vad(&self) -> &SpeechDetector {
        &self.vad
    }

    pub fn interruption(&self) -> &InterruptionDetector {
        &self.interruption
    }

    /// Capture time reached so far
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Sample the ambient noise again; the current threshold stays until done
    pub fn recalibrate(&mut self) {
        info!("Recalibrating ambient noise");
        self.calibrator.restart();
        self.calibrating = true;
    }

    pub fn begin_playback(&mut self) {
        self.interruption.begin_playback();
    }

    pub fn end_playback(&mut self) {
        self.interruption.end_playback();
    }

    pub fn process_frame(&mut self, frame: &AudioFrame) -> Vec<PipelineEvent> {
        let raw = frame.to_mono_f32();
        let mut filtered = raw.clone();
        self.preprocessor.process_inplace(&mut filtered);
        self.unmetered.extend(raw.iter().map(|&s| to_pcm(s)));

        let mut events = Vec::new();
        for sample in self.meter.process(&filtered) {
            let timestamp_ms = sample.timestamp_ms;
            self.now_ms = self.now_ms.max(timestamp_ms);

            // The recorder sees each window before acting on that window's event
            let take = self.meter.window_len().min(self.unmetered.len());
            let window: Vec<i16> = self.unmetered.drain(..take).collect();
            self.recorder.push(timestamp_ms, &window);

            if self.calibrating {
                self.calibrate(timestamp_ms, sample.volume, &mut events);
            } else {
                let input = DetectorInput {
                    timestamp_ms,
                    volume: sample.volume,
                    has_voice: self.gate.has_voice(&sample.spectrum),
                };
                match self.vad.process(input) {
                    Some(SpeechEvent::Started { at_ms }) => {
                        events.push(PipelineEvent::SpeechStarted { at_ms });
                        self.recorder.start();
                    }
                    Some(SpeechEvent::Ended { at_ms, speech_ms }) => {
                        events.push(PipelineEvent::SpeechEnded { at_ms, speech_ms });
                        self.stop_recorder(StopReason::SpeechEnded, &mut events);
                    }
                    None => {}
                }
            }

            if let Some(event) = self.interruption.process(timestamp_ms, sample.volume, &sample.spectrum) {
                events.push(PipelineEvent::Interrupted(event));
                self.stop_recording(StopReason::Interrupted, &mut events);
            }
        }

        self.now_ms = self.now_ms.max(frame.timestamp_ms + frame.duration_ms());
        events
    }

    /// Stop the active recording early and return the detector to idle
    pub fn stop_recording(&mut self, reason: StopReason, events: &mut Vec<PipelineEvent>) {
        if self.vad.is_speaking() {
            debug!("Abandoning speech state ({:?})", reason);
        }
        self.vad.reset();
        self.stop_recorder(reason, events);
    }

    /// End of input: close calibration, speech and recording
    pub fn finish(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();

        if self.calibrating {
            self.calibrating = false;
            let threshold = self.calibrator.finish(self.vad.threshold());
            self.apply_threshold(threshold, &mut events);
        }

        if !self.unmetered.is_empty() {
            let tail: Vec<i16> = self.unmetered.drain(..).collect();
            let tail_ms = tail.len() as u64 * 1000 / self.sample_rate.max(1) as u64;
            self.recorder.push(self.now_ms.saturating_sub(tail_ms), &tail);
        }

        if let Some(SpeechEvent::Ended { at_ms, speech_ms }) = self.vad.force_end(self.now_ms) {
            events.push(PipelineEvent::SpeechEnded { at_ms, speech_ms });
        }
        self.stop_recorder(StopReason::SessionEnded, &mut events);
        self.interruption.end_playback();

        events
    }

    fn calibrate(&mut self, timestamp_ms: u64, volume: f32, events: &mut Vec<PipelineEvent>) {
        match self.calibrator.push(timestamp_ms, volume, self.vad.threshold()) {
            CalibrationStep::Collecting => {}
            CalibrationStep::Progress(percent) => events.push(PipelineEvent::CalibrationProgress(percent)),
            CalibrationStep::Complete(threshold) => {
                self.calibrating = false;
                self.apply_threshold(threshold, events);
            }
        }
    }

    fn apply_threshold(&mut self, threshold: f32, events: &mut Vec<PipelineEvent>) {
        events.push(PipelineEvent::CalibrationProgress(100));
        self.vad.set_threshold(threshold);
        self.interruption.set_noise_threshold(threshold);
        events.push(PipelineEvent::Calibrated { threshold });
    }

    fn stop_recorder(&mut self, reason: StopReason, events: &mut Vec<PipelineEvent>) {
        match self.recorder.stop(reason) {
            StopOutcome::Idle => {}
            StopOutcome::Discarded { duration_ms, reason } => {
                events.push(PipelineEvent::RecordingDiscarded { duration_ms, reason })
            }
            StopOutcome::Finished(recording) => events.push(PipelineEvent::Recorded(recording)),
        }
    }
}

fn to_pcm(sample: f32) -> i16 {
    (sample * 32_767.0).clamp(-32_768.0, 32_767.0) as i16
}
