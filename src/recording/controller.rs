use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{debug, info};

/// Recorder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Audio kept from before speech was confirmed
    pub pre_roll_ms: u64,
    /// Shorter recordings are discarded as noise
    pub min_recording_ms: u64,
    /// Save kept recordings as WAV files here
    pub output_dir: Option<PathBuf>,
    /// Phrases that halt playback and recording when transcribed
    pub stop_phrases: Vec<String>,
    /// Transcripts shorter than this (trimmed) are discarded
    pub min_transcript_chars: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            pre_roll_ms: 300,
            min_recording_ms: 500,
            output_dir: None,
            stop_phrases: vec![
                "stop".to_string(),
                "stop talking".to_string(),
                "be quiet".to_string(),
                "that's enough".to_string(),
            ],
            min_transcript_chars: 3,
        }
    }
}

/// Why a recording was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    SpeechEnded,
    SessionEnded,
    StopPhrase,
    Interrupted,
}

/// A finished utterance
#[derive(Debug, Clone)]
pub struct Recording {
    /// Sequence number within the session
    pub index: usize,
    /// Capture time of the first sample, pre-roll included
    pub start_ms: u64,
    pub end_ms: u64,
    pub sample_rate: u32,
    /// Mono PCM
    pub samples: Vec<i16>,
    pub stop_reason: StopReason,
}

impl Recording {
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate.max(1) as u64
    }

    /// Encode as a 16-bit mono WAV blob
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV encoder")?;
            for &sample in &self.samples {
                writer.write_sample(sample).context("Failed to encode sample")?;
            }
            writer.finalize().context("Failed to finalize WAV blob")?;
        }
        Ok(cursor.into_inner())
    }
}

/// Result of stopping the recorder
#[derive(Debug)]
pub enum StopOutcome {
    /// Nothing was being recorded
    Idle,
    /// Too short to be speech
    Discarded { duration_ms: u64, reason: StopReason },
    Finished(Recording),
}

struct ActiveRecording {
    start_ms: u64,
    samples: Vec<i16>,
}

/// Collects audio between speech start and stop
///
/// While idle the most recent `pre_roll_ms` of audio is kept in a ring so
/// the first syllable is not lost to the confirmation delay.
pub struct RecorderController {
    config: RecordingConfig,
    sample_rate: u32,
    pre_roll: VecDeque<i16>,
    pre_roll_capacity: usize,
    /// Capture time just past the last pushed sample
    cursor_ms: u64,
    active: Option<ActiveRecording>,
    next_index: usize,
}

impl RecorderController {
    pub fn new(config: RecordingConfig, sample_rate: u32) -> Self {
        let pre_roll_capacity = (config.pre_roll_ms * sample_rate as u64 / 1000) as usize;
        Self {
            config,
            sample_rate,
            pre_roll: VecDeque::with_capacity(pre_roll_capacity),
            pre_roll_capacity,
            cursor_ms: 0,
            active: None,
            next_index: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Feed mono samples captured at `timestamp_ms`
    pub fn push(&mut self, timestamp_ms: u64, samples: &[i16]) {
        self.cursor_ms = timestamp_ms + samples.len() as u64 * 1000 / self.sample_rate.max(1) as u64;

        if let Some(active) = &mut self.active {
            active.samples.extend_from_slice(samples);
            return;
        }

        if self.pre_roll_capacity == 0 {
            return;
        }
        for &sample in samples {
            if self.pre_roll.len() == self.pre_roll_capacity {
                self.pre_roll.pop_front();
            }
            self.pre_roll.push_back(sample);
        }
    }

    /// Begin a recording seeded with the pre-roll; no-op if already recording
    pub fn start(&mut self) {
        if self.active.is_some() {
            return;
        }

        let samples: Vec<i16> = self.pre_roll.drain(..).collect();
        let pre_roll_ms = samples.len() as u64 * 1000 / self.sample_rate.max(1) as u64;
        let start_ms = self.cursor_ms.saturating_sub(pre_roll_ms);

        debug!("Recorder started at {}ms with {}ms pre-roll", start_ms, pre_roll_ms);
        self.active = Some(ActiveRecording { start_ms, samples });
    }

    pub fn stop(&mut self, reason: StopReason) -> StopOutcome {
        let Some(active) = self.active.take() else {
            return StopOutcome::Idle;
        };

        let recording = Recording {
            index: self.next_index,
            start_ms: active.start_ms,
            end_ms: self.cursor_ms,
            sample_rate: self.sample_rate,
            samples: active.samples,
            stop_reason: reason,
        };

        let duration_ms = recording.duration_ms();
        if duration_ms < self.config.min_recording_ms {
            debug!("Discarding {}ms recording ({:?})", duration_ms, reason);
            return StopOutcome::Discarded { duration_ms, reason };
        }

        self.next_index += 1;
        info!(
            "Recording {} complete: {:.1}s - {:.1}s ({:?})",
            recording.index,
            recording.start_ms as f64 / 1000.0,
            recording.end_ms as f64 / 1000.0,
            reason
        );
        StopOutcome::Finished(recording)
    }
}
