use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::controller::{Recording, StopReason};

/// Metadata for a saved utterance
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    pub index: usize,
    pub file_path: PathBuf,
    /// Start time in milliseconds since capture started
    pub start_ms: u64,
    pub end_ms: u64,
    pub sample_rate: u32,
    pub sample_count: usize,
    pub stop_reason: StopReason,
}

/// Saves kept recordings as WAV files in one directory
pub struct RecordingStore {
    output_dir: PathBuf,
    prefix: String,
}

impl RecordingStore {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).context("Failed to create recording output directory")?;

        let prefix = prefix.into();
        info!("Recording store initialized: {:?} ({})", output_dir, prefix);

        Ok(Self { output_dir, prefix })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn save(&self, recording: &Recording) -> Result<RecordingMetadata> {
        let file_path = self
            .output_dir
            .join(format!("{}-utterance-{:03}.wav", self.prefix, recording.index));

        let mut writer = UtteranceWriter::create(&file_path, recording.sample_rate)?;
        writer.write_samples(&recording.samples)?;
        writer.finish()?;

        info!(
            "Saved utterance {} ({:.1}s) to {:?}",
            recording.index,
            recording.duration_ms() as f64 / 1000.0,
            file_path
        );

        Ok(RecordingMetadata {
            index: recording.index,
            file_path,
            start_ms: recording.start_ms,
            end_ms: recording.end_ms,
            sample_rate: recording.sample_rate,
            sample_count: recording.samples.len(),
            stop_reason: recording.stop_reason,
        })
    }
}

/// WAV file being written; finalized on drop if `finish` was not reached
struct UtteranceWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl UtteranceWriter {
    fn create(file_path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self { writer: Some(writer) })
    }

    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer.write_sample(sample).context("Failed to write sample to WAV")?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(())
    }
}

impl Drop for UtteranceWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
