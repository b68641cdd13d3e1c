use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioBackendConfig, MeterConfig, PreprocessConfig};
use crate::detection::{DetectionConfig, InterruptionConfig, InterruptionPreset};
use crate::recording::RecordingConfig;
use crate::services::ServicesConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub detection: DetectionConfig,
    pub interruption: InterruptionSection,
    pub recording: RecordingConfig,
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_duration_ms: u64,
    /// Input device name; the default device when unset
    pub device: Option<String>,
    pub preprocess: PreprocessConfig,
    pub meter: MeterConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            buffer_duration_ms: 100,
            device: None,
            preprocess: PreprocessConfig::default(),
            meter: MeterConfig::default(),
        }
    }
}

/// Interruption tuning: a named preset, or explicit values under `[interruption.custom]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterruptionSection {
    pub preset: Option<InterruptionPreset>,
    pub custom: Option<InterruptionConfig>,
}

impl Config {
    /// Load `<path>.toml` (or any format the extension names), layered with
    /// `SPEECHGATE__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SPEECHGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings.try_deserialize().context("Invalid configuration")
    }

    /// Detection settings with the interruption section folded in
    pub fn detection(&self) -> DetectionConfig {
        let mut detection = self.detection.clone();
        if let Some(preset) = self.interruption.preset {
            detection.interruption_preset = Some(preset);
        }
        if let Some(custom) = &self.interruption.custom {
            detection.interruption = custom.clone();
        }
        detection
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: 1,
            buffer_duration_ms: self.audio.buffer_duration_ms,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.audio.sample_rate,
            preprocess: self.audio.preprocess.clone(),
            meter: self.audio.meter.clone(),
            detection: self.detection(),
            recording: self.recording.clone(),
            system_prompt: self.services.chat.system_prompt.clone(),
            max_history: self.services.chat.max_history,
            ..SessionConfig::default()
        }
    }
}
