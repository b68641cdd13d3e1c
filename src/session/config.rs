use crate::audio::{MeterConfig, PreprocessConfig};
use crate::detection::DetectionConfig;
use crate::recording::RecordingConfig;

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier, also the prefix of saved utterances
    pub session_id: String,

    /// Sample rate the pipeline runs at (capture is resampled to it)
    pub sample_rate: u32,

    pub preprocess: PreprocessConfig,
    pub meter: MeterConfig,
    pub detection: DetectionConfig,
    pub recording: RecordingConfig,

    /// Prepended to every chat request
    pub system_prompt: Option<String>,
    /// Most recent user/assistant messages sent with each chat request
    pub max_history: usize,

    /// Capacity of the session event channel
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            sample_rate: 16000,
            preprocess: PreprocessConfig::default(),
            meter: MeterConfig::default(),
            detection: DetectionConfig::default(),
            recording: RecordingConfig::default(),
            system_prompt: None,
            max_history: 20,
            event_buffer: 256,
        }
    }
}
