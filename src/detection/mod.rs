pub mod calibration;
pub mod config;
pub mod interruption;
pub mod pipeline;
pub mod smoothing;
pub mod spectral;
pub mod vad;

pub use calibration::{compute_threshold, CalibrationStep, NoiseCalibrator};
pub use config::{CalibrationConfig, DetectionConfig, InterruptionConfig, InterruptionPreset};
pub use interruption::{InterruptionDetector, InterruptionEvent, InterruptionState};
pub use pipeline::{PipelineEvent, SpeechPipeline};
pub use smoothing::VolumeSmoother;
pub use spectral::{SoundClass, SoundClassifier, SoundFeatures, VoiceGate};
pub use vad::{DetectorInput, SpeechDetector, SpeechEvent, SpeechState};
