pub mod audio;
pub mod config;
pub mod detection;
pub mod error;
pub mod playback;
pub mod recording;
pub mod services;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource, FileBackend,
};
pub use config::Config;
pub use detection::{
    DetectionConfig, InterruptionConfig, InterruptionDetector, InterruptionPreset, PipelineEvent, SpeechDetector,
    SpeechEvent, SpeechPipeline, SpeechState,
};
pub use error::{CaptureError, ServiceError};
pub use playback::{default_output, AudioOutput, AudioPlaybackManager, PlaybackState, SimulatedOutput};
pub use recording::{Recording, RecordingConfig, StopReason, TranscriptFilter, TranscriptVerdict};
pub use services::{ChatCompleter, ChatMessage, SpeechSynthesizer, Transcriber, Transcript};
pub use session::{CaptureSession, Collaborators, SessionConfig, SessionEvent, SessionStats, VoiceSession};
