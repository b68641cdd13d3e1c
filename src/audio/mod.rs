pub mod backend;
pub mod file;
pub mod meter;
pub mod preprocess;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use file::{AudioFile, FileBackend};
pub use meter::{MeterConfig, Spectrum, VolumeMeter, VolumeSample};
pub use preprocess::{PreprocessConfig, Preprocessor};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneBackend;
