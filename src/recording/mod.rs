//! Utterance recording
//!
//! - `RecorderController`: collects audio between speech start and stop
//! - `TranscriptFilter`: decides whether a transcript is noise, a stop phrase or a request
//! - `RecordingStore`: optional WAV persistence of kept utterances

mod controller;
mod store;
mod transcript;

pub use controller::{RecorderController, Recording, RecordingConfig, StopOutcome, StopReason};
pub use store::{RecordingMetadata, RecordingStore};
pub use transcript::{TranscriptFilter, TranscriptVerdict};
