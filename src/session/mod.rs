//! Voice session management
//!
//! This module provides the `VoiceSession` composition root that manages:
//! - Audio capture, scoped by `CaptureSession`
//! - Calibration, speech detection and recording
//! - Turns: transcription, chat completion, speech synthesis
//! - Interruption of playback and session statistics

mod capture;
mod config;
mod session;
mod stats;

pub use capture::CaptureSession;
pub use config::SessionConfig;
pub use session::{Collaborators, SessionEvent, VoiceSession};
pub use stats::SessionStats;
