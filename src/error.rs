//! Error categories callers need to tell apart.
//!
//! Everything else flows through `anyhow::Result`.

use thiserror::Error;

/// Microphone / capture device failures
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No usable input device: {0}")]
    DeviceUnavailable(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Failures talking to an external service (transcription, chat, TTS)
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{service} API error {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned an unexpected response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("{service} request could not be built: {message}")]
    InvalidRequest {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Status { service, status, .. } => {
                format!("{} is unavailable right now (HTTP {})", service, status)
            }
            ServiceError::Transport { service, .. } => {
                format!("Could not reach the {} service", service)
            }
            ServiceError::Decode { service, .. } => {
                format!("The {} service sent an unreadable reply", service)
            }
            ServiceError::InvalidRequest { service, .. } => {
                format!("Could not prepare the {} request", service)
            }
        }
    }
}
