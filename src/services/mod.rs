//! External collaborators: transcription, chat completion, speech synthesis.
//!
//! The session only sees the traits; `http` provides reqwest clients for
//! OpenAI-compatible endpoints.

mod config;
mod http;

pub use config::{ChatServiceConfig, ServicesConfig, SpeechServiceConfig, TranscriptionServiceConfig};
pub use http::{HttpChatCompleter, HttpSpeechSynthesizer, HttpTranscriber};

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::recording::Recording;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transcript {
    pub text: String,
}

#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, recording: &Recording) -> Result<Transcript, ServiceError>;
}

#[async_trait::async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Reply to the conversation so far
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Encoded audio (MP3, WAV...) for `text`
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError>;
}
