use serde::{Deserialize, Serialize};

/// Endpoints and credentials for the external collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub transcription: TranscriptionServiceConfig,
    pub chat: ChatServiceConfig,
    pub speech: SpeechServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionServiceConfig {
    /// Full URL of the multipart transcription endpoint
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranscriptionServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            language: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatServiceConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Prepended to every conversation
    pub system_prompt: Option<String>,
    /// Most recent user/assistant messages sent with each request
    pub max_history: usize,
    pub timeout_secs: u64,
}

impl Default for ChatServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            system_prompt: Some("You are a helpful voice assistant. Keep answers short and conversational.".to_string()),
            max_history: 20,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechServiceConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub timeout_secs: u64,
}

impl Default for SpeechServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/audio/speech".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            timeout_secs: 60,
        }
    }
}
