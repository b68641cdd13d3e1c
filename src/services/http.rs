use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::config::{ChatServiceConfig, SpeechServiceConfig, TranscriptionServiceConfig};
use super::{ChatCompleter, ChatMessage, SpeechSynthesizer, Transcriber, Transcript};
use crate::error::ServiceError;
use crate::recording::Recording;

const TRANSCRIPTION: &str = "transcription";
const CHAT: &str = "chat";
const SPEECH: &str = "speech";

fn build_client(service: &'static str, timeout_secs: u64) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|source| ServiceError::Transport { service, source })
}

fn authorize(request: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(key) if !key.is_empty() => request.bearer_auth(key),
        _ => request,
    }
}

/// Non-2xx responses become `ServiceError::Status` carrying the body
async fn check_status(service: &'static str, response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("{} API error {}: {}", service, status.as_u16(), body);
    Err(ServiceError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Multipart upload returning `{ "text": ... }`
pub struct HttpTranscriber {
    config: TranscriptionServiceConfig,
    client: Client,
}

impl HttpTranscriber {
    pub fn new(config: TranscriptionServiceConfig) -> Result<Self, ServiceError> {
        let client = build_client(TRANSCRIPTION, config.timeout_secs)?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, recording: &Recording) -> Result<Transcript, ServiceError> {
        let wav = recording.to_wav().map_err(|e| ServiceError::InvalidRequest {
            service: TRANSCRIPTION,
            message: format!("{:#}", e),
        })?;

        let file = Part::bytes(wav)
            .file_name(format!("utterance-{:03}.wav", recording.index))
            .mime_str("audio/wav")
            .map_err(|source| ServiceError::Transport {
                service: TRANSCRIPTION,
                source,
            })?;

        let mut form = Form::new().text("model", self.config.model.clone()).part("file", file);
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        debug!(
            "Uploading utterance {} ({}ms) for transcription",
            recording.index,
            recording.duration_ms()
        );
        let request = authorize(self.client.post(&self.config.url), self.config.api_key.as_deref());
        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(|source| ServiceError::Transport {
                service: TRANSCRIPTION,
                source,
            })?;

        check_status(TRANSCRIPTION, response)
            .await?
            .json::<Transcript>()
            .await
            .map_err(|e| ServiceError::Decode {
                service: TRANSCRIPTION,
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// First choice's message content
fn first_reply(body: ChatCompletionResponse) -> Result<String, ServiceError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| ServiceError::Decode {
            service: CHAT,
            message: "response has no choices[0].message.content".to_string(),
        })
}

/// JSON chat completion returning `{ "choices": [{ "message": { "content": ... } }] }`
pub struct HttpChatCompleter {
    config: ChatServiceConfig,
    client: Client,
}

impl HttpChatCompleter {
    pub fn new(config: ChatServiceConfig) -> Result<Self, ServiceError> {
        let client = build_client(CHAT, config.timeout_secs)?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl ChatCompleter for HttpChatCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };

        debug!("Requesting chat completion ({} messages)", messages.len());
        let request = authorize(self.client.post(&self.config.url), self.config.api_key.as_deref());
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|source| ServiceError::Transport { service: CHAT, source })?;

        let parsed = check_status(CHAT, response)
            .await?
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ServiceError::Decode {
                service: CHAT,
                message: e.to_string(),
            })?;

        first_reply(parsed)
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

/// JSON `{ model, input, voice }` returning encoded audio
pub struct HttpSpeechSynthesizer {
    config: SpeechServiceConfig,
    client: Client,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: SpeechServiceConfig) -> Result<Self, ServiceError> {
        let client = build_client(SPEECH, config.timeout_secs)?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
        };

        debug!("Synthesizing {} characters with voice {}", text.len(), self.config.voice);
        let request = authorize(self.client.post(&self.config.url), self.config.api_key.as_deref());
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|source| ServiceError::Transport { service: SPEECH, source })?;

        let bytes = check_status(SPEECH, response)
            .await?
            .bytes()
            .await
            .map_err(|source| ServiceError::Transport { service: SPEECH, source })?;

        if bytes.is_empty() {
            return Err(ServiceError::Decode {
                service: SPEECH,
                message: "empty audio body".to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Role;

    #[test]
    fn chat_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn reply_is_first_choice_content() {
        let body: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}},{"message":{"content":"other"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_reply(body).unwrap(), "Hello!");
    }

    #[test]
    fn missing_content_is_decode_error() {
        let body: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_reply(body), Err(ServiceError::Decode { service: "chat", .. })));
    }

    #[test]
    fn speech_request_shape() {
        let body = SpeechRequest {
            model: "tts-1",
            input: "Hello there",
            voice: "alloy",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"model":"tts-1","input":"Hello there","voice":"alloy"}"#);
    }

    #[test]
    fn transcript_parses_text_field() {
        let transcript: Transcript = serde_json::from_str(r#"{"text":"turn it off","language":"en"}"#).unwrap();
        assert_eq!(transcript.text, "turn it off");
        assert_eq!(ChatMessage::assistant("x").role, Role::Assistant);
    }
}
