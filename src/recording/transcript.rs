//! Significance filtering for transcription results.

use tracing::debug;

/// What to do with a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptVerdict {
    /// Noise: punctuation only or too short
    Discard,
    /// Control signal: halt playback and recording
    StopPhrase(String),
    Accept(String),
}

#[derive(Debug, Clone)]
pub struct TranscriptFilter {
    stop_phrases: Vec<Vec<String>>,
    min_chars: usize,
}

impl TranscriptFilter {
    pub fn new<S: AsRef<str>>(stop_phrases: &[S], min_chars: usize) -> Self {
        let stop_phrases = stop_phrases
            .iter()
            .map(|p| words(p.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        Self { stop_phrases, min_chars }
    }

    pub fn assess(&self, text: &str) -> TranscriptVerdict {
        let trimmed = text.trim();

        if trimmed.chars().count() < self.min_chars || !trimmed.chars().any(char::is_alphanumeric) {
            debug!("Discarding transcript {:?}", trimmed);
            return TranscriptVerdict::Discard;
        }

        let spoken = words(trimmed);
        for phrase in &self.stop_phrases {
            if spoken.windows(phrase.len()).any(|w| w == phrase.as_slice()) {
                return TranscriptVerdict::StopPhrase(phrase.join(" "));
            }
        }

        TranscriptVerdict::Accept(trimmed.to_string())
    }
}

/// Lowercase words, apostrophes kept inside words
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
