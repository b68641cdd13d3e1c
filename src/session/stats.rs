use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// When the session ended, if it has
    pub ended_at: Option<DateTime<Utc>>,

    /// Threshold from the last calibration
    pub threshold: Option<f32>,

    /// Recordings kept by the recorder
    pub utterances: usize,

    /// Recordings dropped for being too short
    pub discarded_recordings: usize,

    /// Transcripts dropped as noise
    pub discarded_transcripts: usize,

    /// Turns that produced a reply
    pub turns: usize,

    /// Confirmed interruptions of playback
    pub interruptions: usize,

    pub stop_phrases: usize,

    /// Collaborator failures shown to the user
    pub errors: usize,
}

impl SessionStats {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            threshold: None,
            utterances: 0,
            discarded_recordings: 0,
            discarded_transcripts: 0,
            turns: 0,
            interruptions: 0,
            stop_phrases: 0,
            errors: 0,
        }
    }

    /// Wall-clock duration so far, or in total once ended
    pub fn duration_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}
