use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
#[cfg(feature = "speaker")]
use tracing::warn;

use super::decode::DecodedAudio;

/// Sink for decoded clips
///
/// `play` resolves when the clip has finished. The manager cancels playback
/// by dropping the future, then calls `halt` so the device falls silent.
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, audio: &DecodedAudio) -> Result<()>;

    fn halt(&self);

    fn name(&self) -> &str;
}

/// The system speaker when one can be opened, otherwise a simulated output
#[cfg(feature = "speaker")]
pub fn default_output() -> Arc<dyn AudioOutput> {
    match super::speaker::SpeakerOutput::open() {
        Ok(speaker) => Arc::new(speaker),
        Err(e) => {
            warn!("{:#}; replies will not be audible", e);
            Arc::new(SimulatedOutput::new())
        }
    }
}

#[cfg(not(feature = "speaker"))]
pub fn default_output() -> Arc<dyn AudioOutput> {
    Arc::new(SimulatedOutput::new())
}

/// Output that plays nothing but takes as long as the clip lasts
///
/// Used by the CLI when no output device is available and by tests.
#[derive(Debug, Clone)]
pub struct SimulatedOutput {
    speed: f64,
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    halted: Arc<AtomicUsize>,
}

impl Default for SimulatedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self {
            speed: 1.0,
            started: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            halted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Play faster than real time (2.0 = twice as fast)
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(f64::EPSILON);
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn halted(&self) -> usize {
        self.halted.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioOutput for SimulatedOutput {
    async fn play(&self, audio: &DecodedAudio) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let duration = Duration::from_secs_f64(audio.duration().as_secs_f64() / self.speed);
        debug!("Simulating {:.2}s of playback", duration.as_secs_f64());
        tokio::time::sleep(duration).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn halt(&self) {
        self.halted.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
