use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decode::{decode, DecodedAudio};
use super::output::AudioOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing { clip: u64 },
}

struct ActiveClip {
    clip: u64,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Plays synthesized speech, at most one clip at a time
///
/// Owned by the composition root and handed to whoever needs to start or
/// stop speech. State changes are published on a watch channel.
pub struct AudioPlaybackManager {
    output: Arc<dyn AudioOutput>,
    state: Arc<watch::Sender<PlaybackState>>,
    active: Mutex<Option<ActiveClip>>,
    next_clip: AtomicU64,
}

impl AudioPlaybackManager {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            output,
            state: Arc::new(state),
            active: Mutex::new(None),
            next_clip: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state(), PlaybackState::Playing { .. })
    }

    /// Decode and start a clip, stopping whatever is playing
    ///
    /// Returns once playback has started; the clip id identifies it in
    /// [`PlaybackState::Playing`].
    pub async fn play(&self, bytes: Vec<u8>) -> Result<u64> {
        let audio = tokio::task::spawn_blocking(move || decode(bytes))
            .await
            .context("Decoder task failed")??;
        self.play_decoded(audio).await
    }

    pub async fn play_decoded(&self, audio: DecodedAudio) -> Result<u64> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.halt(previous).await;
        }

        let clip = self.next_clip.fetch_add(1, Ordering::SeqCst);
        let (stop_tx, stop_rx) = oneshot::channel();
        let output = Arc::clone(&self.output);
        let state = Arc::clone(&self.state);

        info!(
            "Playing clip {} ({:.1}s on {})",
            clip,
            audio.duration().as_secs_f64(),
            output.name()
        );
        state.send_replace(PlaybackState::Playing { clip });

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                result = output.play(&audio) => match result {
                    Ok(()) => debug!("Clip {} finished", clip),
                    Err(e) => warn!("Clip {} failed: {:#}", clip, e),
                },
                _ = stop_rx => {
                    output.halt();
                    debug!("Clip {} stopped", clip);
                }
            }

            state.send_if_modified(|current| {
                if *current == (PlaybackState::Playing { clip }) {
                    *current = PlaybackState::Idle;
                    true
                } else {
                    false
                }
            });
        });

        *active = Some(ActiveClip {
            clip,
            stop: stop_tx,
            task,
        });
        Ok(clip)
    }

    /// Stop all playback; returns once the output is silent
    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.halt(previous).await;
        }
        self.state.send_if_modified(|current| {
            let changed = *current != PlaybackState::Idle;
            *current = PlaybackState::Idle;
            changed
        });
    }

    /// Wait until nothing is playing
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|state| *state == PlaybackState::Idle).await;
    }

    async fn halt(&self, clip: ActiveClip) {
        if clip.stop.send(()).is_ok() {
            info!("Stopping clip {}", clip.clip);
        }
        if let Err(e) = clip.task.await {
            if !e.is_cancelled() {
                warn!("Playback task for clip {} failed: {}", clip.clip, e);
            }
        }
    }
}
