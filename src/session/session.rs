use super::capture::CaptureSession;
use super::config::SessionConfig;
use super::stats::SessionStats;
use crate::audio::AudioBackend;
use crate::detection::{PipelineEvent, SoundClass, SpeechPipeline};
use crate::playback::{AudioPlaybackManager, PlaybackState};
use crate::recording::{Recording, RecordingStore, StopReason, TranscriptFilter, TranscriptVerdict};
use crate::services::{ChatCompleter, ChatMessage, Role, SpeechSynthesizer, Transcriber};
use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The external services a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub chat: Arc<dyn ChatCompleter>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Everything a listener (CLI, UI) may want to show
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CalibrationProgress(u8),
    Calibrated { threshold: f32 },
    SpeechStarted { at_ms: u64 },
    SpeechEnded { at_ms: u64, speech_ms: u64 },
    RecordingDiscarded { duration_ms: u64 },
    Transcript(String),
    TranscriptDiscarded,
    StopPhrase(String),
    Reply(String),
    Interrupted { at_ms: u64, class: SoundClass },
    /// Short user-facing message; the session keeps running
    Error(String),
}

/// How a turn ended, reported back to the session loop
#[derive(Debug)]
enum TurnOutcome {
    Replied,
    Discarded,
    StopPhrase,
    Failed,
}

/// Shared state handed to each turn task
#[derive(Clone)]
struct TurnContext {
    collaborators: Collaborators,
    playback: Arc<AudioPlaybackManager>,
    filter: Arc<TranscriptFilter>,
    history: Arc<Mutex<Vec<ChatMessage>>>,
    system_prompt: Option<String>,
    max_history: usize,
    events: mpsc::Sender<SessionEvent>,
}

/// Composition root of the voice loop
///
/// Owns the capture, the detection pipeline and the conversation history.
/// Playback is owned by the caller and injected.
pub struct VoiceSession {
    config: SessionConfig,
    backend: Option<Box<dyn AudioBackend>>,
    playback: Arc<AudioPlaybackManager>,
    turn_context: TurnContext,
    events_rx: Option<mpsc::Receiver<SessionEvent>>,
    store: Option<RecordingStore>,
    stats: SessionStats,
    /// Finished recordings are answered; cleared once shutdown is requested
    answering: bool,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        collaborators: Collaborators,
        playback: Arc<AudioPlaybackManager>,
    ) -> Result<Self> {
        info!("Creating voice session: {}", config.session_id);

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));

        let store = match &config.recording.output_dir {
            Some(dir) => Some(
                RecordingStore::new(dir, config.session_id.clone()).context("Failed to prepare recording store")?,
            ),
            None => None,
        };

        let filter = TranscriptFilter::new(&config.recording.stop_phrases, config.recording.min_transcript_chars);

        let turn_context = TurnContext {
            collaborators,
            playback: Arc::clone(&playback),
            filter: Arc::new(filter),
            history: Arc::new(Mutex::new(Vec::new())),
            system_prompt: config.system_prompt.clone(),
            max_history: config.max_history,
            events: events_tx,
        };

        Ok(Self {
            stats: SessionStats::new(config.session_id.clone()),
            config,
            backend: Some(backend),
            playback,
            turn_context,
            events_rx: Some(events_rx),
            store,
            answering: false,
        })
    }

    /// Event stream; available once
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Conversation so far (user and assistant messages)
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.turn_context.history.lock().await.clone()
    }

    /// Run until the capture ends or `shutdown` resolves
    ///
    /// When the capture ends, speech still in progress is recorded and
    /// answered, and the pending turn and its playback are allowed to finish.
    /// On shutdown they are cancelled and the last recording is only saved.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<SessionStats>
    where
        F: Future<Output = ()>,
    {
        let backend = self.backend.take().context("Session has already run")?;
        let mut capture = match CaptureSession::open(backend).await {
            Ok(capture) => capture,
            Err(e) => {
                error!("Capture failed: {:#}", e);
                self.emit(SessionEvent::Error(format!("{:#}", e)));
                self.stats.errors += 1;
                self.stats.ended_at = Some(Utc::now());
                return Err(e);
            }
        };

        let mut pipeline = SpeechPipeline::new(
            self.config.sample_rate,
            &self.config.preprocess,
            &self.config.meter,
            self.config.detection.clone(),
            self.config.recording.clone(),
        )?;

        let mut playback_rx = self.playback.subscribe();
        let (turn_tx, mut turn_rx) = mpsc::channel::<TurnOutcome>(16);
        let mut turn: Option<JoinHandle<()>> = None;

        tokio::pin!(shutdown);
        let mut shut_down = false;

        self.answering = true;
        info!("Voice session running ({})", capture.backend_name());
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    shut_down = true;
                    self.answering = false;
                    break;
                }
                frame = capture.next_frame() => match frame {
                    Some(frame) => {
                        for event in pipeline.process_frame(&frame) {
                            self.handle_pipeline_event(event, &mut pipeline, &mut turn, &turn_tx).await;
                        }
                    }
                    None => {
                        info!("Capture finished");
                        break;
                    }
                },
                changed = playback_rx.changed() => {
                    if changed.is_ok() {
                        let state = *playback_rx.borrow_and_update();
                        apply_playback_state(state, &mut pipeline);
                    }
                }
                Some(outcome) = turn_rx.recv() => {
                    self.handle_turn_outcome(outcome, &mut pipeline).await;
                }
            }
        }

        for event in pipeline.finish() {
            self.handle_pipeline_event(event, &mut pipeline, &mut turn, &turn_tx).await;
        }

        if shut_down {
            if let Some(handle) = turn.take() {
                handle.abort();
            }
            self.playback.stop_all().await;
        } else {
            // Let the last reply play out unless shutdown arrives first
            let playback = Arc::clone(&self.playback);
            let drain = async {
                if let Some(handle) = turn.take() {
                    let _ = handle.await;
                }
                while let Ok(outcome) = turn_rx.try_recv() {
                    self.handle_turn_outcome(outcome, &mut pipeline).await;
                }
                self.playback.wait_idle().await;
            };
            tokio::select! {
                _ = drain => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested while finishing");
                    playback.stop_all().await;
                }
            }
        }

        if let Err(e) = capture.close().await {
            warn!("{:#}", e);
        }

        self.stats.ended_at = Some(Utc::now());
        info!(
            "Voice session {} complete: {} utterances, {} turns, {} interruptions ({:.1}s)",
            self.stats.session_id,
            self.stats.utterances,
            self.stats.turns,
            self.stats.interruptions,
            self.stats.duration_secs()
        );

        Ok(self.stats.clone())
    }

    async fn handle_pipeline_event(
        &mut self,
        event: PipelineEvent,
        pipeline: &mut SpeechPipeline,
        turn: &mut Option<JoinHandle<()>>,
        turn_tx: &mpsc::Sender<TurnOutcome>,
    ) {
        match event {
            PipelineEvent::CalibrationProgress(percent) => self.emit(SessionEvent::CalibrationProgress(percent)),
            PipelineEvent::Calibrated { threshold } => {
                self.stats.threshold = Some(threshold);
                self.emit(SessionEvent::Calibrated { threshold });
            }
            PipelineEvent::SpeechStarted { at_ms } => self.emit(SessionEvent::SpeechStarted { at_ms }),
            PipelineEvent::SpeechEnded { at_ms, speech_ms } => {
                self.emit(SessionEvent::SpeechEnded { at_ms, speech_ms })
            }
            PipelineEvent::RecordingDiscarded { duration_ms, reason } => {
                debug!("Recording discarded: {}ms ({:?})", duration_ms, reason);
                self.stats.discarded_recordings += 1;
                self.emit(SessionEvent::RecordingDiscarded { duration_ms });
            }
            PipelineEvent::Recorded(recording) => {
                self.stats.utterances += 1;
                self.save(&recording);

                // A capture that ends mid-utterance is still answered
                if self.answering && recording.stop_reason != StopReason::StopPhrase {
                    if let Some(previous) = turn.take() {
                        if !previous.is_finished() {
                            info!("New utterance, cancelling pending reply");
                            previous.abort();
                        }
                    }
                    *turn = Some(self.spawn_turn(recording, turn_tx.clone()));
                }
            }
            PipelineEvent::Interrupted(event) => {
                self.stats.interruptions += 1;
                self.playback.stop_all().await;
                pipeline.end_playback();
                self.emit(SessionEvent::Interrupted {
                    at_ms: event.at_ms,
                    class: event.class,
                });
            }
        }
    }

    async fn handle_turn_outcome(&mut self, outcome: TurnOutcome, pipeline: &mut SpeechPipeline) {
        match outcome {
            TurnOutcome::Replied => self.stats.turns += 1,
            TurnOutcome::Discarded => self.stats.discarded_transcripts += 1,
            TurnOutcome::Failed => self.stats.errors += 1,
            TurnOutcome::StopPhrase => {
                self.stats.stop_phrases += 1;
                self.playback.stop_all().await;
                let mut events = Vec::new();
                pipeline.stop_recording(StopReason::StopPhrase, &mut events);
                for event in events {
                    match event {
                        PipelineEvent::Recorded(recording) => {
                            self.stats.utterances += 1;
                            self.save(&recording);
                        }
                        PipelineEvent::RecordingDiscarded { duration_ms, .. } => {
                            self.stats.discarded_recordings += 1;
                            self.emit(SessionEvent::RecordingDiscarded { duration_ms });
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn spawn_turn(&self, recording: Recording, outcomes: mpsc::Sender<TurnOutcome>) -> JoinHandle<()> {
        let context = self.turn_context.clone();
        tokio::spawn(async move {
            let outcome = run_turn(&context, &recording).await;
            let _ = outcomes.send(outcome).await;
        })
    }

    fn save(&self, recording: &Recording) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(recording) {
                warn!("Failed to save utterance {}: {:#}", recording.index, e);
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        emit(&self.turn_context.events, event);
    }
}

fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = events.try_send(event) {
        debug!("Session event not delivered: {}", e);
    }
}

fn apply_playback_state(state: PlaybackState, pipeline: &mut SpeechPipeline) {
    match state {
        PlaybackState::Playing { clip } => {
            debug!("Playback of clip {} started, watching for interruptions", clip);
            pipeline.begin_playback();
        }
        PlaybackState::Idle => pipeline.end_playback(),
    }
}

/// transcribe -> assess -> chat -> synthesize -> play
async fn run_turn(context: &TurnContext, recording: &Recording) -> TurnOutcome {
    let transcript = match context.collaborators.transcriber.transcribe(recording).await {
        Ok(transcript) => transcript,
        Err(e) => {
            error!("Transcription failed: {}", e);
            emit(&context.events, SessionEvent::Error(e.user_message()));
            return TurnOutcome::Failed;
        }
    };

    let text = match context.filter.assess(&transcript.text) {
        TranscriptVerdict::Discard => {
            emit(&context.events, SessionEvent::TranscriptDiscarded);
            return TurnOutcome::Discarded;
        }
        TranscriptVerdict::StopPhrase(phrase) => {
            info!("Stop phrase {:?}", phrase);
            emit(&context.events, SessionEvent::StopPhrase(phrase));
            return TurnOutcome::StopPhrase;
        }
        TranscriptVerdict::Accept(text) => text,
    };

    info!("User: {}", text);
    emit(&context.events, SessionEvent::Transcript(text.clone()));

    let messages = {
        let mut history = context.history.lock().await;
        history.push(ChatMessage::user(text));
        request_messages(context.system_prompt.as_deref(), &history, context.max_history)
    };

    let reply = match context.collaborators.chat.complete(&messages).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Chat completion failed: {}", e);
            emit(&context.events, SessionEvent::Error(e.user_message()));
            return TurnOutcome::Failed;
        }
    };

    info!("Assistant: {}", reply);
    context.history.lock().await.push(ChatMessage::assistant(reply.clone()));
    emit(&context.events, SessionEvent::Reply(reply.clone()));

    let audio = match context.collaborators.synthesizer.synthesize(&reply).await {
        Ok(audio) => audio,
        Err(e) => {
            error!("Speech synthesis failed: {}", e);
            emit(&context.events, SessionEvent::Error(e.user_message()));
            return TurnOutcome::Failed;
        }
    };

    if let Err(e) = context.playback.play(audio).await {
        error!("Playback failed: {:#}", e);
        emit(&context.events, SessionEvent::Error("Could not play the reply".to_string()));
        return TurnOutcome::Failed;
    }

    TurnOutcome::Replied
}

/// System prompt plus the most recent `max_history` conversation messages
fn request_messages(system_prompt: Option<&str>, history: &[ChatMessage], max_history: usize) -> Vec<ChatMessage> {
    let recent = history.len().saturating_sub(max_history.max(1));
    system_prompt
        .map(ChatMessage::system)
        .into_iter()
        .chain(history[recent..].iter().filter(|m| m.role != Role::System).cloned())
        .collect()
}
