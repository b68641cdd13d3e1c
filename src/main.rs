use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use speechgate::audio::AudioSource;
use speechgate::detection::{PipelineEvent, SpeechPipeline};
use speechgate::recording::RecordingStore;
use speechgate::services::{HttpChatCompleter, HttpSpeechSynthesizer, HttpTranscriber};
use speechgate::{
    default_output, AudioBackendFactory, AudioPlaybackManager, CaptureSession, Collaborators, Config, SessionEvent,
    VoiceSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speechgate", version, about = "Voice activity detection and barge-in for voice assistants")]
struct Cli {
    /// Config file path without extension
    #[arg(long, global = true, default_value = "config/speechgate")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run calibration and speech detection over a WAV file
    Detect {
        input: PathBuf,

        /// Save each kept utterance as WAV here
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Print the noise threshold calibrated from the start of a WAV file
    Calibrate { input: PathBuf },

    /// Run the full conversation loop
    Converse {
        /// Replay a WAV file in real time instead of using the microphone
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// List input devices
    #[cfg(feature = "microphone")]
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Detect { input, out_dir } => detect(&config, input, out_dir).await,
        Command::Calibrate { input } => calibrate(&config, input).await,
        Command::Converse { input } => converse(&config, input).await,
        #[cfg(feature = "microphone")]
        Command::Devices => {
            for name in speechgate::audio::MicrophoneBackend::list_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn open_file(config: &Config, path: PathBuf, realtime: bool) -> Result<CaptureSession> {
    let backend = AudioBackendFactory::create(AudioSource::File { path, realtime }, config.backend_config())?;
    CaptureSession::open(backend).await
}

fn pipeline(config: &Config) -> Result<SpeechPipeline> {
    SpeechPipeline::new(
        config.audio.sample_rate,
        &config.audio.preprocess,
        &config.audio.meter,
        config.detection(),
        config.recording.clone(),
    )
}

async fn detect(config: &Config, input: PathBuf, out_dir: Option<PathBuf>) -> Result<()> {
    let mut capture = open_file(config, input.clone(), false).await?;
    let mut pipeline = pipeline(config)?;

    let store = match out_dir {
        Some(dir) => {
            let prefix = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input".to_string());
            Some(RecordingStore::new(dir, prefix)?)
        }
        None => None,
    };

    let mut events = Vec::new();
    while let Some(frame) = capture.next_frame().await {
        events.extend(pipeline.process_frame(&frame));
    }
    events.extend(pipeline.finish());
    capture.close().await?;

    let mut kept = 0;
    for event in events {
        match event {
            PipelineEvent::Calibrated { threshold } => println!("threshold        {:.4}", threshold),
            PipelineEvent::SpeechStarted { at_ms } => println!("speech start     {:>8.2}s", at_ms as f64 / 1000.0),
            PipelineEvent::SpeechEnded { at_ms, speech_ms } => println!(
                "speech end       {:>8.2}s ({:.2}s)",
                at_ms as f64 / 1000.0,
                speech_ms as f64 / 1000.0
            ),
            PipelineEvent::RecordingDiscarded { duration_ms, .. } => {
                println!("discarded        {:>8.2}s recording", duration_ms as f64 / 1000.0)
            }
            PipelineEvent::Recorded(recording) => {
                kept += 1;
                if let Some(store) = &store {
                    let saved = store.save(&recording)?;
                    println!("saved            {}", saved.file_path.display());
                }
            }
            PipelineEvent::CalibrationProgress(_) | PipelineEvent::Interrupted(_) => {}
        }
    }

    info!("{} utterance(s) detected", kept);
    Ok(())
}

async fn calibrate(config: &Config, input: PathBuf) -> Result<()> {
    let mut config = config.clone();
    config.detection.calibration.enabled = true;

    let mut capture = open_file(&config, input, false).await?;
    let mut pipeline = pipeline(&config)?;

    let mut threshold = None;
    while threshold.is_none() {
        let Some(frame) = capture.next_frame().await else {
            break;
        };
        threshold = pipeline.process_frame(&frame).into_iter().find_map(|event| match event {
            PipelineEvent::Calibrated { threshold } => Some(threshold),
            _ => None,
        });
    }

    let threshold = match threshold {
        Some(threshold) => threshold,
        None => pipeline
            .finish()
            .into_iter()
            .find_map(|event| match event {
                PipelineEvent::Calibrated { threshold } => Some(threshold),
                _ => None,
            })
            .context("Calibration produced no threshold")?,
    };
    capture.close().await?;

    println!("{:.4}", threshold);
    Ok(())
}

async fn converse(config: &Config, input: Option<PathBuf>) -> Result<()> {
    let source = match input {
        Some(path) => AudioSource::File { path, realtime: true },
        None => AudioSource::Microphone {
            device: config.audio.device.clone(),
        },
    };
    let backend = AudioBackendFactory::create(source, config.backend_config())?;

    let collaborators = Collaborators {
        transcriber: Arc::new(HttpTranscriber::new(config.services.transcription.clone())?),
        chat: Arc::new(HttpChatCompleter::new(config.services.chat.clone())?),
        synthesizer: Arc::new(HttpSpeechSynthesizer::new(config.services.speech.clone())?),
    };
    let output = default_output();
    info!("Playing replies through {}", output.name());
    let playback = Arc::new(AudioPlaybackManager::new(output));

    let mut session = VoiceSession::new(config.session_config(), backend, collaborators, playback)?;
    let mut events = session.take_events().context("Session events already taken")?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::CalibrationProgress(percent) => println!("calibrating... {}%", percent),
                SessionEvent::Calibrated { threshold } => println!("ready (threshold {:.4})", threshold),
                SessionEvent::Transcript(text) => println!("you: {}", text),
                SessionEvent::Reply(text) => println!("assistant: {}", text),
                SessionEvent::StopPhrase(phrase) => println!("[stopped: {}]", phrase),
                SessionEvent::Interrupted { class, .. } => println!("[interrupted: {:?}]", class),
                SessionEvent::Error(message) => eprintln!("error: {}", message),
                _ => {}
            }
        }
    });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let stats = session.run(shutdown).await?;
    drop(session);
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
