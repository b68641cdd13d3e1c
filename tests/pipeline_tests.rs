// Integration tests for the frame-level detection pipeline
//
// These tests replay synthesized WAV files through the file backend and the
// full preprocess -> meter -> calibrate -> VAD -> recorder chain.

mod common;

use anyhow::Result;
use speechgate::audio::{AudioBackendConfig, AudioFile, FileBackend, MeterConfig, PreprocessConfig};
use speechgate::detection::{DetectionConfig, PipelineEvent, SpeechPipeline};
use speechgate::recording::{RecordingConfig, RecordingStore, StopReason};
use speechgate::{AudioBackend, CaptureSession};
use tempfile::TempDir;

fn pipeline() -> Result<SpeechPipeline> {
    SpeechPipeline::new(
        common::SAMPLE_RATE,
        &PreprocessConfig::default(),
        &MeterConfig::default(),
        DetectionConfig::default(),
        RecordingConfig::default(),
    )
}

async fn replay(path: &std::path::Path, pipeline: &mut SpeechPipeline) -> Result<Vec<PipelineEvent>> {
    replay_with(path, AudioBackendConfig::default(), pipeline).await
}

async fn replay_with(
    path: &std::path::Path,
    config: AudioBackendConfig,
    pipeline: &mut SpeechPipeline,
) -> Result<Vec<PipelineEvent>> {
    let backend: Box<dyn AudioBackend> = Box::new(FileBackend::new(path, config));
    let mut capture = CaptureSession::open(backend).await?;

    let mut events = Vec::new();
    while let Some(frame) = capture.next_frame().await {
        events.extend(pipeline.process_frame(&frame));
    }
    events.extend(pipeline.finish());
    capture.close().await?;
    Ok(events)
}

#[tokio::test]
async fn test_detects_single_utterance_in_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("utterance.wav");
    common::write_wav(&path, &common::utterance_scene())?;

    let mut pipeline = pipeline()?;
    let events = replay(&path, &mut pipeline).await?;

    let thresholds: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Calibrated { threshold } => Some(*threshold),
            _ => None,
        })
        .collect();
    assert_eq!(thresholds.len(), 1, "Calibration should complete once");
    assert!(thresholds[0] >= 0.005 && thresholds[0] < 0.02, "threshold {}", thresholds[0]);

    let starts: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::SpeechStarted { at_ms } => Some(*at_ms),
            _ => None,
        })
        .collect();
    assert_eq!(starts.len(), 1, "Expected one speech start: {:?}", starts);
    // Voice begins at 3.5s and must hold for the minimum duration
    assert!(starts[0] >= 3500 && starts[0] < 4200, "started at {}ms", starts[0]);

    let ends = events.iter().filter(|e| matches!(e, PipelineEvent::SpeechEnded { .. })).count();
    assert_eq!(ends, 1);

    let recordings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Recorded(recording) => Some(recording),
            _ => None,
        })
        .collect();
    assert_eq!(recordings.len(), 1);

    let recording = recordings[0];
    assert_eq!(recording.stop_reason, StopReason::SpeechEnded);
    // Pre-roll reaches back before the confirmed start
    assert!(recording.start_ms < starts[0]);
    assert!(recording.duration_ms() >= 1000, "recorded {}ms", recording.duration_ms());
    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::Interrupted(_))));

    Ok(())
}

#[tokio::test]
async fn test_noise_only_file_produces_no_speech() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("room.wav");
    common::write_wav(&path, &common::noise(6000, 0.001, 3))?;

    let mut pipeline = pipeline()?;
    let events = replay(&path, &mut pipeline).await?;

    assert!(events.iter().any(|e| matches!(e, PipelineEvent::Calibrated { .. })));
    assert!(!events.iter().any(|e| matches!(
        e,
        PipelineEvent::SpeechStarted { .. } | PipelineEvent::Recorded(_) | PipelineEvent::RecordingDiscarded { .. }
    )));
    assert!(!pipeline.is_recording());

    Ok(())
}

#[tokio::test]
async fn test_short_input_finishes_calibration_early() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("short.wav");
    common::write_wav(&path, &common::noise(1000, 0.001, 11))?;

    let mut pipeline = pipeline()?;
    let events = replay(&path, &mut pipeline).await?;

    assert!(!pipeline.is_calibrating());
    let calibrated = events.iter().filter(|e| matches!(e, PipelineEvent::Calibrated { .. })).count();
    assert_eq!(calibrated, 1);

    Ok(())
}

#[tokio::test]
async fn test_speech_during_playback_interrupts() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("barge-in.wav");
    common::write_wav(&path, &common::utterance_scene())?;

    let backend: Box<dyn AudioBackend> = Box::new(FileBackend::new(&path, AudioBackendConfig::default()));
    let mut capture = CaptureSession::open(backend).await?;
    let mut pipeline = pipeline()?;

    let mut events = Vec::new();
    while let Some(frame) = capture.next_frame().await {
        let frame_events = pipeline.process_frame(&frame);
        let calibrated = frame_events.iter().any(|e| matches!(e, PipelineEvent::Calibrated { .. }));
        events.extend(frame_events);
        if calibrated {
            pipeline.begin_playback();
        }
    }
    events.extend(pipeline.finish());
    capture.close().await?;

    let interruptions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Interrupted(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(interruptions.len(), 1, "Interruption should fire once per playback");
    assert!(interruptions[0].at_ms >= 3500);
    assert!(!pipeline.interruption().is_armed());

    // Recordings never outlive the speech state that started them
    assert!(!pipeline.is_recording());
    assert!(!pipeline.vad().is_speaking());

    Ok(())
}

#[tokio::test]
async fn test_recordings_are_saved_as_wav() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("utterance.wav");
    common::write_wav(&path, &common::utterance_scene())?;

    let mut pipeline = pipeline()?;
    let events = replay(&path, &mut pipeline).await?;

    let out_dir = dir.path().join("out");
    let store = RecordingStore::new(&out_dir, "test")?;
    let mut saved = Vec::new();
    for event in events {
        if let PipelineEvent::Recorded(recording) = event {
            saved.push(store.save(&recording)?);
        }
    }

    assert_eq!(saved.len(), 1);
    assert!(saved[0].file_path.exists());
    assert!(saved[0].file_path.starts_with(&out_dir));

    let audio = AudioFile::open(&saved[0].file_path)?;
    assert_eq!(audio.sample_rate, common::SAMPLE_RATE);
    assert_eq!(audio.channels, 1);
    assert!(audio.duration_seconds >= 1.0);

    Ok(())
}

#[tokio::test]
async fn test_long_frames_keep_back_to_back_utterances_apart() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("two-utterances.wav");
    let mut scene = common::noise(3500, 0.001, 5);
    scene.extend(common::voice(1500));
    scene.extend(common::silence(2500));
    scene.extend(common::voice(1500));
    scene.extend(common::silence(3000));
    common::write_wav(&path, &scene)?;

    // One frame spans the end of the first utterance and the start of the second
    let config = AudioBackendConfig {
        buffer_duration_ms: 3000,
        ..AudioBackendConfig::default()
    };
    let backend: Box<dyn AudioBackend> = Box::new(FileBackend::new(&path, config));
    let mut capture = CaptureSession::open(backend).await?;
    let mut pipeline = pipeline()?;

    let mut events = Vec::new();
    while let Some(frame) = capture.next_frame().await {
        events.extend(pipeline.process_frame(&frame));
        assert_eq!(
            pipeline.vad().is_speaking(),
            pipeline.is_recording(),
            "Speech and recording disagree after frame at {}ms",
            frame.timestamp_ms
        );
    }
    events.extend(pipeline.finish());
    capture.close().await?;

    let starts = events.iter().filter(|e| matches!(e, PipelineEvent::SpeechStarted { .. })).count();
    let ends = events.iter().filter(|e| matches!(e, PipelineEvent::SpeechEnded { .. })).count();
    assert_eq!(starts, 2);
    assert_eq!(ends, 2);

    let recordings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Recorded(recording) => Some(recording),
            _ => None,
        })
        .collect();
    assert_eq!(recordings.len(), 2, "Expected two recordings");
    assert!(recordings.iter().all(|r| r.stop_reason == StopReason::SpeechEnded));
    assert!(recordings[1].start_ms >= recordings[0].end_ms);
    assert!(recordings[1].start_ms < 8000, "second recording starts at {}ms", recordings[1].start_ms);

    Ok(())
}

#[tokio::test]
async fn test_long_frames_match_short_frames() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("utterance.wav");
    common::write_wav(&path, &common::utterance_scene())?;

    let mut short = pipeline()?;
    let short_events = replay(&path, &mut short).await?;
    let mut long = pipeline()?;
    let config = AudioBackendConfig {
        buffer_duration_ms: 3000,
        ..AudioBackendConfig::default()
    };
    let long_events = replay_with(&path, config, &mut long).await?;

    let bounds = |events: &[PipelineEvent]| -> Vec<(u64, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Recorded(r) => Some((r.start_ms, r.end_ms)),
                _ => None,
            })
            .collect()
    };
    assert_eq!(bounds(&short_events), bounds(&long_events));

    Ok(())
}

#[tokio::test]
async fn test_recalibration_adopts_louder_room() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("room-gets-louder.wav");
    let mut scene = common::noise(3500, 0.001, 7);
    scene.extend(common::noise(3100, 0.05, 8));
    common::write_wav(&path, &scene)?;

    let backend: Box<dyn AudioBackend> = Box::new(FileBackend::new(&path, AudioBackendConfig::default()));
    let mut capture = CaptureSession::open(backend).await?;
    let mut pipeline = pipeline()?;

    let mut events = Vec::new();
    let mut recalibrated = false;
    while let Some(frame) = capture.next_frame().await {
        if !recalibrated && frame.timestamp_ms >= 3500 {
            assert!(!pipeline.is_calibrating());
            pipeline.recalibrate();
            recalibrated = true;
        }
        events.extend(pipeline.process_frame(&frame));
    }
    events.extend(pipeline.finish());
    capture.close().await?;

    assert!(recalibrated);
    assert!(!pipeline.is_calibrating());
    let thresholds: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Calibrated { threshold } => Some(*threshold),
            _ => None,
        })
        .collect();
    assert_eq!(thresholds.len(), 2);
    assert!(thresholds[1] > thresholds[0], "thresholds {:?}", thresholds);
    assert!((pipeline.vad().threshold() - thresholds[1]).abs() < 1e-6);
    // The louder room is noise, not speech
    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::SpeechStarted { .. })));

    Ok(())
}

#[tokio::test]
async fn test_calibration_reports_completion() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("room.wav");
    common::write_wav(&path, &common::noise(4000, 0.001, 9))?;

    let mut pipeline = pipeline()?;
    let events = replay(&path, &mut pipeline).await?;

    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::CalibrationProgress(percent) => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(progress.len() > 1);
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "progress {:?}", progress);

    let calibrated = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::Calibrated { .. }))
        .expect("calibration should complete");
    assert!(matches!(events[calibrated - 1], PipelineEvent::CalibrationProgress(100)));

    Ok(())
}
