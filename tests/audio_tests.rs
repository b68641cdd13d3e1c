// Integration tests for audio capture types, WAV input and the file backend
//
// These tests verify frames are sized, timed and downmixed correctly before
// they reach the detection pipeline.

mod common;

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use speechgate::audio::{AudioBackendConfig, AudioFile, AudioFrame, AudioSource, FileBackend};
use speechgate::{AudioBackend, AudioBackendFactory};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_stereo_44k(path: &Path, seconds: f32) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for i in 0..(44100.0 * seconds) as usize {
        writer.write_sample(1000i16)?;
        writer.write_sample(if i % 2 == 0 { 3000i16 } else { -1000 })?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_frame_stereo_interleaved() {
    // 3 frames, 2 channels: [L, R, L, R, L, R]
    let frame = AudioFrame {
        samples: vec![100, 300, 150, 250, -200, 200],
        sample_rate: 16000,
        channels: 2,
        timestamp_ms: 0,
    };

    assert_eq!(frame.frame_count(), 3);
    let mono = frame.to_mono_f32();
    assert_eq!(mono.len(), 3);
    assert!((mono[0] - 200.0 / 32768.0).abs() < 1e-6);
    assert_eq!(mono[2], 0.0);
}

#[test]
fn test_audio_frame_timing_calculation() {
    let frame = AudioFrame {
        samples: vec![0i16; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    };
    assert_eq!(frame.duration_ms(), 100, "1600 samples at 16kHz should be 100ms");

    let empty_rate = AudioFrame { sample_rate: 0, ..frame };
    assert_eq!(empty_rate.duration_ms(), 0);
}

#[test]
fn test_audio_backend_config_default() {
    let config = AudioBackendConfig::default();

    assert_eq!(config.target_sample_rate, 16000, "Default should be 16kHz for transcription");
    assert_eq!(config.target_channels, 1, "Default should be mono");
    assert_eq!(config.buffer_duration_ms, 100, "Default buffer should be 100ms");
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_stereo_44k(&path, 0.5)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels, 2);
    assert!((audio.duration_seconds - 0.5).abs() < 0.01);
    assert_eq!(audio.samples.len() % audio.channels as usize, 0);
    assert!(audio.path.contains("stereo.wav"));

    Ok(())
}

#[test]
fn test_audio_file_downmix_and_resample() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_stereo_44k(&path, 1.0)?;

    let audio = AudioFile::open(&path)?;
    let mono = audio.to_mono(16000);

    // One second at the target rate
    let diff = (mono.len() as i64 - 16000).abs();
    assert!(diff <= 1, "Expected ~16000 samples, got {}", mono.len());
    // Left is 1000, right alternates 3000/-1000: channel mean is 2000 or 0
    assert!(mono.iter().all(|&s| (0..=2000).contains(&s)));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    assert!(AudioFile::open(&path).is_err(), "Opening nonexistent file should fail");
}

#[tokio::test]
async fn test_file_backend_frames_are_sized_and_timed() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tone.wav");
    common::write_wav(&path, &common::tone(1050, 440.0, 0.5))?;

    let mut backend = FileBackend::new(&path, AudioBackendConfig::default());
    let mut frames = backend.start().await?;
    assert!(backend.is_capturing());

    let mut received = Vec::new();
    while let Some(frame) = frames.recv().await {
        received.push(frame);
    }
    backend.stop().await?;

    assert_eq!(received.len(), 11, "1050ms in 100ms frames");
    for (i, frame) in received.iter().enumerate() {
        assert_eq!(frame.timestamp_ms, i as u64 * 100);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.channels, 1);
    }
    assert_eq!(received[0].samples.len(), 1600);
    assert_eq!(received[10].samples.len(), 800);
    assert!(!backend.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_file_backend_missing_file_fails_to_start() {
    let mut backend = FileBackend::new("/nonexistent/input.wav", AudioBackendConfig::default());
    assert!(backend.start().await.is_err());
}

#[cfg(not(feature = "microphone"))]
#[test]
fn test_microphone_requires_feature() {
    let result = AudioBackendFactory::create(AudioSource::Microphone { device: None }, AudioBackendConfig::default());
    assert!(result.is_err());
}

#[test]
fn test_factory_creates_file_backend() -> Result<()> {
    let backend = AudioBackendFactory::create(
        AudioSource::File {
            path: PathBuf::from("input.wav"),
            realtime: true,
        },
        AudioBackendConfig::default(),
    )?;
    assert!(!backend.is_capturing());
    Ok(())
}
