// Integration tests for calibration and speech detection
//
// These tests drive the calibrator and the voice activity detector with
// metered volume sequences, the way the pipeline feeds them.

use anyhow::{Context, Result};
use speechgate::detection::{
    compute_threshold, CalibrationConfig, CalibrationStep, DetectionConfig, DetectorInput, NoiseCalibrator,
    SpeechDetector, SpeechEvent, SpeechState, VolumeSmoother,
};

const STEP_MS: u64 = 50;

fn feed(detector: &mut SpeechDetector, clock: &mut u64, volume: f32, has_voice: bool, count: usize) -> Vec<SpeechEvent> {
    let mut events = Vec::new();
    for _ in 0..count {
        if let Some(event) = detector.process(DetectorInput {
            timestamp_ms: *clock,
            volume,
            has_voice,
        }) {
            events.push(event);
        }
        *clock += STEP_MS;
    }
    events
}

#[test]
fn test_calibrate_then_detect_one_utterance() -> Result<()> {
    let config = DetectionConfig::default();
    let mut calibrator = NoiseCalibrator::new(config.calibration.clone());
    let mut clock = 0u64;

    let profile = [0.01f32, 0.012, 0.009, 0.011];
    let mut threshold = None;
    let mut progress = Vec::new();
    for volume in profile.iter().cycle().take(200) {
        match calibrator.push(clock, *volume, config.silence_threshold) {
            CalibrationStep::Collecting => {}
            CalibrationStep::Progress(percent) => progress.push(percent),
            CalibrationStep::Complete(value) => {
                threshold = Some(value);
                break;
            }
        }
        clock += STEP_MS;
    }

    let threshold = threshold.context("Calibration window never closed")?;
    assert!(calibrator.is_finished());
    assert_eq!(clock, config.calibration.duration_ms);
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "Progress should only increase");
    // Floor applies; the spread of the profile lifts the threshold just above the noise
    assert!(threshold >= config.calibration.min_threshold);
    assert!(threshold > 0.009 && threshold < 0.02, "threshold {}", threshold);

    let mut detector = SpeechDetector::new(config);
    detector.set_threshold(threshold);

    let started = feed(&mut detector, &mut clock, 0.3, true, 10);
    assert_eq!(started.len(), 1, "Speech should start exactly once: {:?}", started);
    assert!(detector.is_speaking());

    let last_loud_ms = clock - STEP_MS;
    let ended = feed(&mut detector, &mut clock, 0.0, false, 200);
    assert_eq!(ended.len(), 1, "Speech should end exactly once: {:?}", ended);

    match ended[0] {
        SpeechEvent::Ended { at_ms, speech_ms } => {
            assert!(at_ms >= last_loud_ms + 1000, "Ended at {}ms, last loud sample {}ms", at_ms, last_loud_ms);
            assert!(speech_ms > 0);
        }
        other => panic!("Expected end of speech, got {:?}", other),
    }
    assert_eq!(detector.state(), SpeechState::Idle);

    Ok(())
}

#[test]
fn test_quiet_room_never_starts_speech() -> Result<()> {
    let config = DetectionConfig::default();
    let samples: Vec<f32> = (0..60).map(|i| 0.002 + 0.001 * (i % 3) as f32).collect();
    let threshold = compute_threshold(&samples, &config.calibration).context("No samples")?;

    let mut detector = SpeechDetector::new(config);
    detector.set_threshold(threshold);

    let mut clock = 0;
    let events = feed(&mut detector, &mut clock, threshold * 0.9, true, 400);
    assert!(events.is_empty());
    assert_eq!(detector.state(), SpeechState::Idle);
    assert!(!detector.first_speech_detected());

    Ok(())
}

#[test]
fn test_constant_noise_floor_calibrates_to_floor() {
    let config = CalibrationConfig::default();
    for floor in [0.001f32, 0.004, 0.01, 0.05] {
        let threshold = compute_threshold(&vec![floor; 120], &config).unwrap();
        assert!(
            (threshold - floor.max(config.min_threshold)).abs() < 1e-6,
            "floor {} gave {}",
            floor,
            threshold
        );
    }
}

#[test]
fn test_smoothed_volume_stays_within_input_range() {
    let mut smoother = VolumeSmoother::new(0.5, 10);
    let mut peak = 0.0f32;
    for i in 0..500u32 {
        let sample = ((i.wrapping_mul(2_654_435_761) >> 16) % 1000) as f32 / 1000.0;
        peak = peak.max(sample);
        let smoothed = smoother.smooth(sample);
        assert!(smoothed >= 0.0 && smoothed <= peak + f32::EPSILON);
    }
    assert!(smoother.len() <= 10);
}

#[test]
fn test_second_utterance_uses_eased_threshold() -> Result<()> {
    let config = DetectionConfig::default();
    let multiplier = config.retrigger_multiplier;
    let mut detector = SpeechDetector::new(config);
    detector.set_threshold(0.1);
    let mut clock = 0;

    assert_eq!(feed(&mut detector, &mut clock, 0.3, true, 10).len(), 1);
    assert_eq!(feed(&mut detector, &mut clock, 0.0, false, 100).len(), 1);

    assert!((detector.current_threshold() - 0.1 * multiplier).abs() < 1e-6);
    // Loud enough for the eased threshold, too quiet for the calibrated one
    let events = feed(&mut detector, &mut clock, 0.09, true, 20);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SpeechEvent::Started { .. }));

    Ok(())
}
