// Synthetic audio shared by the integration tests

#![allow(dead_code)]

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;

pub const SAMPLE_RATE: u32 = 16000;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

pub fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let mut writer = WavWriter::create(path, spec(SAMPLE_RATE))?;
    for &s in samples {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec(sample_rate))?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn samples_for(ms: u64) -> usize {
    (SAMPLE_RATE as u64 * ms / 1000) as usize
}

/// Uniform noise in `[-amplitude, amplitude]` from a fixed LCG
pub fn noise(ms: u64, amplitude: f32, seed: u32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    (0..samples_for(ms))
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 8) as f32 / (1u32 << 24) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

pub fn silence(ms: u64) -> Vec<f32> {
    vec![0.0; samples_for(ms)]
}

/// Voice-like harmonic series: 150 Hz fundamental, harmonics falling off as 1/k up to 3.4 kHz
pub fn voice(ms: u64) -> Vec<f32> {
    let f0 = 150.0f32;
    let harmonics = (3400.0 / f0) as usize;
    (0..samples_for(ms))
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (1..=harmonics)
                .map(|k| (0.08 / k as f32) * (2.0 * std::f32::consts::PI * f0 * k as f32 * t).sin())
                .sum::<f32>()
        })
        .collect()
}

pub fn tone(ms: u64, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..samples_for(ms))
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Calibration noise, one spoken utterance, then trailing silence
pub fn utterance_scene() -> Vec<f32> {
    let mut samples = noise(3500, 0.001, 7);
    samples.extend(voice(1500));
    samples.extend(silence(3000));
    samples
}
