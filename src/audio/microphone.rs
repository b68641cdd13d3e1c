// Microphone capture through cpal
//
// cpal streams are not Send, so the stream lives on a dedicated thread that
// forwards fixed-size frames into a tokio channel until told to stop.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::file::resample_linear;
use crate::error::CaptureError;

pub struct MicrophoneBackend {
    device_name: Option<String>,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(device_name: Option<String>, config: AudioBackendConfig) -> Result<Self> {
        Ok(Self {
            device_name,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        })
    }

    /// List input device names so the CLI can offer a selector
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(format!("input device '{}' not found", name))),
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".to_string())),
        }
    }
}

fn classify_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device disappeared".to_string())
        }
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("permission") || lower.contains("denied") {
                CaptureError::PermissionDenied(message)
            } else {
                CaptureError::Stream(message)
            }
        }
    }
}

/// Collects device samples and emits target-rate mono frames
struct FrameAssembler {
    pending: Vec<f32>,
    device_rate: u32,
    device_frame_len: usize,
    target_rate: u32,
    frame_ms: u64,
    timestamp_ms: u64,
    tx: mpsc::Sender<AudioFrame>,
}

impl FrameAssembler {
    fn push(&mut self, mono: impl Iterator<Item = f32>) {
        self.pending.extend(mono);
        while self.pending.len() >= self.device_frame_len {
            let chunk: Vec<i16> = self
                .pending
                .drain(..self.device_frame_len)
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            let frame = AudioFrame {
                samples: resample_linear(&chunk, self.device_rate, self.target_rate),
                sample_rate: self.target_rate,
                channels: 1,
                timestamp_ms: self.timestamp_ms,
            };
            self.timestamp_ms += self.frame_ms;
            if self.tx.try_send(frame).is_err() {
                warn!("Dropping microphone frame at {}ms (consumer lagging)", self.timestamp_ms);
            }
        }
    }
}

fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<f32> {
    data.chunks_exact(channels)
        .map(|chunk| chunk.iter().map(|&s| convert(s)).sum::<f32>() / channels as f32)
        .collect()
}

fn run_stream(
    device: cpal::Device,
    mut assembler: FrameAssembler,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
) {
    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(e.to_string())));
            return;
        }
    };
    let format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();
    let channels = usize::from(stream_config.channels.max(1));
    assembler.device_rate = stream_config.sample_rate.0;
    assembler.device_frame_len =
        ((assembler.device_rate as u64 * assembler.frame_ms) / 1000).max(1) as usize;

    let err_fn = |err| error!("Microphone stream error: {}", err);

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| assembler.push(downmix(data, channels, |s| s).into_iter()),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                assembler.push(downmix(data, channels, |s| s as f32 / 32_768.0).into_iter())
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| {
                assembler.push(
                    downmix(data, channels, |s| (s as f32 - 32_768.0) / 32_768.0).into_iter(),
                )
            },
            err_fn,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(CaptureError::Stream(format!(
                "unsupported sample format: {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(classify_build_error(e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop() or the backend is dropped
    let _ = stop_rx.recv();
    drop(stream);
    info!("Microphone stream closed");
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let device = Self::find_device(self.device_name.as_deref())?;
        info!(
            "Starting microphone capture on '{}'",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let assembler = FrameAssembler {
            pending: Vec::new(),
            device_rate: self.config.target_sample_rate,
            device_frame_len: 1,
            target_rate: self.config.target_sample_rate,
            frame_ms: self.config.buffer_duration_ms,
            timestamp_ms: 0,
            tx,
        };

        let thread = std::thread::Builder::new()
            .name("speechgate-mic".to_string())
            .spawn(move || run_stream(device, assembler, stop_rx, ready_tx))
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e.into());
            }
            Err(_) => {
                return Err(CaptureError::Stream("microphone thread exited early".to_string()).into())
            }
        }

        self.capturing.store(true, Ordering::SeqCst);
        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Microphone thread join task failed")?
                .map_err(|_| CaptureError::Stream("microphone thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}
