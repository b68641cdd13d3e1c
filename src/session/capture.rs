use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, AudioFrame};

/// A started capture backend and its frame stream
///
/// The backend is stopped by `close`, or on drop if `close` was never
/// reached (early return, error, task abort).
pub struct CaptureSession {
    backend: Option<Box<dyn AudioBackend>>,
    frames: mpsc::Receiver<AudioFrame>,
}

impl CaptureSession {
    pub async fn open(mut backend: Box<dyn AudioBackend>) -> Result<Self> {
        let frames = backend
            .start()
            .await
            .with_context(|| format!("Failed to start {} capture", backend.name()))?;

        info!("Capture started ({})", backend.name());
        Ok(Self {
            backend: Some(backend),
            frames,
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_deref().map(|b| b.name()).unwrap_or("closed")
    }

    /// Next captured frame; `None` once the backend has finished
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }

    pub async fn close(mut self) -> Result<()> {
        match self.backend.take() {
            Some(mut backend) => {
                self.frames.close();
                backend.stop().await.context("Failed to stop capture")?;
                info!("Capture stopped ({})", backend.name());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };

        self.frames.close();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Capture dropped while open, stopping {} in background", backend.name());
                handle.spawn(async move {
                    if let Err(e) = backend.stop().await {
                        warn!("Failed to stop capture on drop: {:#}", e);
                    }
                });
            }
            Err(_) => warn!("Capture dropped outside a runtime; {} not stopped", backend.name()),
        }
    }
}
