// Playback through the default output device with rodio
//
// rodio's OutputStream is not Send, so it lives on a dedicated thread that
// parks until the speaker is dropped. The Sink it feeds is shared.

use anyhow::{anyhow, Context, Result};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;
use tracing::{debug, info};

use super::decode::DecodedAudio;
use super::output::AudioOutput;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct SpeakerOutput {
    sink: Arc<Sink>,
    // Dropping the sender releases the stream thread
    _keep_alive: std_mpsc::Sender<()>,
}

impl SpeakerOutput {
    /// Open the default output device
    pub fn open() -> Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<Arc<Sink>, String>>();
        let (keep_alive, parked) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("speechgate-speaker".to_string())
            .spawn(move || {
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                match Sink::try_new(&handle) {
                    Ok(sink) => {
                        let _ = ready_tx.send(Ok(Arc::new(sink)));
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                }
                let _ = parked.recv();
                drop(stream);
                debug!("Speaker stream closed");
            })
            .context("Failed to spawn speaker thread")?;

        let sink = ready_rx
            .recv()
            .context("Speaker thread exited before opening the device")?
            .map_err(|e| anyhow!("No output device: {}", e))?;

        info!("Speaker output ready");
        Ok(Self {
            sink,
            _keep_alive: keep_alive,
        })
    }
}

#[async_trait::async_trait]
impl AudioOutput for SpeakerOutput {
    async fn play(&self, audio: &DecodedAudio) -> Result<()> {
        let source = SamplesBuffer::new(audio.channels.max(1), audio.sample_rate, audio.samples.clone());
        let sink = Arc::clone(&self.sink);
        // append waits for a halted queue to flush
        tokio::task::spawn_blocking(move || {
            sink.append(source);
            sink.play();
        })
        .await
        .context("Speaker task failed")?;

        debug!("Playing {:.2}s on speaker", audio.duration().as_secs_f64());
        while !self.sink.empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    fn halt(&self) {
        self.sink.stop();
    }

    fn name(&self) -> &str {
        "speaker"
    }
}
