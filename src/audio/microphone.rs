// Microphone backend on top of cpal.
//
// cpal streams are not Send, so each capture owns a dedicated thread that
// builds the stream, keeps it alive and drops it when asked to stop.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

/// True if the default host exposes at least one input device
pub fn is_available() -> bool {
    cpal::default_host().default_input_device().is_some()
}

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    worker: Option<(std_mpsc::Sender<()>, JoinHandle<()>)>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        if !is_available() {
            bail!("No default input device found");
        }

        if config.echo_cancellation || config.noise_suppression || config.auto_gain_control {
            debug!("Voice processing constraints are left to the OS audio stack");
        }

        Ok(Self {
            config,
            worker: None,
        })
    }

    fn build_stream(
        device: &cpal::Device,
        config: &AudioBackendConfig,
        tx: mpsc::Sender<AudioFrame>,
    ) -> Result<cpal::Stream> {
        let default_config = device
            .default_input_config()
            .context("Failed to query default input config")?;

        let preferred = cpal::StreamConfig {
            channels: config.target_channels,
            sample_rate: cpal::SampleRate(config.target_sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Some devices refuse the preferred format; capture natively and let
        // the session conform frames instead.
        let candidates = [preferred, default_config.config()];
        let buffer_ms = config.buffer_duration_ms.max(1);

        for stream_config in candidates {
            let rate = stream_config.sample_rate.0;
            let channels = stream_config.channels;
            let samples_per_frame = (rate as u64 * buffer_ms / 1000) as usize * channels as usize;
            let started = Instant::now();

            let mut pending: Vec<i16> = Vec::with_capacity(samples_per_frame);
            let frame_tx = tx.clone();
            let mut push = move |data: &mut dyn Iterator<Item = i16>| {
                pending.extend(data);
                if pending.len() >= samples_per_frame {
                    let frame = AudioFrame {
                        samples: std::mem::take(&mut pending),
                        sample_rate: rate,
                        channels,
                        timestamp_ms: started.elapsed().as_millis() as u64,
                    };
                    if frame_tx.try_send(frame).is_err() {
                        warn!("Dropping audio frame, consumer is lagging");
                    }
                }
            };

            let err_callback = |err| error!("Audio stream error: {}", err);

            let stream = match default_config.sample_format() {
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mut converted = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                        push(&mut converted);
                    },
                    err_callback,
                    None,
                ),
                _ => device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        push(&mut data.iter().copied());
                    },
                    err_callback,
                    None,
                ),
            };

            match stream {
                Ok(stream) => {
                    info!("Microphone stream configured: {}Hz, {} channel(s)", rate, channels);
                    return Ok(stream);
                }
                Err(e) => debug!("Input config {:?} rejected: {}", stream_config, e),
            }
        }

        Err(anyhow!("No usable input stream configuration"))
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();
        let config = self.config.clone();

        let handle = std::thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || {
                let opened = cpal::default_host()
                    .default_input_device()
                    .ok_or_else(|| anyhow!("No default input device found"))
                    .and_then(|device| Self::build_stream(&device, &config, tx))
                    .and_then(|stream| {
                        stream.play().context("Failed to start input stream")?;
                        Ok(stream)
                    });

                match opened {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blocks until stop() signals or the backend is dropped
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, handle));
                info!("Microphone capture started");
                Ok(rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                bail!("Microphone thread exited before the stream opened")
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .context("Failed to join microphone thread")?
                .map_err(|_| anyhow!("Microphone thread panicked"))?;
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some((stop_tx, _)) = self.worker.take() {
            let _ = stop_tx.send(());
        }
    }
}
