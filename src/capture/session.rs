use base64::Engine;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CaptureConfig;
use super::result::CaptureResult;
use crate::audio::{
    conform_frame, AudioBackend, AudioBackendConfig, AudioEncoder, AudioFrame, CapturePlatform,
    Encoding, CHUNK_INTERVAL_MS,
};
use crate::error::CaptureError;

/// How long finalization waits for frames still queued behind a stopped device
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Externally visible lifecycle of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Recording,
    /// The duration cap finalized the recording; `stop()` hands out the result
    LimitReached,
}

struct Captured {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

struct ActiveRecording {
    id: u64,
    backend: Box<dyn AudioBackend>,
    encoder: Arc<dyn AudioEncoder>,
    captured: Arc<StdMutex<Captured>>,
    collector: JoinHandle<()>,
    limit_timer: Option<JoinHandle<()>>,
}

impl ActiveRecording {
    fn disarm(&mut self) {
        if let Some(timer) = self.limit_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ActiveRecording {
    fn drop(&mut self) {
        self.disarm();
        self.collector.abort();
    }
}

enum Phase {
    Idle,
    Recording(ActiveRecording),
    Finalized(Result<CaptureResult, CaptureError>),
}

struct Shared {
    config: CaptureConfig,
    phase: Mutex<Phase>,
    started_at: StdMutex<Option<Instant>>,
    status: watch::Sender<CaptureStatus>,
    next_id: AtomicU64,
}

/// Owns the microphone for one recording at a time and turns it into an
/// encoded, size- and duration-bounded payload.
pub struct AudioCaptureSession {
    platform: Arc<dyn CapturePlatform>,
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AudioCaptureSession {
    pub fn new(config: CaptureConfig, platform: Arc<dyn CapturePlatform>) -> Self {
        let (status, _) = watch::channel(CaptureStatus::Idle);

        Self {
            platform,
            shared: Arc::new(Shared {
                config,
                phase: Mutex::new(Phase::Idle),
                started_at: StdMutex::new(None),
                status,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.shared.config
    }

    /// Both a capture device API and an encoding recorder are present.
    /// A `false` here is permanent for the process.
    pub fn check_support(&self) -> bool {
        self.platform.has_capture_device() && self.platform.has_recorder()
    }

    /// First encoding of the preference list the host can produce
    pub fn select_encoding(&self) -> Option<Encoding> {
        Encoding::select(|encoding| self.platform.encoder(encoding).is_some())
    }

    /// Open and immediately release a stream to trigger the OS permission prompt.
    /// No audio is kept.
    pub async fn request_permission(&self) -> bool {
        let mut backend = match self.platform.create_backend(self.backend_config()) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Microphone unavailable: {:#}", e);
                return false;
            }
        };

        let granted = match backend.start().await {
            Ok(rx) => {
                drop(rx);
                true
            }
            Err(e) => {
                warn!("Microphone access denied: {:#}", e);
                false
            }
        };

        if let Err(e) = backend.stop().await {
            warn!("Failed to release permission probe stream: {:#}", e);
        }

        granted
    }

    /// Open a fresh stream and begin buffering audio in 100ms chunks.
    ///
    /// The session finalizes itself once `max_duration_ms` elapses; the
    /// result is then returned by the next `stop()`.
    pub async fn start(&self) -> Result<(), CaptureError> {
        if !self.check_support() {
            return Err(CaptureError::Unsupported);
        }

        let encoding = self.select_encoding().ok_or(CaptureError::NoEncoding)?;
        let encoder = self
            .platform
            .encoder(encoding)
            .ok_or(CaptureError::NoEncoding)?;

        let mut phase = self.shared.phase.lock().await;
        if matches!(*phase, Phase::Recording(_)) {
            return Err(CaptureError::AlreadyRecording);
        }
        if matches!(*phase, Phase::Finalized(_)) {
            debug!("Discarding unclaimed recording");
            *phase = Phase::Idle;
        }

        let mut backend = self
            .platform
            .create_backend(self.backend_config())
            .map_err(|e| CaptureError::Device(format!("{:#}", e)))?;

        let audio_rx = match backend.start().await {
            Ok(rx) => rx,
            Err(e) => {
                if let Err(stop_err) = backend.stop().await {
                    warn!("Failed to release microphone after start error: {:#}", stop_err);
                }
                return Err(CaptureError::Device(format!("{:#}", e)));
            }
        };

        let config = &self.shared.config;
        let captured = Arc::new(StdMutex::new(Captured {
            samples: Vec::new(),
            sample_rate: config.sample_rate_hz,
            channels: config.channel_count,
        }));
        let collector = tokio::spawn(collect_frames(
            audio_rx,
            Arc::clone(&captured),
            config.sample_rate_hz,
            config.channel_count,
        ));

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        *lock(&self.shared.started_at) = Some(Instant::now());
        let limit_timer = tokio::spawn(Shared::enforce_limit(Arc::clone(&self.shared), id));

        info!(
            "Recording started with {} ({}, limit {} ms)",
            backend.name(),
            encoding.mime_type(),
            config.max_duration_ms
        );

        *phase = Phase::Recording(ActiveRecording {
            id,
            backend,
            encoder,
            captured,
            collector,
            limit_timer: Some(limit_timer),
        });
        self.shared.status.send_replace(CaptureStatus::Recording);

        Ok(())
    }

    /// Finalize the recording and hand out its payload.
    ///
    /// The device stream is released and the duration timer cleared whatever
    /// the outcome.
    pub async fn stop(&self) -> Result<CaptureResult, CaptureError> {
        let mut phase = self.shared.phase.lock().await;

        let result = match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Idle => return Err(CaptureError::NotRecording),
            Phase::Finalized(result) => result,
            Phase::Recording(mut active) => {
                active.disarm();
                self.shared.finalize(&mut active).await
            }
        };
        self.shared.status.send_replace(CaptureStatus::Idle);

        match &result {
            Ok(capture) => info!(
                "Recording finalized: {} bytes, {} ms",
                capture.size_bytes, capture.duration_ms
            ),
            Err(e) => warn!("Recording rejected: {}", e),
        }

        result
    }

    /// Drop any recording without producing a result. Safe in every state.
    pub async fn cancel(&self) {
        let mut phase = self.shared.phase.lock().await;

        match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Recording(mut active) => {
                active.disarm();
                active.collector.abort();
                lock(&self.shared.started_at).take();
                if let Err(e) = active.backend.stop().await {
                    warn!("Failed to release microphone on cancel: {:#}", e);
                }
                info!("Recording cancelled");
            }
            Phase::Finalized(_) => debug!("Discarding finalized recording on cancel"),
            Phase::Idle => {}
        }

        self.shared.status.send_replace(CaptureStatus::Idle);
    }

    /// Milliseconds since `start()`; 0 unless recording
    pub fn elapsed_ms(&self) -> u64 {
        let started_at = *lock(&self.shared.started_at);
        started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn is_recording(&self) -> bool {
        *self.shared.status.borrow() == CaptureStatus::Recording
    }

    pub fn status(&self) -> watch::Receiver<CaptureStatus> {
        self.shared.status.subscribe()
    }

    fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.shared.config.sample_rate_hz,
            target_channels: self.shared.config.channel_count,
            buffer_duration_ms: CHUNK_INTERVAL_MS,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

impl Shared {
    async fn enforce_limit(shared: Arc<Shared>, id: u64) {
        tokio::time::sleep(shared.config.max_duration()).await;

        let mut phase = shared.phase.lock().await;
        let mut active = match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Recording(active) if active.id == id => active,
            other => {
                *phase = other;
                return;
            }
        };

        // This task owns the handle being cleared; dropping it must not abort us
        active.limit_timer = None;

        warn!(
            "Recording reached the {} ms limit, finalizing",
            shared.config.max_duration_ms
        );
        let result = shared.finalize(&mut active).await;
        *phase = Phase::Finalized(result);
        shared.status.send_replace(CaptureStatus::LimitReached);
    }

    async fn finalize(&self, active: &mut ActiveRecording) -> Result<CaptureResult, CaptureError> {
        lock(&self.started_at).take();

        if let Err(e) = active.backend.stop().await {
            warn!("Failed to stop {} cleanly: {:#}", active.backend.name(), e);
        }

        // The stopped backend closed its channel; collect whatever is still queued
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut active.collector)
            .await
            .is_err()
        {
            warn!("Frame collector did not drain in time");
            active.collector.abort();
        }

        let captured = {
            let mut captured = lock(&active.captured);
            Captured {
                samples: std::mem::take(&mut captured.samples),
                sample_rate: captured.sample_rate,
                channels: captured.channels,
            }
        };

        let bytes = active
            .encoder
            .encode(&captured.samples, captured.sample_rate, captured.channels)
            .map_err(|e| CaptureError::Encoding(format!("{:#}", e)))?;

        let size = bytes.len();
        if size > self.config.max_file_size_bytes {
            return Err(CaptureError::TooLarge {
                size,
                limit: self.config.max_file_size_bytes,
            });
        }
        if size < self.config.min_file_size_bytes {
            return Err(CaptureError::TooQuiet {
                size,
                minimum: self.config.min_file_size_bytes,
            });
        }

        let per_second = captured.sample_rate.max(1) as u64 * captured.channels.max(1) as u64;
        let duration_ms = captured.samples.len() as u64 * 1000 / per_second;
        let encoding = active.encoder.encoding();

        Ok(CaptureResult {
            payload: base64::engine::general_purpose::STANDARD.encode(&bytes),
            mime_type_family: encoding.family().to_string(),
            sample_rate_hz: captured.sample_rate,
            encoding,
            size_bytes: size,
            duration_ms,
            captured_at: Utc::now(),
        })
    }
}

async fn collect_frames(
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    captured: Arc<StdMutex<Captured>>,
    sample_rate: u32,
    channels: u16,
) {
    while let Some(frame) = audio_rx.recv().await {
        let frame = conform_frame(frame, sample_rate, channels);
        let mut captured = lock(&captured);
        captured.sample_rate = frame.sample_rate;
        captured.channels = frame.channels;
        captured.samples.extend_from_slice(&frame.samples);
    }
}
