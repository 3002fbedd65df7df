// Shared fakes for integration tests
//
// FakePlatform hands out backends that emit one 100ms frame per tick and
// count how many device streams are open. FakeChannel records outbound
// messages and lets a test inject backend events.

#![allow(dead_code)]

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use station_voice::audio::{
    AudioBackend, AudioBackendConfig, AudioEncoder, AudioFrame, CapturePlatform, Encoding,
    WavEncoder,
};
use station_voice::channel::{
    ChannelEvent, ClientMessage, DuplexChannel, EventHandler, EventKind, HandlerRegistry,
    SubscriptionId,
};
use station_voice::{ChannelError, VoiceInputSnapshot, VoiceInputState};

pub const SAMPLE_RATE: u32 = 16000;

/// Samples in one 100ms mono frame at 16kHz
pub const FRAME_SAMPLES: usize = 1600;

#[derive(Default)]
pub struct DeviceCounters {
    /// Streams currently open
    pub open: AtomicUsize,
    /// Streams ever opened, including permission probes
    pub opened: AtomicUsize,
}

pub struct FakePlatform {
    pub supported: AtomicBool,
    pub grant: AtomicBool,
    pub frame_samples: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub devices: Arc<DeviceCounters>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Self::with_frame_samples(FRAME_SAMPLES)
    }

    /// Frames of `frame_samples` samples; 0 gives a silent, empty stream
    pub fn with_frame_samples(frame_samples: usize) -> Arc<Self> {
        Arc::new(Self {
            supported: AtomicBool::new(true),
            grant: AtomicBool::new(true),
            frame_samples,
            sample_rate: SAMPLE_RATE,
            channels: 1,
            devices: Arc::new(DeviceCounters::default()),
        })
    }

    /// A device that delivers 100ms frames in its own native format
    pub fn with_device_format(sample_rate: u32, channels: u16) -> Arc<Self> {
        Arc::new(Self {
            supported: AtomicBool::new(true),
            grant: AtomicBool::new(true),
            frame_samples: sample_rate as usize / 10 * channels as usize,
            sample_rate,
            channels,
            devices: Arc::new(DeviceCounters::default()),
        })
    }

    pub fn unsupported() -> Arc<Self> {
        let platform = Self::new();
        platform.supported.store(false, Ordering::SeqCst);
        platform
    }

    pub fn deny_permission(&self) {
        self.grant.store(false, Ordering::SeqCst);
    }

    pub fn open_streams(&self) -> usize {
        self.devices.open.load(Ordering::SeqCst)
    }

    pub fn opened_streams(&self) -> usize {
        self.devices.opened.load(Ordering::SeqCst)
    }
}

impl CapturePlatform for FakePlatform {
    fn has_capture_device(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn has_recorder(&self) -> bool {
        true
    }

    fn encoder(&self, encoding: Encoding) -> Option<Arc<dyn AudioEncoder>> {
        match encoding {
            Encoding::Wav => Some(Arc::new(WavEncoder)),
            _ => None,
        }
    }

    fn create_backend(&self, _config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        Ok(Box::new(FakeBackend {
            grant: self.grant.load(Ordering::SeqCst),
            frame_samples: self.frame_samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            devices: Arc::clone(&self.devices),
            task: None,
        }))
    }
}

struct FakeBackend {
    grant: bool,
    frame_samples: usize,
    sample_rate: u32,
    channels: u16,
    devices: Arc<DeviceCounters>,
    task: Option<JoinHandle<()>>,
}

impl FakeBackend {
    fn release(&mut self) -> Option<JoinHandle<()>> {
        let task = self.task.take()?;
        task.abort();
        self.devices.open.fetch_sub(1, Ordering::SeqCst);
        Some(task)
    }
}

#[async_trait::async_trait]
impl AudioBackend for FakeBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if !self.grant {
            bail!("Permission denied by user");
        }
        if self.task.is_some() {
            bail!("Already capturing");
        }

        self.devices.opened.fetch_add(1, Ordering::SeqCst);
        self.devices.open.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(100);
        let frame_samples = self.frame_samples;
        let (sample_rate, channels) = (self.sample_rate, self.channels);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            let mut timestamp_ms = 0;
            loop {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: vec![1000; frame_samples],
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += 100;
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.release() {
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct FakeChannel {
    registry: HandlerRegistry,
    connected: AtomicBool,
    connectivity_checks: AtomicUsize,
    sent: Mutex<Vec<ClientMessage>>,
}

impl FakeChannel {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            registry: HandlerRegistry::new(),
            connected: AtomicBool::new(connected),
            connectivity_checks: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Deliver `event` as if the backend had sent it
    pub fn emit(&self, event: ChannelEvent) -> usize {
        self.registry.dispatch(&event)
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connectivity_checks(&self) -> usize {
        self.connectivity_checks.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry.subscriber_count(kind)
    }
}

#[async_trait::async_trait]
impl DuplexChannel for FakeChannel {
    async fn connect(&self, _user_id: &str) -> Result<(), ChannelError> {
        self.set_connected(true);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connectivity_checks.fetch_add(1, Ordering::SeqCst);
        self.connected.load(Ordering::SeqCst)
    }

    fn on(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.registry.on(kind, handler)
    }

    fn off(&self, id: SubscriptionId) {
        self.registry.off(id)
    }

    fn off_all(&self) {
        self.registry.off_all()
    }

    async fn send_voice_payload(&self, audio: &str, format: &str, sample_rate: u32) {
        if !self.connected.load(Ordering::SeqCst) {
            return;
        }
        self.sent.lock().unwrap().push(ClientMessage::VoiceInput {
            audio: audio.to_string(),
            format: format.to_string(),
            sample_rate,
        });
    }
}

/// Wait until the orchestrator publishes `state`
pub async fn wait_for(
    states: &mut watch::Receiver<VoiceInputSnapshot>,
    state: VoiceInputState,
) -> VoiceInputSnapshot {
    let wait = async {
        loop {
            let snapshot = states.borrow_and_update().clone();
            if snapshot.state == state {
                return snapshot;
            }
            states.changed().await.expect("orchestrator dropped");
        }
    };

    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", state))
}

/// Write a mono or stereo 16-bit WAV with a constant non-zero signal
pub fn write_wav(path: &std::path::Path, sample_rate: u32, channels: u16, duration_ms: u64) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = sample_rate as u64 * duration_ms / 1000;
    for i in 0..frames * channels as u64 {
        writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
    }
    writer.finalize().unwrap();
}
