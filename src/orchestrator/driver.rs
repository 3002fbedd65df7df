use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::machine::{Effect, Input, StateMachine};
use super::state::{DisplayTimings, VoiceInputSnapshot};
use crate::capture::{AudioCaptureSession, CaptureStatus};
use crate::channel::{ChannelEvent, DuplexChannel, EventKind, Route, SubscriptionId};
use crate::error::VoiceInputError;

pub type StationsCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type RoutesCallback = Arc<dyn Fn(&[Route]) + Send + Sync>;

/// Optional hooks invoked from the driver task
#[derive(Clone, Default)]
pub struct VoiceInputCallbacks {
    pub on_stations_recognized: Option<StationsCallback>,
    pub on_route_calculated: Option<RoutesCallback>,
}

struct Message {
    input: Input,
    reply: Option<oneshot::Sender<VoiceInputSnapshot>>,
}

impl Message {
    fn notify(input: Input) -> Self {
        Self { input, reply: None }
    }
}

/// Coordinates one capture session and the shared channel into voice input
/// cycles.
///
/// Every command and channel event goes through a single driver task, so
/// transitions never overlap. The channel is only subscribed to and sent on;
/// closing it is left to whoever created it.
pub struct VoiceInputOrchestrator {
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<VoiceInputSnapshot>,
    capture: Arc<AudioCaptureSession>,
    channel: Arc<dyn DuplexChannel>,
    subscriptions: Vec<SubscriptionId>,
    driver: JoinHandle<()>,
}

impl VoiceInputOrchestrator {
    /// Must be called from within a tokio runtime.
    pub fn new(
        capture: Arc<AudioCaptureSession>,
        channel: Arc<dyn DuplexChannel>,
        timings: DisplayTimings,
        callbacks: VoiceInputCallbacks,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(VoiceInputSnapshot::default());

        let subscriptions = EventKind::ALL
            .iter()
            .map(|&kind| {
                let tx = tx.clone();
                channel.on(
                    kind,
                    Arc::new(move |event: &ChannelEvent| {
                        let _ = tx.send(Message::notify(Input::Channel(event.clone())));
                    }),
                )
            })
            .collect();

        let driver = Driver {
            machine: StateMachine::new(timings),
            capture: Arc::clone(&capture),
            channel: Arc::clone(&channel),
            callbacks,
            tx: tx.clone(),
            state: state_tx,
            monitor: None,
            revert: None,
        };
        let driver = tokio::spawn(driver.run(rx));

        Self {
            tx,
            state,
            capture,
            channel,
            subscriptions,
            driver,
        }
    }

    pub async fn start_recording(&self) -> VoiceInputSnapshot {
        self.request(Input::StartRequested).await
    }

    pub async fn stop_recording(&self) -> VoiceInputSnapshot {
        self.request(Input::StopRequested).await
    }

    /// Abandon the current cycle from any state. Nothing is sent.
    pub async fn cancel_recording(&self) -> VoiceInputSnapshot {
        self.request(Input::CancelRequested).await
    }

    pub async fn reset_state(&self) -> VoiceInputSnapshot {
        self.request(Input::ResetRequested).await
    }

    pub fn snapshot(&self) -> VoiceInputSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceInputSnapshot> {
        self.state.clone()
    }

    /// `false` disables voice input for the lifetime of the process
    pub fn check_support(&self) -> bool {
        self.capture.check_support()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    async fn request(&self, input: Input) -> VoiceInputSnapshot {
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = Message {
            input,
            reply: Some(reply_tx),
        };

        if self.tx.send(message).is_err() {
            return self.snapshot();
        }
        reply_rx.await.unwrap_or_else(|_| self.snapshot())
    }
}

impl Drop for VoiceInputOrchestrator {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.channel.off(id);
        }
        self.driver.abort();

        // Release the device even if the owner never cancelled
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let capture = Arc::clone(&self.capture);
            runtime.spawn(async move { capture.cancel().await });
        }
    }
}

struct Driver {
    machine: StateMachine,
    capture: Arc<AudioCaptureSession>,
    channel: Arc<dyn DuplexChannel>,
    callbacks: VoiceInputCallbacks,
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Sender<VoiceInputSnapshot>,
    monitor: Option<JoinHandle<()>>,
    revert: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            self.process(message.input).await;

            if let Some(reply) = message.reply {
                let _ = reply.send(self.machine.snapshot().clone());
            }
        }

        debug!("Voice input driver stopped");
    }

    /// Apply `input` and every follow-up input its effects produce
    async fn process(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let effects = self.machine.apply(input);
            self.publish();

            for effect in effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.state.send_if_modified(|current| {
            if current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
    }

    async fn execute(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Preflight { cycle } => {
                if !self.capture.check_support() {
                    return Some(Input::PreflightFailed {
                        cycle,
                        error: VoiceInputError::UnsupportedPlatform,
                    });
                }
                if !self.channel.is_connected() {
                    return Some(Input::PreflightFailed {
                        cycle,
                        error: VoiceInputError::Connectivity,
                    });
                }

                let capture = Arc::clone(&self.capture);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let granted = capture.request_permission().await;
                    let _ = tx.send(Message::notify(Input::PermissionResolved { cycle, granted }));
                });
                None
            }
            Effect::StartCapture { cycle } => {
                let outcome = self.capture.start().await.map_err(VoiceInputError::from);
                Some(Input::CaptureStarted { cycle, outcome })
            }
            Effect::StartMonitor { cycle } => {
                self.stop_monitor();
                self.monitor = Some(tokio::spawn(monitor_duration(
                    Arc::clone(&self.capture),
                    self.tx.clone(),
                    cycle,
                    self.machine.timings().duration_sample_interval,
                )));
                None
            }
            Effect::StopMonitor => {
                self.stop_monitor();
                None
            }
            Effect::FinalizeCapture { cycle } => {
                let outcome = self.capture.stop().await.map_err(VoiceInputError::from);
                Some(Input::CaptureFinalized { cycle, outcome })
            }
            Effect::CancelCapture => {
                self.capture.cancel().await;
                None
            }
            Effect::SendPayload { cycle, capture } => {
                if !self.channel.is_connected() {
                    return Some(Input::SendFailed {
                        cycle,
                        error: VoiceInputError::Connectivity,
                    });
                }

                info!(
                    "Sending {} ms of {} audio ({} bytes)",
                    capture.duration_ms, capture.mime_type_family, capture.size_bytes
                );
                self.channel
                    .send_voice_payload(
                        &capture.payload,
                        &capture.mime_type_family,
                        capture.sample_rate_hz,
                    )
                    .await;
                None
            }
            Effect::NotifyStations(stations) => {
                if let Some(callback) = &self.callbacks.on_stations_recognized {
                    callback(&stations.origin, &stations.destination);
                }
                None
            }
            Effect::NotifyRoutes(routes) => {
                if let Some(callback) = &self.callbacks.on_route_calculated {
                    callback(&routes);
                }
                None
            }
            Effect::ScheduleRevert { token, after } => {
                self.cancel_revert();
                let tx = self.tx.clone();
                self.revert = Some(tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(Message::notify(Input::RevertElapsed { token }));
                }));
                None
            }
            Effect::CancelRevert => {
                self.cancel_revert();
                None
            }
        }
    }

    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }

    fn cancel_revert(&mut self) {
        if let Some(revert) = self.revert.take() {
            revert.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop_monitor();
        self.cancel_revert();
    }
}

/// Feed elapsed time to the machine and report the duration cap
async fn monitor_duration(
    capture: Arc<AudioCaptureSession>,
    tx: mpsc::UnboundedSender<Message>,
    cycle: u64,
    interval: Duration,
) {
    let mut status = capture.status();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if *status.borrow_and_update() == CaptureStatus::LimitReached {
        let _ = tx.send(Message::notify(Input::DurationLimitReached { cycle }));
        return;
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed_ms = capture.elapsed_ms();
                if tx.send(Message::notify(Input::DurationSampled { cycle, elapsed_ms })).is_err() {
                    break;
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                if *status.borrow_and_update() == CaptureStatus::LimitReached {
                    let _ = tx.send(Message::notify(Input::DurationLimitReached { cycle }));
                    break;
                }
            }
        }
    }
}
