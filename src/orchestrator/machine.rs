// The voice input state machine.
//
// `StateMachine::apply` is the whole transition table. It does no I/O: it
// updates the snapshot and returns the effects the driver has to carry out.
// Async work is tagged with the cycle that requested it; results from an
// older cycle are dropped.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::state::{DisplayTimings, RecognizedStations, VoiceInputSnapshot, VoiceInputState};
use crate::capture::CaptureResult;
use crate::channel::{ChannelEvent, Route};
use crate::error::VoiceInputError;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    StartRequested,
    StopRequested,
    CancelRequested,
    ResetRequested,
    PreflightFailed {
        cycle: u64,
        error: VoiceInputError,
    },
    PermissionResolved {
        cycle: u64,
        granted: bool,
    },
    CaptureStarted {
        cycle: u64,
        outcome: Result<(), VoiceInputError>,
    },
    DurationSampled {
        cycle: u64,
        elapsed_ms: u64,
    },
    DurationLimitReached {
        cycle: u64,
    },
    CaptureFinalized {
        cycle: u64,
        outcome: Result<CaptureResult, VoiceInputError>,
    },
    SendFailed {
        cycle: u64,
        error: VoiceInputError,
    },
    Channel(ChannelEvent),
    RevertElapsed {
        token: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Check capture support and connectivity, then ask for microphone permission
    Preflight { cycle: u64 },
    StartCapture { cycle: u64 },
    /// Sample the recording duration and watch for the duration cap
    StartMonitor { cycle: u64 },
    StopMonitor,
    FinalizeCapture { cycle: u64 },
    CancelCapture,
    SendPayload { cycle: u64, capture: CaptureResult },
    NotifyStations(RecognizedStations),
    NotifyRoutes(Vec<Route>),
    ScheduleRevert { token: u64, after: Duration },
    CancelRevert,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    snapshot: VoiceInputSnapshot,
    timings: DisplayTimings,
    cycle: u64,
    pending_revert: Option<u64>,
    next_revert_token: u64,
}

impl StateMachine {
    pub fn new(timings: DisplayTimings) -> Self {
        Self {
            snapshot: VoiceInputSnapshot::default(),
            timings,
            cycle: 0,
            pending_revert: None,
            next_revert_token: 0,
        }
    }

    pub fn snapshot(&self) -> &VoiceInputSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> VoiceInputState {
        self.snapshot.state
    }

    /// Number of the current cycle; bumped on every start, cancel, reset and error
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn timings(&self) -> &DisplayTimings {
        &self.timings
    }

    pub fn apply(&mut self, input: Input) -> Vec<Effect> {
        let before = self.snapshot.state;

        let effects = match input {
            Input::StartRequested => self.start(),
            Input::StopRequested => self.stop(self.cycle),
            Input::CancelRequested | Input::ResetRequested => self.reset(),
            Input::PreflightFailed { cycle, error } => {
                if self.is_current(cycle, VoiceInputState::Requesting) {
                    self.fail(error)
                } else {
                    Vec::new()
                }
            }
            Input::PermissionResolved { cycle, granted } => {
                self.permission_resolved(cycle, granted)
            }
            Input::CaptureStarted { cycle, outcome } => self.capture_started(cycle, outcome),
            Input::DurationSampled { cycle, elapsed_ms } => {
                if self.is_current(cycle, VoiceInputState::Recording) {
                    self.snapshot.recording_duration_ms =
                        self.snapshot.recording_duration_ms.max(elapsed_ms);
                }
                Vec::new()
            }
            Input::DurationLimitReached { cycle } => {
                if self.is_current(cycle, VoiceInputState::Recording) {
                    info!("Duration limit reached, finishing recording");
                }
                self.stop(cycle)
            }
            Input::CaptureFinalized { cycle, outcome } => self.capture_finalized(cycle, outcome),
            Input::SendFailed { cycle, error } => {
                if self.is_current(cycle, VoiceInputState::Processing) {
                    self.fail(error)
                } else {
                    Vec::new()
                }
            }
            Input::Channel(event) => self.channel_event(event),
            Input::RevertElapsed { token } => self.revert_elapsed(token),
        };

        if self.snapshot.state != before {
            info!("Voice input: {} -> {}", before, self.snapshot.state);
        }

        effects
    }

    fn is_current(&self, cycle: u64, state: VoiceInputState) -> bool {
        cycle == self.cycle && self.snapshot.state == state
    }

    fn start(&mut self) -> Vec<Effect> {
        let state = self.snapshot.state;
        if state != VoiceInputState::Idle && !state.is_terminal() {
            debug!("Ignoring start while {}", state);
            return Vec::new();
        }

        let mut effects: Vec<Effect> = self.cancel_revert().into_iter().collect();
        self.cycle += 1;
        self.snapshot = VoiceInputSnapshot {
            state: VoiceInputState::Requesting,
            ..VoiceInputSnapshot::default()
        };
        effects.push(Effect::Preflight { cycle: self.cycle });
        effects
    }

    fn stop(&mut self, cycle: u64) -> Vec<Effect> {
        if !self.is_current(cycle, VoiceInputState::Recording) {
            debug!("Ignoring stop while {}", self.snapshot.state);
            return Vec::new();
        }

        self.snapshot.state = VoiceInputState::Processing;
        vec![
            Effect::StopMonitor,
            Effect::FinalizeCapture { cycle: self.cycle },
        ]
    }

    fn reset(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::StopMonitor, Effect::CancelCapture];
        effects.extend(self.cancel_revert());
        self.cycle += 1;
        self.snapshot = VoiceInputSnapshot::default();
        effects
    }

    fn permission_resolved(&mut self, cycle: u64, granted: bool) -> Vec<Effect> {
        if !self.is_current(cycle, VoiceInputState::Requesting) {
            debug!("Ignoring stale permission result for cycle {}", cycle);
            return Vec::new();
        }

        if !granted {
            return self.fail(VoiceInputError::PermissionDenied);
        }

        self.snapshot.state = VoiceInputState::Recording;
        self.snapshot.recording_duration_ms = 0;
        vec![Effect::StartCapture { cycle }]
    }

    fn capture_started(&mut self, cycle: u64, outcome: Result<(), VoiceInputError>) -> Vec<Effect> {
        if !self.is_current(cycle, VoiceInputState::Recording) {
            debug!("Ignoring stale capture start for cycle {}", cycle);
            // A device opened for a cycle nobody waits on anymore must be released
            return match outcome {
                Ok(()) => vec![Effect::CancelCapture],
                Err(_) => Vec::new(),
            };
        }

        match outcome {
            Ok(()) => vec![Effect::StartMonitor { cycle }],
            Err(error) => self.fail(error),
        }
    }

    fn capture_finalized(
        &mut self,
        cycle: u64,
        outcome: Result<CaptureResult, VoiceInputError>,
    ) -> Vec<Effect> {
        if !self.is_current(cycle, VoiceInputState::Processing) {
            debug!("Ignoring stale capture result for cycle {}", cycle);
            return Vec::new();
        }

        match outcome {
            Ok(capture) => {
                self.snapshot.recording_duration_ms =
                    self.snapshot.recording_duration_ms.max(capture.duration_ms);
                vec![Effect::SendPayload { cycle, capture }]
            }
            Err(error) => self.fail(error),
        }
    }

    fn channel_event(&mut self, event: ChannelEvent) -> Vec<Effect> {
        let state = self.snapshot.state;

        match event {
            ChannelEvent::TranscriptionStarted { message } => {
                if state == VoiceInputState::Processing {
                    debug!("Transcription started: {}", message);
                    self.snapshot.state = VoiceInputState::Transcribing;
                } else {
                    debug!("Ignoring transcription_started while {}", state);
                }
                Vec::new()
            }
            ChannelEvent::TranscriptionComplete {
                transcribed_text,
                confidence,
            } => {
                if matches!(
                    state,
                    VoiceInputState::Processing | VoiceInputState::Transcribing
                ) {
                    info!(
                        "Transcribed: {} (confidence={:.2})",
                        transcribed_text, confidence
                    );
                    self.snapshot.state = VoiceInputState::Recognizing;
                    self.snapshot.transcribed_text = Some(transcribed_text);
                    self.snapshot.confidence = Some(confidence);
                } else {
                    debug!("Ignoring transcription_complete while {}", state);
                }
                Vec::new()
            }
            ChannelEvent::StationsRecognized {
                origin,
                destination,
            } => {
                if !state.is_awaiting_backend() {
                    debug!("Ignoring stations_recognized while {}", state);
                    return Vec::new();
                }
                if state != VoiceInputState::Recognizing {
                    warn!(
                        "stations_recognized arrived while {} without a transcription, accepting",
                        state
                    );
                }

                let stations = RecognizedStations {
                    origin,
                    destination,
                };
                self.snapshot.state = VoiceInputState::Success;
                self.snapshot.recognized_stations = Some(stations.clone());

                let mut effects = vec![Effect::NotifyStations(stations)];
                effects.extend(self.cancel_revert());
                effects.push(self.schedule_revert(self.timings.success_display));
                effects
            }
            ChannelEvent::RouteCalculated { routes } => vec![Effect::NotifyRoutes(routes)],
            ChannelEvent::Error { message } => self.fail(VoiceInputError::Backend(message)),
        }
    }

    fn revert_elapsed(&mut self, token: u64) -> Vec<Effect> {
        if self.pending_revert != Some(token) {
            debug!("Ignoring superseded revert timer {}", token);
            return Vec::new();
        }

        self.pending_revert = None;
        if self.snapshot.state.is_terminal() {
            self.snapshot = VoiceInputSnapshot::default();
        }
        Vec::new()
    }

    fn fail(&mut self, error: VoiceInputError) -> Vec<Effect> {
        warn!("Voice input failed: {}", error);

        let mut effects = vec![Effect::StopMonitor, Effect::CancelCapture];
        effects.extend(self.cancel_revert());
        self.cycle += 1;
        self.snapshot.state = VoiceInputState::Error;
        self.snapshot.error_message = Some(error.to_string());
        effects.push(self.schedule_revert(self.timings.error_display));
        effects
    }

    fn cancel_revert(&mut self) -> Option<Effect> {
        self.pending_revert.take().map(|_| Effect::CancelRevert)
    }

    fn schedule_revert(&mut self, after: Duration) -> Effect {
        self.next_revert_token += 1;
        let token = self.next_revert_token;
        self.pending_revert = Some(token);
        Effect::ScheduleRevert { token, after }
    }
}
