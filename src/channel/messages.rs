use serde::{Deserialize, Serialize};

/// A route pre-computed by the backend. Its shape belongs to the route
/// search service and is passed through untouched.
pub type Route = serde_json::Value;

/// Message sent to the recognition backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    VoiceInput {
        /// Base64-encoded audio container
        audio: String,
        /// Container family, e.g. "webm"
        format: String,
        sample_rate: u32,
    },
}

/// Message received from the recognition backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    TranscriptionStarted {
        #[serde(default)]
        message: String,
    },
    TranscriptionComplete {
        transcribed_text: String,
        confidence: f32,
    },
    StationsRecognized {
        origin: String,
        destination: String,
    },
    RouteCalculated {
        #[serde(default)]
        routes: Vec<Route>,
    },
    Error {
        message: String,
    },
}

/// Discriminant of `ChannelEvent`, used to key subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TranscriptionStarted,
    TranscriptionComplete,
    StationsRecognized,
    RouteCalculated,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::TranscriptionStarted,
        EventKind::TranscriptionComplete,
        EventKind::StationsRecognized,
        EventKind::RouteCalculated,
        EventKind::Error,
    ];

    /// Wire name of the `type` field
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TranscriptionStarted => "transcription_started",
            EventKind::TranscriptionComplete => "transcription_complete",
            EventKind::StationsRecognized => "stations_recognized",
            EventKind::RouteCalculated => "route_calculated",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::TranscriptionStarted { .. } => EventKind::TranscriptionStarted,
            ChannelEvent::TranscriptionComplete { .. } => EventKind::TranscriptionComplete,
            ChannelEvent::StationsRecognized { .. } => EventKind::StationsRecognized,
            ChannelEvent::RouteCalculated { .. } => EventKind::RouteCalculated,
            ChannelEvent::Error { .. } => EventKind::Error,
        }
    }
}
