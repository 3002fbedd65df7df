use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Phase of one voice input cycle as seen by the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceInputState {
    #[default]
    Idle,
    Requesting,
    Recording,
    Processing,
    Transcribing,
    Recognizing,
    Success,
    Error,
}

impl VoiceInputState {
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceInputState::Idle => "idle",
            VoiceInputState::Requesting => "requesting",
            VoiceInputState::Recording => "recording",
            VoiceInputState::Processing => "processing",
            VoiceInputState::Transcribing => "transcribing",
            VoiceInputState::Recognizing => "recognizing",
            VoiceInputState::Success => "success",
            VoiceInputState::Error => "error",
        }
    }

    /// `success` and `error` are shown for a while, then revert to `idle`
    pub fn is_terminal(self) -> bool {
        matches!(self, VoiceInputState::Success | VoiceInputState::Error)
    }

    /// Waiting on the backend after the payload left
    pub fn is_awaiting_backend(self) -> bool {
        matches!(
            self,
            VoiceInputState::Processing
                | VoiceInputState::Transcribing
                | VoiceInputState::Recognizing
        )
    }
}

impl std::fmt::Display for VoiceInputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedStations {
    pub origin: String,
    pub destination: String,
}

/// Read-only view the UI renders from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceInputSnapshot {
    pub state: VoiceInputState,
    pub error_message: Option<String>,
    pub transcribed_text: Option<String>,
    pub confidence: Option<f32>,
    pub recognized_stations: Option<RecognizedStations>,
    pub recording_duration_ms: u64,
}

/// How long terminal states stay visible and how often the recording
/// duration is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTimings {
    pub success_display: Duration,
    pub error_display: Duration,
    pub duration_sample_interval: Duration,
}

impl Default for DisplayTimings {
    fn default() -> Self {
        Self {
            success_display: Duration::from_millis(3000),
            error_display: Duration::from_millis(5000),
            duration_sample_interval: Duration::from_millis(100),
        }
    }
}
