use thiserror::Error;

/// Failures of a single capture session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("audio capture is not supported on this platform")]
    Unsupported,

    #[error("no supported audio encoding is available")]
    NoEncoding,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording is in progress")]
    NotRecording,

    #[error("microphone error: {0}")]
    Device(String),

    #[error("failed to encode recording: {0}")]
    Encoding(String),

    #[error("recording is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("no speech detected, please speak closer to the microphone ({size} bytes, minimum {minimum} bytes)")]
    TooQuiet { size: usize, minimum: usize },
}

/// Failures establishing the duplex channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },
}

/// Everything that can put the voice input flow into its `error` state.
///
/// The `Display` text is what the UI shows as `error_message`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceInputError {
    #[error("voice input is not supported here: no microphone capture or audio recorder is available")]
    UnsupportedPlatform,

    #[error("microphone permission was denied")]
    PermissionDenied,

    #[error("not connected to the recognition server, please try again shortly")]
    Connectivity,

    #[error("{0}")]
    Capture(#[from] CaptureError),

    #[error("{0}")]
    Backend(String),
}

impl VoiceInputError {
    /// Whether re-invoking `start_recording` can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_message_is_shown_verbatim() {
        let err = VoiceInputError::Backend("인식 실패".to_string());
        assert_eq!(err.to_string(), "인식 실패");
    }

    #[test]
    fn only_unsupported_platform_is_permanent() {
        assert!(!VoiceInputError::UnsupportedPlatform.is_retryable());
        assert!(VoiceInputError::PermissionDenied.is_retryable());
        assert!(VoiceInputError::Connectivity.is_retryable());
        assert!(VoiceInputError::Capture(CaptureError::NotRecording).is_retryable());
        assert!(VoiceInputError::Backend("x".into()).is_retryable());
    }
}
