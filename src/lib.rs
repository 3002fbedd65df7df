pub mod audio;
pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioFile, AudioFrame, AudioSource, CapturePlatform,
    Encoding, FileBackend, HostPlatform,
};
pub use capture::{AudioCaptureSession, CaptureConfig, CaptureResult, CaptureStatus};
pub use channel::{ChannelEvent, ClientMessage, DuplexChannel, EventKind, NatsChannel, Route};
pub use config::Config;
pub use error::{CaptureError, ChannelError, VoiceInputError};
pub use http::{create_router, AppState};
pub use orchestrator::{
    DisplayTimings, RecognizedStations, VoiceInputCallbacks, VoiceInputOrchestrator,
    VoiceInputSnapshot, VoiceInputState,
};
