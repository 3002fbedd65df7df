pub mod backend;
pub mod convert;
pub mod encoding;
pub mod file;
pub mod platform;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioFrame, AudioSource, CHUNK_INTERVAL_MS};
pub use convert::conform_frame;
pub use encoding::{AudioEncoder, Encoding, WavEncoder};
pub use file::{AudioFile, FileBackend};
pub use platform::{CapturePlatform, HostPlatform};
