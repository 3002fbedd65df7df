use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::Encoding;

/// The encoded outcome of one successful capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Base64-encoded container bytes
    pub payload: String,

    /// Container family (`webm`, `ogg`, `mp4`, `wav`)
    pub mime_type_family: String,

    pub sample_rate_hz: u32,

    pub encoding: Encoding,

    /// Size of the encoded container before base64
    pub size_bytes: usize,

    /// Recorded audio length
    pub duration_ms: u64,

    /// When the session was finalized
    pub captured_at: DateTime<Utc>,
}

impl CaptureResult {
    /// Decode the payload back into container bytes
    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.payload)
    }
}
