use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and format for one capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Hard ceiling on recording length; the session finalizes itself when reached
    /// Default: 10 seconds
    pub max_duration_ms: u64,

    /// Largest encoded payload accepted
    /// Default: 10 MiB
    pub max_file_size_bytes: usize,

    /// Encoded payloads below this size are treated as silence
    /// Default: 1 KiB
    pub min_file_size_bytes: usize,

    /// Sample rate for the recognizer (16kHz)
    pub sample_rate_hz: u32,

    /// Number of audio channels (always mono)
    pub channel_count: u16,
}

impl CaptureConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 10_000,
            max_file_size_bytes: 10 * 1024 * 1024,
            min_file_size_bytes: 1024,
            sample_rate_hz: 16000,
            channel_count: 1,
        }
    }
}
