use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::AudioSource;
use crate::capture::CaptureConfig;
use crate::channel::nats::Subjects;
use crate::orchestrator::DisplayTimings;

/// Default config file, resolved relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/station-voice";

/// Environment overrides look like `STATION_VOICE_CHANNEL__NATS_URL`
const ENV_PREFIX: &str = "STATION_VOICE";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ChannelConfig {
    pub nats_url: String,
    /// Empty means an anonymous `user-<uuid>` identity per process
    pub user_id: String,
    pub input_subject_prefix: String,
    pub event_subject_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    pub success_display_ms: u64,
    pub error_display_ms: u64,
    pub duration_sample_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceKind {
    Microphone,
    File,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub source: AudioSourceKind,
    /// Audio replayed in place of the microphone when `source = "file"`
    pub file_path: String,
}

impl Config {
    /// Built-in defaults, then `<path>.toml` if present, then the environment
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "station-voice")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8088_i64)?
            .set_default("channel.nats_url", "nats://localhost:4222")?
            .set_default("channel.user_id", "")?
            .set_default("channel.input_subject_prefix", "voice.input")?
            .set_default("channel.event_subject_prefix", "voice.events")?
            .set_default("display.success_display_ms", 3000_i64)?
            .set_default("display.error_display_ms", 5000_i64)?
            .set_default("display.duration_sample_interval_ms", 100_i64)?
            .set_default("audio.source", "microphone")?
            .set_default("audio.file_path", "")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Configured identity, or a fresh anonymous one
    pub fn user_id(&self) -> String {
        let configured = self.channel.user_id.trim();
        if configured.is_empty() {
            format!("user-{}", uuid::Uuid::new_v4())
        } else {
            configured.to_string()
        }
    }

    pub fn subjects(&self) -> Subjects {
        Subjects {
            input_prefix: self.channel.input_subject_prefix.clone(),
            event_prefix: self.channel.event_subject_prefix.clone(),
        }
    }

    pub fn audio_source(&self) -> Result<AudioSource> {
        match self.audio.source {
            AudioSourceKind::Microphone => Ok(AudioSource::Microphone),
            AudioSourceKind::File => {
                anyhow::ensure!(
                    !self.audio.file_path.is_empty(),
                    "audio.file_path is required when audio.source = \"file\""
                );
                Ok(AudioSource::File(PathBuf::from(&self.audio.file_path)))
            }
        }
    }

    pub fn timings(&self) -> DisplayTimings {
        DisplayTimings {
            success_display: Duration::from_millis(self.display.success_display_ms),
            error_display: Duration::from_millis(self.display.error_display_ms),
            duration_sample_interval: Duration::from_millis(
                self.display.duration_sample_interval_ms.max(1),
            ),
        }
    }
}
