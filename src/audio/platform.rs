use anyhow::Result;
use std::sync::Arc;

use super::backend::{AudioBackend, AudioBackendConfig, AudioSource};
use super::encoding::{AudioEncoder, Encoding, WavEncoder};
use super::file::FileBackend;

/// What the host offers for capturing and encoding audio
pub trait CapturePlatform: Send + Sync {
    /// A media capture device API is present
    fn has_capture_device(&self) -> bool;

    /// An encoding recorder API is present
    fn has_recorder(&self) -> bool;

    /// Encoder for `encoding`, if the host carries one
    fn encoder(&self, encoding: Encoding) -> Option<Arc<dyn AudioEncoder>>;

    /// Open a fresh input stream backend with the given constraints
    fn create_backend(&self, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>>;
}

/// Platform backed by the real host: microphone (when compiled in) or a file
pub struct HostPlatform {
    source: AudioSource,
}

impl HostPlatform {
    pub fn new(source: AudioSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }
}

impl CapturePlatform for HostPlatform {
    fn has_capture_device(&self) -> bool {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    super::microphone::is_available()
                }

                #[cfg(not(feature = "microphone"))]
                {
                    false
                }
            }
            AudioSource::File(path) => path.is_file(),
        }
    }

    fn has_recorder(&self) -> bool {
        true
    }

    fn encoder(&self, encoding: Encoding) -> Option<Arc<dyn AudioEncoder>> {
        match encoding {
            Encoding::Wav => Some(Arc::new(WavEncoder)),
            _ => None,
        }
    }

    fn create_backend(&self, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    let backend = super::microphone::MicrophoneBackend::new(config)?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires the `microphone` feature")
                }
            }

            AudioSource::File(path) => Ok(Box::new(FileBackend::new(path.clone(), config))),
        }
    }
}
