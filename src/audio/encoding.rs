use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Container/codec pairs a recorder may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    WebmOpus,
    Webm,
    OggOpus,
    Mp4,
    Wav,
}

impl Encoding {
    /// Probe order, best first
    pub const PREFERENCE: [Encoding; 5] = [
        Encoding::WebmOpus,
        Encoding::Webm,
        Encoding::OggOpus,
        Encoding::Mp4,
        Encoding::Wav,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            Encoding::WebmOpus => "audio/webm;codecs=opus",
            Encoding::Webm => "audio/webm",
            Encoding::OggOpus => "audio/ogg;codecs=opus",
            Encoding::Mp4 => "audio/mp4",
            Encoding::Wav => "audio/wav",
        }
    }

    /// Container family sent as `format` on the wire
    pub fn family(self) -> &'static str {
        match self {
            Encoding::WebmOpus | Encoding::Webm => "webm",
            Encoding::OggOpus => "ogg",
            Encoding::Mp4 => "mp4",
            Encoding::Wav => "wav",
        }
    }

    /// First encoding in preference order accepted by `supported`
    pub fn select(supported: impl Fn(Encoding) -> bool) -> Option<Encoding> {
        Self::PREFERENCE.into_iter().find(|encoding| supported(*encoding))
    }
}

/// Turns buffered PCM into an encoded container
pub trait AudioEncoder: Send + Sync {
    fn encoding(&self) -> Encoding;

    fn encode(&self, samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>>;
}

/// 16-bit PCM WAV, always available
#[derive(Debug, Default, Clone, Copy)]
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn encoding(&self) -> Encoding {
        Encoding::Wav
    }

    fn encode(&self, samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to create WAV writer")?;
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV data")?;
        }

        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_follows_preference_order() {
        assert_eq!(Encoding::select(|_| true), Some(Encoding::WebmOpus));
        assert_eq!(
            Encoding::select(|e| matches!(e, Encoding::Mp4 | Encoding::OggOpus)),
            Some(Encoding::OggOpus)
        );
        assert_eq!(Encoding::select(|e| e == Encoding::Wav), Some(Encoding::Wav));
        assert_eq!(Encoding::select(|_| false), None);
    }

    #[test]
    fn test_family_names() {
        assert_eq!(Encoding::WebmOpus.family(), "webm");
        assert_eq!(Encoding::Webm.family(), "webm");
        assert_eq!(Encoding::OggOpus.family(), "ogg");
        assert_eq!(Encoding::Mp4.family(), "mp4");
        assert_eq!(Encoding::Wav.family(), "wav");
    }

    #[test]
    fn test_wav_encoder_output_is_readable() {
        let samples: Vec<i16> = (0..1600).map(|i| (i % 200) as i16 * 50).collect();
        let bytes = WavEncoder.encode(&samples, 16000, 1).unwrap();

        assert_eq!(bytes.len(), 44 + samples.len() * 2);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_wav_encoder_empty_input_is_header_only() {
        let bytes = WavEncoder.encode(&[], 16000, 1).unwrap();
        assert_eq!(bytes.len(), 44);
    }
}
