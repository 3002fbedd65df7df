// Frame conformance: bring whatever the device delivers to the sample rate
// and channel layout the recognizer expects.

use super::backend::AudioFrame;

/// Mix down and resample a frame to the target format
pub fn conform_frame(
    frame: AudioFrame,
    target_sample_rate: u32,
    target_channels: u16,
) -> AudioFrame {
    let mut processed = frame;

    if processed.channels != target_channels && target_channels == 1 {
        processed = mix_to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = resample(processed, target_sample_rate);
    }

    processed
}

/// Resample by linear interpolation between neighbouring sample frames.
/// Works in both directions and for non-integer ratios such as 44.1k -> 16k.
pub fn resample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || target_rate == 0 || frame.sample_rate == 0 {
        return frame;
    }

    let channels = frame.channels.max(1) as usize;
    let input_frames = frame.samples.len() / channels;
    let ratio = frame.sample_rate as f64 / target_rate as f64;
    let output_frames = (input_frames as f64 / ratio).round() as usize;

    let mut samples = Vec::with_capacity(output_frames * channels);
    for i in 0..output_frames {
        let source_pos = i as f64 * ratio;
        let source_idx = source_pos.floor() as usize;
        let fraction = source_pos - source_idx as f64;

        for ch in 0..channels {
            let left = frame.samples[source_idx * channels + ch] as f64;
            let value = if source_idx + 1 >= input_frames {
                left
            } else {
                let right = frame.samples[(source_idx + 1) * channels + ch] as f64;
                left + (right - left) * fraction
            };
            samples.push(value.round() as i16);
        }
    }

    AudioFrame {
        samples,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Average every interleaved channel into a single mono channel
pub fn mix_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples = frame
        .samples
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}
