//! Microphone recording, speaker playback, and WAV encoding via cpal/hound.

pub mod capture;
pub mod playback;

pub use capture::MicRecorder;
pub use playback::SpeakerOutput;

use crate::error::{AssistantError, Result};

/// Encode mono f32 samples as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns an error if the WAV writer fails.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AssistantError::Audio(e.to_string()))?;
        for &sample in samples {
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| AssistantError::Audio(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AssistantError::Audio(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Decode a WAV file into mono f32 samples and its sample rate.
///
/// # Errors
///
/// Returns an error if the bytes are not a readable WAV file.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| AssistantError::Audio(format!("invalid WAV: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| AssistantError::Audio(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| AssistantError::Audio(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    let mono = if spec.channels > 1 {
        to_mono(&interleaved, spec.channels)
    } else {
        interleaved
    };
    Ok((mono, spec.sample_rate))
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub(crate) fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels.max(1));
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, adequate for speech in either direction.
pub(crate) fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };
        output.push(sample as f32);
    }

    output
}
