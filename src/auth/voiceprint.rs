//! Simple, model-free voiceprint extraction for best-effort speaker matching.
//!
//! This is not "secure" speaker verification. It's a lightweight heuristic
//! that separates the enrolled owner from other voices without shipping an
//! extra ML model. Expect false positives/negatives in noisy environments.

use super::EmbeddingProbe;
use crate::audio::{MicRecorder, resample};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use rustfft::FftPlanner;
use rustfft::num_complex::Complex32;
use std::time::Duration;
use tracing::debug;

/// Voiceprint feature vector size.
pub const VOICEPRINT_DIMS: usize = 64;

/// Probes quieter than this RMS are treated as "nobody speaking".
const MIN_SPEECH_RMS: f32 = 0.01;

/// Compute a normalized voiceprint feature vector (length [`VOICEPRINT_DIMS`]).
///
/// - Resamples to 16kHz for stable bin mapping.
/// - Computes averaged log-magnitude spectrum in ~300-3400Hz range.
/// - Groups bins into [`VOICEPRINT_DIMS`] buckets and L2-normalizes.
///
/// # Errors
///
/// Returns an error if the clip is empty or shorter than one analysis frame.
pub fn compute_voiceprint(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || sample_rate == 0 {
        return Err(AssistantError::Auth(
            "cannot compute voiceprint from empty audio".into(),
        ));
    }

    let mono = resample(samples, sample_rate, 16_000);

    let frame_len: usize = 400; // 25ms @ 16k
    let hop: usize = 160; // 10ms @ 16k
    let fft_len: usize = 512;
    let nyquist_bins = fft_len / 2;

    let hz_per_bin = 16_000.0f32 / fft_len as f32;
    let min_bin = ((300.0f32 / hz_per_bin).floor() as usize).min(nyquist_bins - 1);
    let max_bin = ((3400.0f32 / hz_per_bin).ceil() as usize).min(nyquist_bins);
    let band_bins = max_bin - min_bin;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);

    let window = hamming_window(frame_len);
    let mut acc = vec![0.0f32; VOICEPRINT_DIMS];
    let mut frames: usize = 0;
    let mut buf = vec![Complex32::new(0.0, 0.0); fft_len];

    let mut pos = 0usize;
    while pos + frame_len <= mono.len() {
        for (i, w) in window.iter().enumerate() {
            buf[i] = Complex32::new(mono[pos + i] * *w, 0.0);
        }
        for c in buf.iter_mut().skip(frame_len) {
            *c = Complex32::new(0.0, 0.0);
        }

        fft.process(&mut buf);

        for (b, acc_b) in acc.iter_mut().enumerate() {
            let start = min_bin + (b * band_bins) / VOICEPRINT_DIMS;
            let end = min_bin + ((b + 1) * band_bins) / VOICEPRINT_DIMS;
            if end <= start {
                continue;
            }
            let sum: f32 = buf[start..end]
                .iter()
                .map(|c| (1.0f32 + c.norm()).ln())
                .sum();
            *acc_b += sum / (end - start) as f32;
        }

        frames = frames.saturating_add(1);
        pos = pos.saturating_add(hop);
    }

    if frames == 0 {
        return Err(AssistantError::Auth(
            "not enough audio to compute voiceprint".into(),
        ));
    }

    for v in &mut acc {
        *v /= frames as f32;
    }
    l2_normalize(&mut acc);
    Ok(acc)
}

fn hamming_window(n: usize) -> Vec<f32> {
    let denom = n.saturating_sub(1).max(1) as f32;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Live probe: records a short clip and turns it into a voiceprint.
pub struct MicVoiceprintProbe {
    recorder: MicRecorder,
    clip: Duration,
}

impl MicVoiceprintProbe {
    pub fn new(recorder: MicRecorder, clip: Duration) -> Self {
        Self { recorder, clip }
    }
}

#[async_trait]
impl EmbeddingProbe for MicVoiceprintProbe {
    async fn probe(&mut self) -> Result<Option<Vec<f32>>> {
        let samples = self.recorder.record(self.clip).await?;
        let level = rms(&samples);
        if level < MIN_SPEECH_RMS {
            debug!("probe too quiet (rms {level:.4}), skipping");
            return Ok(None);
        }
        compute_voiceprint(&samples, self.recorder.sample_rate()).map(Some)
    }
}
