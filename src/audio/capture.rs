//! Fixed-length microphone recording using cpal.
//!
//! Records at the device's native sample rate and downsamples to the
//! configured input rate (16kHz mono by default) for transcription and
//! voiceprints.

use super::{resample, to_mono};
use crate::config::AudioConfig;
use crate::error::{AssistantError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Records fixed-length clips from the system microphone.
///
/// The cpal device and stream are created per recording on a blocking
/// thread, so the recorder itself is cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct MicRecorder {
    config: AudioConfig,
}

impl MicRecorder {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Target sample rate of returned clips.
    pub fn sample_rate(&self) -> u32 {
        self.config.input_sample_rate
    }

    /// Record `duration` of mono audio without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the input device cannot be opened or read.
    pub async fn record(&self, duration: Duration) -> Result<Vec<f32>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || record_blocking(&config, duration))
            .await
            .map_err(|e| AssistantError::Audio(format!("recording task failed: {e}")))?
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AssistantError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

fn open_input_device(config: &AudioConfig) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(ref name) = config.input_device {
        host.input_devices()
            .map_err(|e| AssistantError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| AssistantError::Audio(format!("input device '{name}' not found")))
    } else {
        host.default_input_device()
            .ok_or_else(|| AssistantError::Audio("no default input device".into()))
    }
}

fn record_blocking(config: &AudioConfig, duration: Duration) -> Result<Vec<f32>> {
    let device = open_input_device(config)?;
    let default_config = device
        .default_input_config()
        .map_err(|e| AssistantError::Audio(format!("no default input config: {e}")))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let captured = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = Arc::clone(&captured);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = sink.lock() {
                    buf.extend_from_slice(data);
                }
            },
            move |err| {
                error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| AssistantError::Audio(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| AssistantError::Audio(format!("failed to start input stream: {e}")))?;
    debug!("recording {:.1}s at {native_rate}Hz", duration.as_secs_f32());

    std::thread::sleep(duration);
    drop(stream);

    let raw = captured
        .lock()
        .map_err(|e| AssistantError::Audio(format!("capture buffer lock poisoned: {e}")))?
        .clone();

    let mono = if native_channels > 1 {
        to_mono(&raw, native_channels)
    } else {
        raw
    };
    let samples = resample(&mono, native_rate, config.input_sample_rate);
    info!(
        "recorded {} samples ({}Hz -> {}Hz)",
        samples.len(),
        native_rate,
        config.input_sample_rate
    );
    Ok(samples)
}
