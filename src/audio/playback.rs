//! Audio playback to system speakers via cpal.

use super::resample;
use crate::config::AudioConfig;
use crate::error::{AssistantError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Plays mono clips on the configured output device.
#[derive(Debug, Clone)]
pub struct SpeakerOutput {
    config: AudioConfig,
}

impl SpeakerOutput {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Play `samples` and return once the device has drained them.
    ///
    /// Runs on a blocking thread; the async caller suspends until playback
    /// has finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream cannot be created or played.
    pub async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || play_blocking(&config, &samples, sample_rate))
            .await
            .map_err(|e| AssistantError::Audio(format!("playback task failed: {e}")))?
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
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

fn open_output_device(config: &AudioConfig) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(ref name) = config.output_device {
        host.output_devices()
            .map_err(|e| AssistantError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| AssistantError::Audio(format!("output device '{name}' not found")))
    } else {
        host.default_output_device()
            .ok_or_else(|| AssistantError::Audio("no default output device".into()))
    }
}

fn play_blocking(config: &AudioConfig, samples: &[f32], sample_rate: u32) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let device = open_output_device(config)?;
    let default_config = device
        .default_output_config()
        .map_err(|e| AssistantError::Audio(format!("no default output config: {e}")))?;
    let native_rate = default_config.sample_rate();
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples: resample(samples, sample_rate, native_rate),
        position: 0,
        finished: false,
    }));
    let buffer_clone = Arc::clone(&buffer);
    let frame_width = usize::from(channels.max(1));

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut buf = match buffer_clone.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };

                for frame in data.chunks_mut(frame_width) {
                    let value = if buf.position < buf.samples.len() {
                        let v = buf.samples[buf.position];
                        buf.position += 1;
                        v
                    } else {
                        buf.finished = true;
                        0.0
                    };
                    frame.fill(value);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AssistantError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| AssistantError::Audio(format!("failed to start output stream: {e}")))?;
    info!("playing {} samples at {native_rate}Hz", samples.len());

    loop {
        std::thread::sleep(std::time::Duration::from_millis(10));
        let buf = buffer
            .lock()
            .map_err(|e| AssistantError::Audio(format!("playback buffer lock poisoned: {e}")))?;
        if buf.finished {
            break;
        }
    }

    drop(stream);
    Ok(())
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}
