//! Text-to-speech engines.
//!
//! - [`HttpTts`]: OpenAI-compatible `/v1/audio/speech` synthesis played on
//!   the speakers.
//! - [`ConsoleTts`]: prints replies, for text-only sessions.

use crate::audio::{SpeakerOutput, decode_wav};
use crate::config::TtsConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Renders one reply, returning once it has been fully delivered.
#[async_trait]
pub trait TextToSpeech: Send {
    /// # Errors
    ///
    /// Returns an error if synthesis or playback fails.
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// HTTP speech synthesis + speaker playback.
pub struct HttpTts {
    client: reqwest::Client,
    output: SpeakerOutput,
    config: TtsConfig,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

impl HttpTts {
    pub fn new(config: &TtsConfig, output: SpeakerOutput) -> Self {
        Self {
            client: reqwest::Client::new(),
            output,
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.config.api_url.trim_end_matches('/'))
    }

    /// Synthesize `text` into mono samples and their sample rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the audio cannot be decoded.
    pub async fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32)> {
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            speed: self.config.speed,
            response_format: "wav",
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AssistantError::Tts(format!("speech request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Tts(format!("speech API error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| AssistantError::Tts(format!("failed to read speech audio: {e}")))?;
        let (samples, rate) =
            decode_wav(&audio).map_err(|e| AssistantError::Tts(e.to_string()))?;
        debug!("synthesized {} samples at {rate}Hz", samples.len());
        Ok((samples, rate))
    }
}

#[async_trait]
impl TextToSpeech for HttpTts {
    async fn speak(&mut self, text: &str) -> Result<()> {
        let (samples, rate) = self.synthesize(text).await?;
        self.output.play(samples, rate).await
    }
}

/// Prints each reply to stdout as `"{label}: {text}"`.
pub struct ConsoleTts {
    label: String,
}

impl ConsoleTts {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl TextToSpeech for ConsoleTts {
    async fn speak(&mut self, text: &str) -> Result<()> {
        println!("{}: {text}", self.label);
        Ok(())
    }
}
