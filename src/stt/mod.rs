//! Speech-to-text engines.
//!
//! - [`HttpStt`]: records from the microphone and posts the clip to an
//!   OpenAI-compatible `/v1/audio/transcriptions` endpoint.
//! - [`ConsoleStt`]: reads typed lines, for text-only sessions and tests.

use crate::audio::{MicRecorder, samples_to_wav};
use crate::config::SttConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io::Write as _;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

/// Produces one utterance per call.
#[async_trait]
pub trait SpeechToText: Send {
    /// Listen for roughly `duration` and return what was said.
    ///
    /// Silence or unintelligible audio yields an empty or whitespace string,
    /// which is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if recording or transcription fails.
    async fn transcribe(&mut self, duration: Duration) -> Result<String>;
}

/// Microphone + HTTP transcription service.
pub struct HttpStt {
    client: reqwest::Client,
    recorder: MicRecorder,
    config: SttConfig,
}

impl HttpStt {
    pub fn new(config: &SttConfig, recorder: MicRecorder) -> Self {
        Self {
            client: reqwest::Client::new(),
            recorder,
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/audio/transcriptions",
            self.config.api_url.trim_end_matches('/')
        )
    }

    /// Transcribe an already-recorded clip.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn transcribe_samples(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        let wav = samples_to_wav(samples, sample_rate)?;
        let part = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AssistantError::Stt(format!("invalid MIME type: {e}")))?;

        let mut form = Form::new()
            .text("model", self.config.model.clone())
            .part("file", part);
        if let Some(ref lang) = self.config.language {
            form = form.text("language", lang.clone());
        }

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AssistantError::Stt(format!("transcription request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Stt(format!(
                "transcription API error: {status} - {body}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Stt(format!("failed to parse transcription: {e}")))?;
        let text = result.text.trim().to_owned();
        debug!("transcribed: {text:?}");
        Ok(text)
    }
}

#[async_trait]
impl SpeechToText for HttpStt {
    async fn transcribe(&mut self, duration: Duration) -> Result<String> {
        let samples = self.recorder.record(duration).await?;
        self.transcribe_samples(&samples, self.recorder.sample_rate())
            .await
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Typed input, one line per utterance.
///
/// End of input is reported as `eof_phrase` so a closed stdin ends the
/// session the same way saying an exit phrase would.
pub struct ConsoleStt<R> {
    lines: Lines<R>,
    prompt: Option<String>,
    eof_phrase: String,
}

impl ConsoleStt<BufReader<Stdin>> {
    /// Read from the process's stdin, printing `prompt` before each line.
    pub fn stdin(prompt: impl Into<String>, eof_phrase: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            prompt: Some(prompt.into()),
            eof_phrase: eof_phrase.into(),
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleStt<R> {
    pub fn new(reader: R, eof_phrase: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            prompt: None,
            eof_phrase: eof_phrase.into(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> SpeechToText for ConsoleStt<R> {
    async fn transcribe(&mut self, _duration: Duration) -> Result<String> {
        if let Some(ref prompt) = self.prompt {
            let mut out = std::io::stdout();
            let _ = write!(out, "{prompt}");
            let _ = out.flush();
        }
        match self.lines.next_line().await? {
            Some(line) => Ok(line),
            None => Ok(self.eof_phrase.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_reads_one_line_per_call() {
        let input: &[u8] = b"hello there\n\nremember my exam\n";
        let mut stt = ConsoleStt::new(input, "exit");
        let d = Duration::from_secs(4);
        assert_eq!(stt.transcribe(d).await.unwrap(), "hello there");
        assert_eq!(stt.transcribe(d).await.unwrap(), "");
        assert_eq!(stt.transcribe(d).await.unwrap(), "remember my exam");
    }

    #[tokio::test]
    async fn console_eof_reads_as_exit_phrase() {
        let input: &[u8] = b"";
        let mut stt = ConsoleStt::new(input, "goodbye");
        assert_eq!(
            stt.transcribe(Duration::from_secs(1)).await.unwrap(),
            "goodbye"
        );
    }

    #[test]
    fn endpoint_joins_base_url() {
        let config = SttConfig {
            api_url: "http://127.0.0.1:9000/".to_owned(),
            ..SttConfig::default()
        };
        let stt = HttpStt::new(&config, MicRecorder::new(&Default::default()));
        assert_eq!(stt.endpoint(), "http://127.0.0.1:9000/v1/audio/transcriptions");
    }
}
