//! Ollama `/api/generate` backend.
//!
//! Streams newline-delimited JSON objects of the form
//! `{"response": "...", "done": false}` and yields the visible text.

use super::{LanguageModel, ThinkTagStripper, TokenStream};
use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// Client for a local Ollama server.
pub struct OllamaClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaClient {
    /// Build a client for the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Llm(format!("failed to build HTTP client: {e}")))?;
        info!("Ollama backend configured: {} model={}", config.api_url, config.model);
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.api_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, system: &'a str, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.config.model,
            system,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_gpu: self.config.num_gpu,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&mut self, system: &str, prompt: &str) -> Result<TokenStream> {
        let body = self.build_request(system, prompt);
        debug!("Ollama request to {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::Llm(format!(
                "Ollama HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body_text)
            )));
        }

        Ok(Box::pin(create_token_stream(response.bytes_stream())))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<u32>,
}

/// One NDJSON line of a streamed generate response.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Extract an error message from an Ollama error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

struct StreamState {
    byte_stream: std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    line_buf: Vec<u8>,
    pending: VecDeque<Result<String>>,
    stripper: ThinkTagStripper,
    finished: bool,
}

impl StreamState {
    /// Parse every complete line in the buffer into pending fragments.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.line_buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            self.parse_line(&line);
            if self.finished {
                self.line_buf.clear();
                return;
            }
        }
    }

    fn parse_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        match serde_json::from_str::<GenerateChunk>(text) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    self.pending
                        .push_back(Err(AssistantError::Llm(format!("Ollama error: {error}"))));
                    self.finished = true;
                    return;
                }
                let visible = self.stripper.push(&chunk.response);
                if !visible.is_empty() {
                    self.pending.push_back(Ok(visible));
                }
                if chunk.done {
                    self.finish();
                }
            }
            Err(e) => {
                self.pending.push_back(Err(AssistantError::Llm(format!(
                    "malformed Ollama stream line: {e}"
                ))));
                self.finished = true;
            }
        }
    }

    fn finish(&mut self) {
        let tail = self.stripper.finish();
        if !tail.is_empty() {
            self.pending.push_back(Ok(tail));
        }
        self.finished = true;
    }
}

/// Turn a raw byte stream into a stream of visible text fragments.
fn create_token_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        StreamState {
            byte_stream: Box::pin(byte_stream),
            line_buf: Vec::new(),
            pending: VecDeque::new(),
            stripper: ThinkTagStripper::default(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.line_buf.extend_from_slice(&chunk);
                        state.drain_lines();
                    }
                    Some(Err(e)) => {
                        state.pending.push_back(Err(AssistantError::Llm(format!(
                            "Ollama stream read error: {e}"
                        ))));
                        state.finished = true;
                    }
                    None => {
                        // Server closed without `done`; flush whatever is buffered.
                        if !state.line_buf.is_empty() {
                            let rest = std::mem::take(&mut state.line_buf);
                            state.parse_line(&rest);
                        }
                        if !state.finished {
                            state.finish();
                        }
                    }
                }
            }
        },
    )
}
