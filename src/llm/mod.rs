//! Language model backends.
//!
//! The generator only sees [`LanguageModel`]; the default backend is a local
//! Ollama server ([`OllamaClient`]).

pub mod ollama;

pub use ollama::OllamaClient;

use crate::error::Result;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

/// Incremental text fragments of one completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A text-generation backend.
///
/// Implementations are not required to tolerate concurrent calls; the
/// response generator serialises access.
#[async_trait]
pub trait LanguageModel: Send {
    /// Start a completion for `prompt` under `system` and stream its text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Failures after the
    /// first fragment arrive as `Err` items on the stream.
    async fn generate(&mut self, system: &str, prompt: &str) -> Result<TokenStream>;
}

/// Incrementally strips `<think>...</think>` blocks across streaming chunks.
///
/// Reasoning models served through Ollama emit these inline; they must never
/// reach the speaker.
#[derive(Debug, Default)]
pub(crate) struct ThinkTagStripper {
    in_think_block: bool,
    carry: String,
}

impl ThinkTagStripper {
    const OPEN: &'static str = "<think>";
    const CLOSE: &'static str = "</think>";

    /// Feed one fragment and return newly-visible text (outside think blocks).
    pub(crate) fn push(&mut self, fragment: &str) -> String {
        if fragment.is_empty() {
            return String::new();
        }
        self.carry.push_str(fragment);

        let mut visible = String::new();
        loop {
            if self.in_think_block {
                if let Some(end) = self.carry.find(Self::CLOSE) {
                    self.carry.drain(..end + Self::CLOSE.len());
                    self.in_think_block = false;
                    continue;
                }
                // Keep just enough to spot `</think>` split across chunks.
                let keep = Self::CLOSE.len().saturating_sub(1);
                let cut = floor_char_boundary(&self.carry, self.carry.len().saturating_sub(keep));
                self.carry.drain(..cut);
                break;
            }

            if let Some(start) = self.carry.find(Self::OPEN) {
                visible.push_str(&self.carry[..start]);
                self.carry.drain(..start + Self::OPEN.len());
                self.in_think_block = true;
                continue;
            }

            let keep = Self::OPEN.len().max(Self::CLOSE.len()).saturating_sub(1);
            let emit = floor_char_boundary(&self.carry, self.carry.len().saturating_sub(keep));
            visible.push_str(&self.carry[..emit]);
            self.carry.drain(..emit);
            break;
        }

        visible
    }

    /// Flush any remaining visible tail.
    pub(crate) fn finish(&mut self) -> String {
        if self.in_think_block {
            self.carry.clear();
            return String::new();
        }
        std::mem::take(&mut self.carry)
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
