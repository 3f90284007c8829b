//! Response generation: prompt construction plus the exclusive backend section.

use crate::access::AccessMode;
use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::intent::Intent;
use crate::llm::LanguageModel;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Everything the generator needs for one reply.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub utterance: &'a str,
    pub intent: Intent,
    pub access: AccessMode,
    /// Formatted long-term recall, if the turn asked for it. Ignored for guests.
    pub recall: Option<&'a str>,
    /// Working memory rendered as `Role: content` lines.
    pub working_context: &'a str,
}

/// Drives the language model under a single exclusive section.
///
/// Cloning is cheap and every clone shares the same backend lock, so at most
/// one generation is in flight across all holders.
#[derive(Clone)]
pub struct ResponseGenerator {
    backend: Arc<Mutex<Box<dyn LanguageModel>>>,
    assistant_name: String,
    owner_name: String,
}

impl ResponseGenerator {
    pub fn new(backend: Box<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            assistant_name: config.assistant_name.clone(),
            owner_name: config.owner_name.clone(),
        }
    }

    /// System preamble for `access`.
    ///
    /// The owner template carries the recall block; the guest template never
    /// does, whatever `recall` holds.
    pub fn system_prompt(
        &self,
        access: AccessMode,
        working_context: &str,
        recall: Option<&str>,
    ) -> String {
        match access {
            AccessMode::Owner => format!(
                "You are {name}, a private AI assistant created by {owner}.\n\
                 Status: OWNER VERIFIED.\n\
                 Permissions: Full conversational access. Personal memory allowed.\n\
                 Tone: Professional, loyal, intelligent.\n\
                 \n\
                 Recent Conversation (Working Memory):\n\
                 {working_context}\n\
                 \n\
                 Long-Term Memory (Important Facts Only):\n\
                 {memories}\n",
                name = self.assistant_name,
                owner = self.owner_name,
                memories = recall.unwrap_or_default(),
            ),
            AccessMode::Guest => format!(
                "You are {name} operating in GUEST MODE.\n\
                 Permissions: Restricted.\n\
                 \n\
                 Rules:\n\
                 - Do NOT reveal personal memories\n\
                 - Do NOT confirm private details\n\
                 - Politely refuse restricted actions\n\
                 \n\
                 Recent Conversation (Working Memory):\n\
                 {working_context}\n",
                name = self.assistant_name,
            ),
        }
    }

    /// Per-turn user prompt.
    pub fn user_prompt(intent: Intent, utterance: &str) -> String {
        format!(
            "Intent Label: {intent}\n\
             User Message: {utterance}\n\
             \n\
             Respond naturally, maintaining conversational continuity.\n"
        )
    }

    /// Generate one reply.
    ///
    /// Holds the backend lock from request start until the stream is fully
    /// drained. Callers queue behind any generation already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Llm`] if the backend fails or produces no text.
    pub async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let system = self.system_prompt(request.access, request.working_context, request.recall);
        let prompt = Self::user_prompt(request.intent, request.utterance);

        let mut backend = self.backend.lock().await;
        let started = Instant::now();
        debug!("generation started ({} mode)", request.access);

        let mut stream = backend.generate(&system, &prompt).await?;
        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment?);
        }
        drop(stream);
        drop(backend);

        let reply = reply.trim().to_owned();
        if reply.is_empty() {
            return Err(AssistantError::Llm("model returned an empty reply".into()));
        }
        info!(
            "generated {} chars in {:.2}s",
            reply.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(reply)
    }
}
