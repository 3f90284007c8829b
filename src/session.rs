//! Session start-up: validate, authenticate once, open memory, assemble the pipeline.
//!
//! Everything that can fail here is a configuration failure and aborts the
//! session before any stage starts.

use crate::access::AccessMode;
use crate::auth::Authenticator;
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::generator::ResponseGenerator;
use crate::intent::IntentClassifier;
use crate::llm::LanguageModel;
use crate::memory::{MemoryStore, RecallOutcome};
use crate::pipeline::{Collaborators, PipelineCoordinator};
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Engines a session needs besides the authenticator.
pub struct Engines {
    pub stt: Box<dyn SpeechToText>,
    pub tts: Box<dyn TextToSpeech>,
    pub classifier: Box<dyn IntentClassifier>,
    pub llm: Box<dyn LanguageModel>,
}

/// Ask `authenticator` for the session's access mode, using the configured
/// timeout and threshold.
///
/// # Errors
///
/// Propagates authenticator configuration failures.
pub async fn authenticate(
    config: &AssistantConfig,
    authenticator: &mut dyn Authenticator,
) -> Result<AccessMode> {
    let access = authenticator
        .authenticate(
            Duration::from_secs(config.auth.timeout_secs),
            config.auth.match_threshold,
        )
        .await?;
    info!("access mode: {access}");
    Ok(access)
}

/// Open the long-term store described by `config`.
///
/// # Errors
///
/// Returns [`AssistantError::Config`] if the database cannot be opened.
pub fn open_store(config: &AssistantConfig) -> Result<Arc<MemoryStore>> {
    MemoryStore::from_config(&config.memory)
        .map(Arc::new)
        .map_err(|e| {
            AssistantError::Config(format!(
                "cannot open memory store at {}: {e}",
                config.memory.db_path.display()
            ))
        })
}

/// Validate `config`, authenticate, open memory, and build the coordinator.
///
/// The returned coordinator has not started; attach events or a
/// cancellation token and call [`PipelineCoordinator::run`].
///
/// # Errors
///
/// Returns a configuration-class error if any start-up step fails.
pub async fn start(
    config: AssistantConfig,
    authenticator: &mut dyn Authenticator,
    engines: Engines,
) -> Result<PipelineCoordinator> {
    config.validate()?;
    let access = authenticate(&config, authenticator).await?;
    let store = open_store(&config)?;
    let generator = ResponseGenerator::new(engines.llm, &config.llm);

    let collaborators = Collaborators {
        stt: engines.stt,
        tts: engines.tts,
        classifier: engines.classifier,
        store,
        generator,
    };
    Ok(PipelineCoordinator::new(config, access, collaborators))
}

/// One-shot recall outside a conversation (`friday memory recall`).
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub async fn recall(
    config: &AssistantConfig,
    authenticator: &mut dyn Authenticator,
    limit: usize,
) -> Result<RecallOutcome> {
    config.validate()?;
    let access = authenticate(config, authenticator).await?;
    let store = open_store(config)?;
    Ok(store.recall(access, limit)?)
}
