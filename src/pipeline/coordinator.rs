//! Pipeline coordinator: wires Capture → Think → Speak.
//!
//! Each stage is one long-lived task. Capture feeds utterances to Think over
//! an unbounded channel, Think feeds replies to Speak over another, and Speak
//! raises the shared [`MuteFlag`] while it renders so Capture never hears the
//! assistant. An exit phrase travels through the channels as
//! [`PipelineMessage::EndOfSession`] and winds every stage down in order; the
//! cancellation token stops all of them at their next suspension point.

use crate::access::AccessMode;
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::generator::{GenerationRequest, ResponseGenerator};
use crate::intent::{Intent, IntentClassifier};
use crate::memory::{MemoryStore, MemoryStoreError, Role, StoreOutcome, WorkingMemory};
use crate::pipeline::messages::{PipelineMessage, Reply};
use crate::pipeline::mute::MuteFlag;
use crate::runtime::{RuntimeEvent, Stage};
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause before Capture retries after a failed transcription.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// The external collaborators a session runs against.
pub struct Collaborators {
    pub stt: Box<dyn SpeechToText>,
    pub tts: Box<dyn TextToSpeech>,
    pub classifier: Box<dyn IntentClassifier>,
    pub store: Arc<MemoryStore>,
    pub generator: ResponseGenerator,
}

/// Orchestrates the three conversation stages for one session.
pub struct PipelineCoordinator {
    config: AssistantConfig,
    access: AccessMode,
    collaborators: Collaborators,
    mute: MuteFlag,
    cancel: CancellationToken,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl PipelineCoordinator {
    /// Create a coordinator for a session already authenticated as `access`.
    pub fn new(config: AssistantConfig, access: AccessMode, collaborators: Collaborators) -> Self {
        Self {
            config,
            access,
            collaborators,
            mute: MuteFlag::new(),
            cancel: CancellationToken::new(),
            runtime_tx: None,
        }
    }

    /// Attach a runtime event broadcaster for observers.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Use an externally owned cancellation token (e.g. one cancelled by Ctrl+C).
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Signal all stages to stop at their next suspension point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Get a clone of the cancellation token for external use.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Access mode the session runs under.
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// The shared mute flag (read-only use outside Speak).
    pub fn mute_flag(&self) -> MuteFlag {
        self.mute.clone()
    }

    /// Run all three stages until the session ends or is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if the listen duration is not a valid
    /// duration, and a pipeline error if a stage task panics. Collaborator
    /// failures are absorbed inside the stages.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            access,
            collaborators,
            mute,
            cancel,
            runtime_tx,
        } = self;
        let Collaborators {
            stt,
            tts,
            classifier,
            store,
            generator,
        } = collaborators;

        let listen = Duration::try_from_secs_f32(config.session.listen_duration_secs)
            .map_err(|e| {
                AssistantError::Config(format!("session.listen_duration_secs: {e}"))
            })?;

        info!("starting conversation pipeline ({access} mode)");
        emit(&runtime_tx, RuntimeEvent::SessionStarted { access });

        let (utterance_tx, utterance_rx) = mpsc::unbounded_channel::<PipelineMessage>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Reply>();

        let capture_handle = {
            let stage = CaptureStage {
                stt,
                listen,
                exit_phrases: normalize_exit_phrases(&config.session.exit_phrases),
                mute: mute.clone(),
                tx: utterance_tx,
                runtime_tx: runtime_tx.clone(),
            };
            let cancel = cancel.clone();
            tokio::spawn(async move { stage.run(cancel).await })
        };

        let think_handle = {
            let stage = ThinkStage {
                access,
                classifier,
                store,
                generator,
                working: WorkingMemory::new(config.session.max_turns),
                recall_limit: config.memory.recall_limit,
                farewell: config.session.farewell.clone(),
                fallback_reply: config.session.fallback_reply.clone(),
                tx: reply_tx,
                runtime_tx: runtime_tx.clone(),
            };
            let cancel = cancel.clone();
            tokio::spawn(async move { stage.run(utterance_rx, cancel).await })
        };

        let speak_handle = {
            let stage = SpeakStage {
                tts,
                greeting: config.session.greeting.clone(),
                mute,
                runtime_tx: runtime_tx.clone(),
            };
            let cancel = cancel.clone();
            tokio::spawn(async move { stage.run(reply_rx, cancel).await })
        };

        let (capture, think, speak) = tokio::join!(capture_handle, think_handle, speak_handle);
        emit(&runtime_tx, RuntimeEvent::SessionEnded);

        let mut failure = None;
        for (stage, joined) in [
            (Stage::Capture, capture),
            (Stage::Think, think),
            (Stage::Speak, speak),
        ] {
            if let Err(e) = joined {
                error!("{stage} stage terminated abnormally: {e}");
                failure.get_or_insert(AssistantError::Pipeline(format!(
                    "{stage} stage panicked: {e}"
                )));
            }
        }
        info!("conversation pipeline stopped");
        failure.map_or(Ok(()), Err)
    }
}

fn emit(runtime_tx: &Option<broadcast::Sender<RuntimeEvent>>, event: RuntimeEvent) {
    if let Some(rt) = runtime_tx {
        let _ = rt.send(event);
    }
}

fn normalize_exit_phrases(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Case-insensitive substring match against the exit vocabulary.
pub(crate) fn is_exit_phrase(text: &str, exit_phrases: &[String]) -> bool {
    let lower = text.to_lowercase();
    exit_phrases.iter().any(|p| lower.contains(p.as_str()))
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

struct CaptureStage {
    stt: Box<dyn SpeechToText>,
    listen: Duration,
    exit_phrases: Vec<String>,
    mute: MuteFlag,
    tx: mpsc::UnboundedSender<PipelineMessage>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl CaptureStage {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.mute.wait_clear() => {}
            }

            let window = self.mute.window();
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                r = self.stt.transcribe(self.listen) => r,
            };

            match result {
                Ok(text) => {
                    // Playback touched this window: the clip may hold our own voice.
                    if window.overlapped_playback() {
                        debug!("discarding capture that overlapped playback");
                        continue;
                    }
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if is_exit_phrase(text, &self.exit_phrases) {
                        info!("exit phrase heard: {text:?}");
                        let _ = self.tx.send(PipelineMessage::EndOfSession);
                        break;
                    }
                    debug!("utterance: {text:?}");
                    emit(&self.runtime_tx, RuntimeEvent::Utterance(text.to_owned()));
                    if self.tx.send(PipelineMessage::Utterance(text.to_owned())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("capture failed: {e}");
                    emit(
                        &self.runtime_tx,
                        RuntimeEvent::StageFailure {
                            stage: Stage::Capture,
                            error: e.to_string(),
                        },
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(CAPTURE_RETRY_DELAY) => {}
                    }
                }
            }
        }
        debug!("capture stage stopped");
    }
}

// ---------------------------------------------------------------------------
// Think
// ---------------------------------------------------------------------------

struct ThinkStage {
    access: AccessMode,
    classifier: Box<dyn IntentClassifier>,
    store: Arc<MemoryStore>,
    generator: ResponseGenerator,
    working: WorkingMemory,
    recall_limit: usize,
    farewell: String,
    fallback_reply: String,
    tx: mpsc::UnboundedSender<Reply>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl ThinkStage {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<PipelineMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            let msg = tokio::select! {
                () = cancel.cancelled() => break,
                m = rx.recv() => m,
            };

            match msg {
                None => break,
                Some(PipelineMessage::EndOfSession) => {
                    self.push(Reply::farewell(self.farewell.clone()));
                    break;
                }
                Some(PipelineMessage::Utterance(text)) => {
                    let outcome = tokio::select! {
                        () = cancel.cancelled() => break,
                        r = self.respond(&text) => r,
                    };
                    let reply = match outcome {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!("turn failed: {e}");
                            emit(
                                &self.runtime_tx,
                                RuntimeEvent::StageFailure {
                                    stage: Stage::Think,
                                    error: e.to_string(),
                                },
                            );
                            self.fallback_reply.clone()
                        }
                    };
                    self.working.add(Role::Assistant, reply.clone());
                    if !self.push(Reply::new(reply)) {
                        break;
                    }
                }
            }
        }
        debug!("think stage stopped");
    }

    /// Produce the reply text for one utterance.
    async fn respond(&mut self, text: &str) -> Result<String> {
        self.working.add(Role::User, text);

        let intent = self.classifier.classify(text)?;
        debug!("intent: {intent}");
        emit(&self.runtime_tx, RuntimeEvent::IntentClassified(intent));

        let recall = match intent {
            Intent::MemoryStore => {
                let (store, access, content) =
                    (Arc::clone(&self.store), self.access, text.to_owned());
                let outcome = run_blocking(move || store.store(&content, access)).await?;
                if let StoreOutcome::Stored { id, .. } = outcome {
                    emit(&self.runtime_tx, RuntimeEvent::MemoryStored { id });
                }
                return Ok(outcome.message());
            }
            Intent::MemoryRecall => {
                let (store, access, limit) =
                    (Arc::clone(&self.store), self.access, self.recall_limit);
                Some(run_blocking(move || store.recall(access, limit)).await?.message())
            }
            _ => None,
        };

        let working_context = self.working.context();
        self.generator
            .generate(&GenerationRequest {
                utterance: text,
                intent,
                access: self.access,
                recall: recall.as_deref(),
                working_context: &working_context,
            })
            .await
    }

    /// Returns `false` once Speak has gone away.
    fn push(&self, reply: Reply) -> bool {
        emit(
            &self.runtime_tx,
            RuntimeEvent::Reply {
                text: reply.text.clone(),
                is_final: reply.is_final,
            },
        );
        self.tx.send(reply).is_ok()
    }
}

/// Run a SQLite call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, MemoryStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AssistantError::Memory(format!("memory task failed: {e}")))?
        .map_err(AssistantError::from)
}

// ---------------------------------------------------------------------------
// Speak
// ---------------------------------------------------------------------------

struct SpeakStage {
    tts: Box<dyn TextToSpeech>,
    greeting: String,
    mute: MuteFlag,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl SpeakStage {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Reply>, cancel: CancellationToken) {
        if !self.greeting.trim().is_empty() {
            let greeting = self.greeting.clone();
            if !self.render(&greeting, &cancel).await {
                return;
            }
        }

        loop {
            let reply = tokio::select! {
                () = cancel.cancelled() => break,
                r = rx.recv() => r,
            };
            let Some(reply) = reply else { break };

            if !self.render(&reply.text, &cancel).await {
                break;
            }
            if reply.is_final {
                break;
            }
        }
        debug!("speak stage stopped");
    }

    /// Speak one reply with the mute flag raised. Returns `false` if cancelled.
    async fn render(&mut self, text: &str, cancel: &CancellationToken) -> bool {
        let guard = self.mute.hold();
        emit(&self.runtime_tx, RuntimeEvent::Muted { active: true });

        let result = tokio::select! {
            () = cancel.cancelled() => None,
            r = self.tts.speak(text) => Some(r),
        };

        drop(guard);
        emit(&self.runtime_tx, RuntimeEvent::Muted { active: false });

        match result {
            None => false,
            Some(Ok(())) => true,
            Some(Err(e)) => {
                warn!("speech output failed: {e}");
                emit(
                    &self.runtime_tx,
                    RuntimeEvent::StageFailure {
                        stage: Stage::Speak,
                        error: e.to_string(),
                    },
                );
                true
            }
        }
    }
}
