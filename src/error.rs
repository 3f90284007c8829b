//! Error types for the friday assistant.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model inference error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Intent classification error.
    #[error("intent error: {0}")]
    Intent(String),

    /// Speaker authentication error (probe capture, embedding comparison).
    #[error("auth error: {0}")]
    Auth(String),

    /// Long-term memory storage error.
    #[error("memory error: {0}")]
    Memory(String),

    /// Configuration error, or a required resource missing at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Whether this error must abort session start.
    ///
    /// Only configuration failures are fatal; every capability failure is
    /// recovered at the stage that owns the collaborator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<crate::memory::store::MemoryStoreError> for AssistantError {
    fn from(e: crate::memory::store::MemoryStoreError) -> Self {
        Self::Memory(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
