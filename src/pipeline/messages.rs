//! Message types passed between pipeline stages.

/// Capture → Think payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMessage {
    /// One transcribed, non-empty user utterance.
    Utterance(String),
    /// An exit phrase was heard; no further utterances follow.
    EndOfSession,
}

/// Think → Speak payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text to render.
    pub text: String,
    /// Whether this is the farewell; Speak stops after rendering it.
    pub is_final: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn farewell(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}
