//! Runtime events for observers (CLI status output, tests, diagnostics).

use crate::access::AccessMode;
use crate::intent::Intent;

/// Events that describe what the session is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// Authentication finished and the pipeline is about to start.
    SessionStarted { access: AccessMode },
    /// Capture produced an utterance.
    Utterance(String),
    /// Think labelled the current utterance.
    IntentClassified(Intent),
    /// Think pushed a reply towards Speak.
    Reply { text: String, is_final: bool },
    /// Speak raised or lowered the mute flag.
    Muted { active: bool },
    /// A new long-term memory record was written.
    MemoryStored { id: i64 },
    /// A stage recovered from a collaborator failure.
    StageFailure { stage: Stage, error: String },
    /// All stages have stopped.
    SessionEnded,
}

/// Pipeline stage names used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Think,
    Speak,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Capture => "capture",
            Self::Think => "think",
            Self::Speak => "speak",
        })
    }
}
