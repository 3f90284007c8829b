//! Intent labels and the classifier seam.
//!
//! The pipeline only depends on [`IntentClassifier`]; [`KeywordIntentClassifier`]
//! is the built-in implementation driven by [`IntentConfig`] phrase lists.

use crate::config::IntentConfig;
use crate::error::{AssistantError, Result};
use std::fmt;
use std::str::FromStr;

/// Fixed label set an utterance is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Chat,
    MemoryStore,
    MemoryRecall,
    SystemCommand,
    Other,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::MemoryStore => "memory_store",
            Self::MemoryRecall => "memory_recall",
            Self::SystemCommand => "system_command",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "chat" => Ok(Self::Chat),
            "memory_store" => Ok(Self::MemoryStore),
            "memory_recall" => Ok(Self::MemoryRecall),
            "system_command" => Ok(Self::SystemCommand),
            "other" => Ok(Self::Other),
            other => Err(AssistantError::Intent(format!("unknown intent label '{other}'"))),
        }
    }
}

/// Maps an utterance to an [`Intent`]. Stateless and synchronous.
pub trait IntentClassifier: Send + Sync {
    /// Classify one utterance.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model cannot produce a label.
    fn classify(&self, text: &str) -> Result<Intent>;
}

/// Phrase-list classifier.
///
/// Rules are checked in priority order recall → store → system → chat and the
/// first list with a phrase present (on word boundaries) wins.
pub struct KeywordIntentClassifier {
    rules: Vec<(Intent, Vec<String>)>,
}

impl KeywordIntentClassifier {
    pub fn new(config: &IntentConfig) -> Self {
        let normalize_all = |phrases: &[String]| -> Vec<String> {
            phrases
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.trim().is_empty())
                .collect()
        };
        Self {
            rules: vec![
                (Intent::MemoryRecall, normalize_all(&config.memory_recall)),
                (Intent::MemoryStore, normalize_all(&config.memory_store)),
                (Intent::SystemCommand, normalize_all(&config.system_command)),
                (Intent::Chat, normalize_all(&config.chat)),
            ],
        }
    }
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self::new(&IntentConfig::default())
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, text: &str) -> Result<Intent> {
        let haystack = normalize(text);
        let intent = self
            .rules
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| haystack.contains(p.as_str())))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Other);
        Ok(intent)
    }
}

/// Lowercase, replace punctuation (except apostrophes) with spaces, collapse
/// whitespace, and pad with single spaces so `contains(" word ")` is a
/// word-boundary match.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    format!(" {} ", words.join(" "))
}
