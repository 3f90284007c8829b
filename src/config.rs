//! Configuration types for the assistant session.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for an assistant session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Conversation loop settings (working memory size, exit phrases, canned replies).
    pub session: SessionConfig,
    /// Speaker authentication settings.
    pub auth: AuthConfig,
    /// Long-term memory settings.
    pub memory: MemoryConfig,
    /// Keyword intent classifier settings.
    pub intent: IntentConfig,
    /// Language model backend settings.
    pub llm: LlmConfig,
    /// Speech-to-text service settings.
    pub stt: SttConfig,
    /// Text-to-speech service settings.
    pub tts: TtsConfig,
    /// Audio device settings.
    pub audio: AudioConfig,
}

/// Conversation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of user/assistant exchanges kept in working memory.
    ///
    /// Working memory holds `2 * max_turns` turns.
    pub max_turns: usize,
    /// Length of each microphone capture window in seconds.
    pub listen_duration_secs: f32,
    /// Phrases that end the session (case-insensitive substring match).
    pub exit_phrases: Vec<String>,
    /// Spoken once when the session starts. Empty disables the greeting.
    pub greeting: String,
    /// Final reply spoken after an exit phrase.
    pub farewell: String,
    /// Reply used when a collaborator fails mid-turn.
    pub fallback_reply: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 6,
            listen_duration_secs: 4.0,
            exit_phrases: ["exit", "quit", "stop", "bye", "goodbye", "shutdown"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            greeting: "Hello! How can I help?".to_owned(),
            farewell: "Goodbye. Have a great day.".to_owned(),
            fallback_reply: "I'm not sure how to handle that.".to_owned(),
        }
    }
}

/// Speaker authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long to keep probing for the owner before settling on GUEST.
    pub timeout_secs: u64,
    /// Maximum embedding distance accepted as an owner match.
    pub match_threshold: f32,
    /// Directory of reference embeddings (`*.json`, one array of floats each).
    pub gallery_dir: PathBuf,
    /// Length of a single probe / enrollment recording in seconds.
    pub probe_duration_secs: f32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 8,
            match_threshold: 0.75,
            gallery_dir: data_dir().join("owner_gallery"),
            probe_duration_secs: 2.0,
        }
    }
}

/// Long-term memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Minimum importance a fact needs before it is persisted.
    pub importance_threshold: f32,
    /// Maximum number of records returned by a recall.
    pub recall_limit: usize,
    /// Each distinct keyword found in a fact adds to its importance.
    pub importance_keywords: Vec<String>,
    /// Keywords that categorise a fact as a task (checked first).
    pub task_keywords: Vec<String>,
    /// Keywords that categorise a fact as a preference.
    pub preference_keywords: Vec<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("friday_memory.db"),
            importance_threshold: 0.6,
            recall_limit: 5,
            importance_keywords: owned(&[
                "deadline",
                "meeting",
                "exam",
                "task",
                "important",
                "urgent",
                "remember",
                "must",
            ]),
            task_keywords: owned(&["deadline", "exam", "meeting", "task"]),
            preference_keywords: owned(&["like", "prefer", "favorite"]),
        }
    }
}

/// Phrase lists for the keyword intent classifier.
///
/// Phrases match on word boundaries. Recall is checked before store so that
/// "do you remember" is not mistaken for a request to remember something.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    pub memory_recall: Vec<String>,
    pub memory_store: Vec<String>,
    pub system_command: Vec<String>,
    pub chat: Vec<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            memory_recall: owned(&[
                "do you remember",
                "what do you remember",
                "what did i tell you",
                "what are my",
                "recall",
                "remind me",
            ]),
            memory_store: owned(&[
                "remember",
                "don't forget",
                "dont forget",
                "note that",
                "keep in mind",
                "save this",
            ]),
            system_command: owned(&["open", "launch", "close", "volume", "mute", "restart"]),
            chat: owned(&[
                "hello",
                "hi",
                "hey",
                "how are you",
                "thanks",
                "thank you",
                "good morning",
                "good evening",
            ]),
        }
    }
}

/// Language model backend configuration (Ollama-compatible server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the server.
    pub api_url: String,
    /// Model name to request.
    pub model: String,
    /// Name the assistant uses for itself in prompts.
    pub assistant_name: String,
    /// Name of the owner the assistant was created for.
    pub owner_name: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Number of layers to offload to GPU (`None` = server default).
    pub num_gpu: Option<u32>,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434".to_owned(),
            model: "llama3.1".to_owned(),
            assistant_name: "FRIDAY".to_owned(),
            owner_name: "my owner".to_owned(),
            temperature: 0.7,
            num_gpu: None,
            request_timeout_secs: 120,
        }
    }
}

/// Speech-to-text service configuration (OpenAI-compatible transcription API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub api_url: String,
    pub model: String,
    /// Language hint passed to the service.
    pub language: Option<String>,
    pub api_key: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_owned(),
            model: "Systran/faster-whisper-tiny".to_owned(),
            language: Some("en".to_owned()),
            api_key: String::new(),
        }
    }
}

/// Text-to-speech service configuration (OpenAI-compatible speech API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub api_url: String,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub api_key: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8880".to_owned(),
            model: "kokoro".to_owned(),
            voice: "af_sarah".to_owned(),
            speed: 1.0,
            api_key: String::new(),
        }
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz (what the STT service receives).
    pub input_sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            input_device: None,
            output_device: None,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/friday/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("friday"))
            .unwrap_or_else(|| PathBuf::from("/tmp/friday-config"))
            .join("config.toml")
    }

    /// Reject values that would make the session misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.session.max_turns == 0 {
            return Err(AssistantError::Config(
                "session.max_turns must be at least 1".into(),
            ));
        }
        if !self.session.exit_phrases.iter().any(|p| !p.trim().is_empty()) {
            return Err(AssistantError::Config(
                "session.exit_phrases must contain at least one phrase".into(),
            ));
        }
        check_duration("session.listen_duration_secs", self.session.listen_duration_secs)?;
        check_duration("auth.probe_duration_secs", self.auth.probe_duration_secs)?;
        if !(0.0..=1.0).contains(&self.memory.importance_threshold) {
            return Err(AssistantError::Config(
                "memory.importance_threshold must be within [0, 1]".into(),
            ));
        }
        if self.memory.recall_limit == 0 {
            return Err(AssistantError::Config(
                "memory.recall_limit must be at least 1".into(),
            ));
        }
        if self.auth.match_threshold.is_nan() || self.auth.match_threshold <= 0.0 {
            return Err(AssistantError::Config(
                "auth.match_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// A recording length must convert to a [`std::time::Duration`] and be non-zero.
fn check_duration(field: &str, secs: f32) -> Result<()> {
    match std::time::Duration::try_from_secs_f32(secs) {
        Ok(d) if !d.is_zero() => Ok(()),
        _ => Err(AssistantError::Config(format!(
            "{field} must be a positive, finite number of seconds (got {secs})"
        ))),
    }
}

/// Application data root: `FRIDAY_DATA_DIR`, else `<data dir>/friday`.
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FRIDAY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("friday"))
        .unwrap_or_else(|| PathBuf::from("/tmp/friday-data"))
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_owned()).collect()
}
