//! Friday: a voice assistant that knows who it is talking to.
//!
//! A session authenticates the speaker once, then runs a concurrent
//! perceive-think-act loop:
//! Microphone → STT → intent → (long-term memory | LLM) → TTS → Speaker
//!
//! # Architecture
//!
//! - **Capture**: records fixed-length clips and transcribes them, paused
//!   while the assistant is speaking
//! - **Think**: classifies intent, consults working and long-term memory,
//!   and generates replies through a single exclusive LLM section
//! - **Speak**: renders replies and raises the mute flag while doing so
//!
//! Long-term memory lives in SQLite and is only readable or writable when
//! the session was authenticated as the owner.

pub mod access;
pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod generator;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod runtime;
pub mod session;
pub mod stt;
pub mod tts;

pub use access::AccessMode;
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use pipeline::coordinator::{Collaborators, PipelineCoordinator};
pub use runtime::RuntimeEvent;
