//! Conversation pipeline: Capture → Think → Speak.

pub mod coordinator;
pub mod messages;
pub mod mute;

pub use coordinator::{Collaborators, PipelineCoordinator};
pub use messages::{PipelineMessage, Reply};
pub use mute::{MuteFlag, MuteGuard, MuteWindow};
