//! Session-wide access level decided once by the authenticator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission level for the whole session.
///
/// Produced exactly once at session start and then only ever read. It is
/// `Copy` so every stage gets its own value and nothing can write it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessMode {
    /// The enrolled owner: full conversation and long-term memory access.
    Owner,
    /// Anyone else: conversation only, private data withheld.
    Guest,
}

impl AccessMode {
    /// Whether this mode may read or write long-term memory.
    pub fn is_owner(self) -> bool {
        matches!(self, Self::Owner)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Guest => "GUEST",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_owner_has_memory_access() {
        assert!(AccessMode::Owner.is_owner());
        assert!(!AccessMode::Guest.is_owner());
    }

    #[test]
    fn serializes_as_uppercase_label() {
        let json = serde_json::to_string(&AccessMode::Guest).unwrap();
        assert_eq!(json, "\"GUEST\"");
        assert_eq!(AccessMode::Owner.to_string(), "OWNER");
    }
}
