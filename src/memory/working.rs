//! Short-term conversational context.

use std::collections::VecDeque;
use std::fmt;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        })
    }
}

/// One utterance or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Bounded, ordered log of the most recent turns.
///
/// Holds at most `2 * max_turns` turns; older turns fall off the front.
#[derive(Debug, Clone)]
pub struct WorkingMemory {
    capacity: usize,
    turns: VecDeque<Turn>,
}

impl WorkingMemory {
    /// Create a working memory retaining the last `max_turns` exchanges.
    pub fn new(max_turns: usize) -> Self {
        let capacity = max_turns.saturating_mul(2);
        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity.saturating_add(1)),
        }
    }

    /// Append a turn, evicting the oldest ones beyond capacity.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(Turn {
            role,
            content: content.into(),
        });
        while self.turns.len() > self.capacity {
            let _ = self.turns.pop_front();
        }
    }

    /// Retained turns as `"Role: content"` lines, oldest first.
    pub fn context(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
