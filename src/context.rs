//! Bounded context window over a session's turn history.
//!
//! The window is a pure projection: it never mutates the session, and it is
//! recomputed on every send. Truncation is by turn count, not token count —
//! a blunt, testable ceiling.
//!
//! # Examples
//!
//! ```
//! use vaani::context::ContextWindow;
//! use vaani::types::Turn;
//!
//! let window = ContextWindow::new(2);
//! let turns = vec![
//!     Turn::user("one", "en"),
//!     Turn::assistant("two", "en", Vec::new(), false),
//!     Turn::user("three", "en"),
//! ];
//! let history = window.project(&turns);
//! assert_eq!(history.len(), 2);
//! assert_eq!(history[0].content, "two");
//! assert_eq!(history[1].content, "three");
//! ```

use crate::types::{Role, Turn};
use serde::{Deserialize, Serialize};

/// Default maximum number of turns sent as conversational memory.
pub const DEFAULT_WINDOW_TURNS: usize = 20;

/// One `{role, content}` pair of conversational memory on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Turn author.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

/// Projects the most recent turns of a session into prompt history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    limit: usize,
}

impl ContextWindow {
    /// Create a window keeping at most `limit` turns.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Returns the configured turn limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Project the last `limit` turns as `{role, content}` pairs, oldest
    /// first. Earlier turns are dropped once the limit is exceeded.
    pub fn project(&self, turns: &[Turn]) -> Vec<HistoryMessage> {
        let start = turns.len().saturating_sub(self.limit);
        turns[start..]
            .iter()
            .map(|turn| HistoryMessage {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TURNS)
    }
}
