//! Streamed event model for `/chat/stream`.
//!
//! Each frame payload is a JSON object tagged by `type`. Events are ephemeral:
//! the session layer consumes them to assemble the assistant turn and does not
//! retain them afterwards.
//!
//! # Stream lifecycle
//!
//! ```text
//! token* → sources? → complete
//! ```
//!
//! or, on a backend failure mid-stream:
//!
//! ```text
//! token* → error
//! ```

use crate::types::Source;
use serde::{Deserialize, Serialize};

fn default_confidence() -> f64 {
    1.0
}

/// One discrete event from the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A fragment of the answer text, in arrival order.
    Token {
        /// The partial text.
        text: String,
    },

    /// The retrieval citations for this answer.
    Sources {
        /// Citation list.
        sources: Vec<Source>,
    },

    /// The answer finished normally. Terminal.
    Complete {
        /// Backend confidence in `[0, 1]`.
        #[serde(default = "default_confidence")]
        confidence: f64,
        /// Guardrail flags raised during generation.
        #[serde(default)]
        guardrails: Vec<String>,
    },

    /// The backend failed mid-answer. Terminal.
    Error {
        /// Description of what went wrong.
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event closes the subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Parse one frame payload. Returns `None` for malformed JSON or an
    /// unknown tag; the stream skips such frames rather than aborting.
    pub fn parse(payload: &str) -> Option<Self> {
        match serde_json::from_str(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed stream frame");
                None
            }
        }
    }
}
