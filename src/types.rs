//! Core data model: sessions, turns, and retrieval sources.
//!
//! A [`Session`] is a bounded, identified multi-turn conversation owned
//! exclusively by the [`SessionManager`](crate::session::SessionManager).
//! [`Turn`]s are immutable once appended and strictly ordered by creation
//! time. [`Source`]s are citations attached to assistant turns, never
//! standalone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique session identifier (opaque, backend-issued or client-generated).
pub type SessionId = String;

/// The 23 officially supported language codes.
///
/// Only `hi` and `en` are actively exercised end to end; the rest are
/// accepted by validation and forwarded to the backend unchanged.
pub const SUPPORTED_LANGUAGES: [&str; 23] = [
    "as", "bn", "brx", "doi", "en", "gu", "hi", "kn", "kok", "ks", "mai", "ml", "mni", "mr", "ne",
    "or", "pa", "sa", "sat", "sd", "ta", "te", "ur",
];

/// Whether `code` is one of the officially supported language codes.
pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&code)
}

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The assistant (backend response).
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A retrieval citation attached to an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document title.
    pub title: String,
    /// Locator for the cited document.
    pub url: String,
    /// Extracted snippet shown alongside the citation.
    #[serde(default)]
    pub snippet: String,
    /// Relevance score in `[0, 1]`.
    #[serde(default)]
    pub score: f64,
    /// Origin site or collection name.
    #[serde(default)]
    pub site: String,
    /// Language code of the source document.
    #[serde(default)]
    pub language: String,
    /// Content kind (e.g. `"article"`, `"faq"`, `"circular"`).
    #[serde(default)]
    pub kind: String,
    /// Publish date, when the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// One message within a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who authored this turn.
    pub role: Role,
    /// The textual content.
    pub content: String,
    /// Language code the turn was produced in.
    pub language: String,
    /// Creation timestamp. Turns are strictly ordered by this within a session.
    pub created_at: DateTime<Utc>,
    /// Citations, only ever present on assistant turns.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// True when the content is the canned per-language fallback string.
    #[serde(default)]
    pub fallback: bool,
}

impl Turn {
    /// Create a user turn.
    pub fn user(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            language: language.into(),
            created_at: Utc::now(),
            sources: Vec::new(),
            fallback: false,
        }
    }

    /// Create an assistant turn with citations.
    pub fn assistant(
        content: impl Into<String>,
        language: impl Into<String>,
        sources: Vec<Source>,
        fallback: bool,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            language: language.into(),
            created_at: Utc::now(),
            sources,
            fallback,
        }
    }
}

/// A multi-turn conversation with one active language.
///
/// Never persisted beyond process lifetime. Created on first use or explicit
/// re-initialization; replaced when the user changes language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier.
    pub id: SessionId,
    /// The single active language for this session.
    pub language: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last successful operation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Liveness flag; a dead session rejects sends.
    pub live: bool,
    /// Ordered turn history (append-only).
    pub turns: Vec<Turn>,
}

impl Session {
    /// Create a new live session with no turns.
    pub fn new(id: impl Into<SessionId>, language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            language: language.into(),
            created_at: now,
            updated_at: now,
            live: true,
            turns: Vec::new(),
        }
    }

    /// Append a turn and touch the update timestamp.
    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.touch();
    }

    /// Drop all turns, keeping identity and language.
    pub fn clear_turns(&mut self) {
        self.turns.clear();
        self.touch();
    }

    /// Update `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Language registry ─────────────────────────────────────

    #[test]
    fn registry_has_23_codes() {
        assert_eq!(SUPPORTED_LANGUAGES.len(), 23);
    }

    #[test]
    fn exercised_languages_supported() {
        assert!(is_supported_language("hi"));
        assert!(is_supported_language("en"));
    }

    #[test]
    fn unknown_language_rejected() {
        assert!(!is_supported_language("xx"));
        assert!(!is_supported_language(""));
        assert!(!is_supported_language("EN"));
    }

    // ── Role ──────────────────────────────────────────────────

    #[test]
    fn role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap_or_default();
        assert_eq!(json, "\"assistant\"");
    }

    // ── Turn ──────────────────────────────────────────────────

    #[test]
    fn user_turn_has_no_sources() {
        let turn = Turn::user("namaste", "hi");
        assert_eq!(turn.role, Role::User);
        assert!(turn.sources.is_empty());
        assert!(!turn.fallback);
    }

    #[test]
    fn assistant_turn_carries_sources() {
        let source = Source {
            title: "Taj Mahal".into(),
            url: "https://asi.nic.in/taj".into(),
            snippet: String::new(),
            score: 0.91,
            site: "asi.nic.in".into(),
            language: "en".into(),
            kind: "article".into(),
            published_at: None,
        };
        let turn = Turn::assistant("A mausoleum.", "en", vec![source], false);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.sources.len(), 1);
        assert_eq!(turn.sources[0].score, 0.91);
    }

    #[test]
    fn source_parses_with_partial_fields() {
        let json = r#"{"title":"Taj Mahal","url":"https://asi.nic.in/taj","score":0.91}"#;
        let parsed: Result<Source, _> = serde_json::from_str(json);
        assert!(parsed.is_ok());
        let source = match parsed {
            Ok(s) => s,
            Err(_) => unreachable!("source parsed"),
        };
        assert_eq!(source.title, "Taj Mahal");
        assert!(source.snippet.is_empty());
        assert!(source.published_at.is_none());
    }

    // ── Session ───────────────────────────────────────────────

    #[test]
    fn new_session_is_live_and_empty() {
        let session = Session::new("s-1", "en");
        assert!(session.live);
        assert!(session.turns.is_empty());
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn push_turn_preserves_order() {
        let mut session = Session::new("s-2", "en");
        session.push_turn(Turn::user("first", "en"));
        session.push_turn(Turn::assistant("second", "en", Vec::new(), false));
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].content, "first");
        assert_eq!(session.turns[1].content, "second");
        assert!(session.turns[0].created_at <= session.turns[1].created_at);
    }

    #[test]
    fn push_turn_touches_timestamp() {
        let mut session = Session::new("s-3", "en");
        let before = session.updated_at;
        session.push_turn(Turn::user("hello", "en"));
        assert!(session.updated_at >= before);
    }

    #[test]
    fn clear_turns_keeps_identity() {
        let mut session = Session::new("s-4", "hi");
        session.push_turn(Turn::user("x", "hi"));
        session.clear_turns();
        assert!(session.turns.is_empty());
        assert_eq!(session.id, "s-4");
        assert_eq!(session.language, "hi");
        assert!(session.live);
    }

    #[test]
    fn session_serde_round_trip() {
        let mut session = Session::new("s-rt", "en");
        session.push_turn(Turn::user("hello", "en"));
        let json = serde_json::to_string(&session).unwrap_or_default();
        assert!(!json.is_empty());
        let parsed: Result<Session, _> = serde_json::from_str(&json);
        assert!(parsed.is_ok());
        let parsed = match parsed {
            Ok(s) => s,
            Err(_) => unreachable!("session parsed"),
        };
        assert_eq!(parsed.id, "s-rt");
        assert_eq!(parsed.turns.len(), 1);
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
        assert_send_sync::<Turn>();
        assert_send_sync::<Source>();
    }
}
