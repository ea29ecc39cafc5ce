//! Vaani: client-side session engine for a multilingual voice RAG assistant.
//!
//! This crate owns everything between the user's input surface and the
//! assistant backend:
//! Text/Voice → Session → Backend (chat, stream, STT, TTS) → Turn history
//!
//! # Architecture
//!
//! - **Session**: single live conversation, serialized turn control, and
//!   the windowed conversational memory sent with each query
//! - **Streaming**: incremental `data:` frame decoding over HTTP with a
//!   per-event watchdog and cooperative cancellation
//! - **Fallback**: confidence and guardrail gate substituting the exact
//!   per-language canned answer
//! - **Speech**: push-to-talk capture and playback via `cpal`, with
//!   transcription and synthesis delegated to the backend
//!
//! The engine never renders anything; a frontend drives it through
//! [`SessionManager`] and [`VoiceOrchestrator`] and observes results as
//! [`Turn`]s and streaming callbacks.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod prefs;
pub mod session;
pub mod speech;
pub mod stream;
pub mod types;
pub mod voice;

pub use config::{ConfigStore, EngineConfig};
pub use error::{EngineError, Result};
pub use fallback::{FallbackDecision, FallbackPolicy};
pub use session::{SessionManager, StreamHandle};
pub use stream::{StreamEvent, Subscription};
pub use types::{Role, SUPPORTED_LANGUAGES, Session, Source, Turn};
pub use voice::{InputState, OutputState, VoiceOrchestrator};
