//! Error types for the vaani session engine.

use std::time::Duration;

/// Top-level error type for the conversational engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An operation requiring a live session was called before `start()`.
    #[error("session not initialized")]
    SessionNotInitialized,

    /// A send was attempted while another call on the same session is in flight.
    #[error("session busy: a call is already in flight")]
    SessionBusy,

    /// Input text was empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// Transport-level failure (connection refused, reset, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Structured error payload returned by the backend service.
    #[error("backend error: {0}")]
    Backend(String),

    /// The stream watchdog fired: no event arrived within the window.
    #[error("stream timed out after {0:?} without an event")]
    StreamTimeout(Duration),

    /// The platform lacks a required audio device.
    #[error("unsupported audio device: {0}")]
    UnsupportedDevice(String),

    /// The user declined microphone access.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text transcription error.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Text-to-speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Returns true if this error represents a transient failure the caller
    /// may retry with the same input.
    ///
    /// `Network` and `StreamTimeout` are transient: the user turn that
    /// triggered the failed call stays in history, so resending is safe.
    /// `Backend` errors are already mapped to a fallback turn and are not
    /// retried automatically. Voice and state errors need a different action
    /// from the caller, not a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::StreamTimeout(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
