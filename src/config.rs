//! Configuration types for the session engine.
//!
//! Every section has serde defaults so a partial (or missing) config file
//! still yields a usable configuration. [`ConfigStore`] gives the explicit
//! load-at-startup / save-on-change lifecycle: nothing in the engine reads
//! configuration ambiently.

use crate::error::{EngineError, Result};
use crate::types::is_supported_language;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the conversational engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend endpoint settings.
    pub backend: BackendConfig,
    /// Session and prompt-window settings.
    pub session: SessionConfig,
    /// Streaming watchdog settings.
    pub stream: StreamConfig,
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
}

impl EngineConfig {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an unsupported language code, an
    /// empty base URL, a zero context window, or a confidence threshold
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(EngineError::Config("backend.base_url is empty".into()));
        }
        if !is_supported_language(&self.session.language) {
            return Err(EngineError::Config(format!(
                "unsupported language code: {}",
                self.session.language
            )));
        }
        if self.session.context_window_turns == 0 {
            return Err(EngineError::Config(
                "session.context_window_turns must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.session.confidence_threshold) {
            return Err(EngineError::Config(format!(
                "session.confidence_threshold out of range: {}",
                self.session.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the assistant backend.
    pub base_url: String,
    /// Timeout for non-streamed request/response calls, in seconds.
    pub request_timeout_secs: u64,
    /// Number of retrieval hits requested per query.
    pub top_k: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            request_timeout_secs: 30,
            top_k: 5,
        }
    }
}

/// Session behavior configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Active language code at startup.
    pub language: String,
    /// Maximum number of recent turns sent as conversational memory.
    pub context_window_turns: usize,
    /// Confidence below which the fallback message replaces the answer.
    pub confidence_threshold: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en".to_owned(),
            context_window_turns: 20,
            confidence_threshold: 0.65,
        }
    }
}

/// Streaming configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Watchdog window in seconds: the stream is aborted with a timeout
    /// error when no event arrives within this many seconds.
    pub watchdog_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        // Sized against the backend's multi-second first-token SLA.
        Self { watchdog_secs: 30 }
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target capture sample rate in Hz.
    pub input_sample_rate: u32,
    /// Playback sample rate in Hz.
    pub output_sample_rate: u32,
    /// Number of capture channels (1 = mono).
    pub input_channels: u16,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            input_channels: 1,
            input_device: None,
            output_device: None,
        }
    }
}

/// Explicit on-disk configuration store.
///
/// Load once at startup, save whenever a setting changes. The engine takes
/// the resulting [`EngineConfig`] by value and never re-reads the file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The platform-default config path (`<config dir>/vaani/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vaani")
            .join("config.toml")
    }

    /// Returns the backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, returning defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the file exists but cannot be
    /// read or parsed, or when the parsed config fails validation.
    pub fn load(&self) -> Result<EngineConfig> {
        if !self.path.exists() {
            return Ok(EngineConfig::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let config: EngineConfig = toml::from_str(&raw).map_err(|e| {
            EngineError::Config(format!("invalid config {}: {e}", self.path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the config, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on serialization or write failure.
    pub fn save(&self, config: &EngineConfig) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let raw = toml::to_string_pretty(config)
            .map_err(|e| EngineError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&self.path, raw).map_err(|e| {
            EngineError::Config(format!("failed to write {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}
