//! User preferences with an explicit load/save lifecycle.
//!
//! The language preference and accessibility flags are process-wide state:
//! loaded once at startup, saved whenever they change, and injected into the
//! components that read them. The streaming engine itself never mutates
//! them.

use crate::error::{EngineError, Result};
use crate::types::is_supported_language;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Accessibility preferences applied by the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessibilityPreferences {
    /// High-contrast palette.
    pub high_contrast: bool,
    /// Larger base font size.
    pub large_text: bool,
    /// Reduce motion / disable streaming typewriter animation.
    pub reduce_motion: bool,
    /// Read assistant responses aloud automatically.
    pub auto_speak: bool,
}

/// Process-wide user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Preferred conversation language code.
    pub language: String,
    /// Accessibility flags.
    pub accessibility: AccessibilityPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: "en".to_owned(),
            accessibility: AccessibilityPreferences::default(),
        }
    }
}

/// On-disk store for [`Preferences`].
///
/// Contract: call [`load`](Self::load) once at startup, call
/// [`save`](Self::save) on every change. Readers hold the loaded value;
/// there is no ambient re-read.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The platform-default preferences path (`<config dir>/vaani/prefs.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vaani")
            .join("prefs.toml")
    }

    /// Returns the backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences, returning defaults when the file does not exist.
    ///
    /// An unsupported persisted language code falls back to `en` rather than
    /// failing startup; the bad value is logged and overwritten on next save.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the file exists but cannot be
    /// read or parsed.
    pub fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let mut prefs: Preferences = toml::from_str(&raw).map_err(|e| {
            EngineError::Config(format!("invalid preferences {}: {e}", self.path.display()))
        })?;
        if !is_supported_language(&prefs.language) {
            tracing::warn!(
                language = %prefs.language,
                "persisted language is unsupported, falling back to en"
            );
            prefs.language = "en".to_owned();
        }
        Ok(prefs)
    }

    /// Persist preferences, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on an unsupported language code or a
    /// write failure.
    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        if !is_supported_language(&prefs.language) {
            return Err(EngineError::Config(format!(
                "unsupported language code: {}",
                prefs.language
            )));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let raw = toml::to_string_pretty(prefs)
            .map_err(|e| EngineError::Config(format!("failed to serialize preferences: {e}")))?;
        std::fs::write(&self.path, raw).map_err(|e| {
            EngineError::Config(format!("failed to write {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}
