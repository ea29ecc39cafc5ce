//! Typed client for the assistant backend's request/response endpoints.
//!
//! Covers the non-streamed surface: `POST /chat`, `POST /session`,
//! `POST /translate`, `POST /feedback`, and `GET /health`. The streamed
//! `POST /chat/stream` endpoint lives in [`crate::stream::client`], which
//! shares the request shape and error mapping defined here.

use crate::config::BackendConfig;
use crate::context::HistoryMessage;
use crate::error::{EngineError, Result};
use crate::types::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Wire types ─────────────────────────────────────────────────

/// Request body shared by `POST /chat` and `POST /chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's query text.
    pub query: String,
    /// Active language code.
    pub language: String,
    /// Backend session id, when one has been bootstrapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Windowed conversational memory, oldest first.
    pub chat_history: Vec<HistoryMessage>,
    /// Number of retrieval hits requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Retrieval filters, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

fn default_confidence() -> f64 {
    1.0
}

/// Response body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Backend-assigned response id.
    pub id: String,
    /// Assistant answer text.
    pub content: String,
    /// Language the answer was produced in.
    pub language: String,
    /// Retrieval citations.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Backend confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// True when the backend already substituted its own fallback.
    #[serde(default)]
    pub has_fallback: bool,
    /// Guardrail flags raised during generation.
    #[serde(default)]
    pub guardrails: Vec<String>,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Session id this response belongs to.
    pub session_id: String,
}

/// Request body of `POST /session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Language the session starts in.
    pub language: String,
}

/// Response body of `POST /session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Backend-issued session id.
    pub session_id: String,
}

/// Request body of `POST /translate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    /// Text to translate.
    pub text: String,
    /// Source language code.
    pub source_language: String,
    /// Target language code.
    pub target_language: String,
}

/// Response body of `POST /translate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateResponse {
    /// Translated text.
    pub text: String,
    /// Language of the translated text.
    pub language: String,
}

/// Request body of `POST /feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    /// Session the feedback applies to.
    pub session_id: String,
    /// Backend response id being rated, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// +1 (helpful) or -1 (unhelpful).
    pub rating: i8,
    /// Free-text comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status string (e.g. `"ok"`).
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since the service started.
    pub uptime_seconds: f64,
    /// Per-dependency status map.
    #[serde(default)]
    pub dependencies: serde_json::Value,
}

// ── Error mapping ──────────────────────────────────────────────

/// Map a non-success HTTP response to a typed error.
///
/// Every non-2xx status is a structured backend failure; transport failures
/// never reach this function.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> EngineError {
    EngineError::Backend(format!("HTTP {status}: {}", extract_error_message(body)))
}

/// Map a reqwest transport error to a typed error.
pub fn map_transport_error(err: &reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Network(format!("request timed out: {err}"))
    } else {
        EngineError::Network(format!("connection error: {err}"))
    }
}

/// Extract a human-readable message from a backend error payload.
///
/// Understands `{"detail": "..."}` and `{"error": {"message": "..."}}`
/// shapes; anything else is truncated raw body text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .and_then(|d| d.as_str())
                .or_else(|| v.pointer("/error/message").and_then(|m| m.as_str()))
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_owned()
            } else {
                body.chars().take(500).collect()
            }
        })
}

// ── Client ─────────────────────────────────────────────────────

/// HTTP client for the non-streamed backend endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client from backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /chat` — one complete answer per call.
    ///
    /// # Errors
    ///
    /// [`EngineError::Network`] on transport failure, [`EngineError::Backend`]
    /// on a non-2xx response.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat", self.base_url);
        tracing::debug!(language = %request.language, "sending chat request");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "chat request failed");
            return Err(map_http_error(status, &body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| EngineError::Backend(format!("malformed chat response: {e}")))
    }

    /// `POST /session` — bootstrap a backend session id.
    ///
    /// # Errors
    ///
    /// [`EngineError::Network`] or [`EngineError::Backend`].
    pub async fn create_session(&self, language: &str) -> Result<String> {
        let url = format!("{}/session", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SessionRequest {
                language: language.to_owned(),
            })
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed = response
            .json::<SessionResponse>()
            .await
            .map_err(|e| EngineError::Backend(format!("malformed session response: {e}")))?;
        Ok(parsed.session_id)
    }

    /// `POST /translate`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Network`] or [`EngineError::Backend`].
    pub async fn translate(&self, request: &TranslateRequest) -> Result<TranslateResponse> {
        let url = format!("{}/translate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        response
            .json::<TranslateResponse>()
            .await
            .map_err(|e| EngineError::Backend(format!("malformed translate response: {e}")))
    }

    /// `POST /feedback` — fire-and-forget rating of a response.
    ///
    /// # Errors
    ///
    /// [`EngineError::Network`] or [`EngineError::Backend`].
    pub async fn send_feedback(&self, request: &FeedbackRequest) -> Result<()> {
        let url = format!("{}/feedback", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }
        Ok(())
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Network`] or [`EngineError::Backend`].
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        response
            .json::<HealthResponse>()
            .await
            .map_err(|e| EngineError::Backend(format!("malformed health response: {e}")))
    }
}
