//! Speech-to-text over the backend's `/speech/stt` endpoint.

use std::time::Duration;

use serde::Deserialize;

use crate::backend::{map_http_error, map_transport_error};
use crate::config::BackendConfig;
use crate::error::{EngineError, Result};
use crate::speech::capture::AudioRecording;

/// A transcription result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transcription {
    /// Recognized text.
    pub text: String,
    /// Language the recognizer settled on.
    pub language: String,
    /// Recognizer confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Length of the audio, as measured by the backend.
    #[serde(default)]
    pub duration_seconds: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Client for `POST /speech/stt`.
#[derive(Debug, Clone)]
pub struct TranscriptionClient {
    client: reqwest::Client,
    base_url: String,
}

impl TranscriptionClient {
    /// Create a transcription client.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the HTTP client cannot be built.
    pub fn new(backend: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(backend.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: backend.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Transcribe a finished take.
    ///
    /// The WAV payload is uploaded as a multipart `file` part with the
    /// requested `language` as a hint.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transcription`] when the recognizer produced
    /// no text (silence or unintelligible audio), [`EngineError::Backend`]
    /// for non-2xx responses, and [`EngineError::Network`] for transport
    /// failures.
    pub async fn transcribe(
        &self,
        recording: &AudioRecording,
        language: &str,
    ) -> Result<Transcription> {
        let url = format!("{}/speech/stt", self.base_url);
        tracing::debug!(
            bytes = recording.wav.len(),
            language,
            "uploading audio for transcription"
        );

        let part = reqwest::multipart::Part::bytes(recording.wav.clone())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| EngineError::Audio(format!("invalid audio mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("language", language.to_owned());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let transcription: Transcription = response
            .json()
            .await
            .map_err(|e| EngineError::Backend(format!("malformed transcription response: {e}")))?;

        if transcription.text.trim().is_empty() {
            return Err(EngineError::Transcription(
                "no speech detected in recording".into(),
            ));
        }

        tracing::debug!(
            confidence = transcription.confidence,
            language = %transcription.language,
            "transcription received"
        );
        Ok(transcription)
    }
}
