//! Text-to-speech over the backend's `/speech/tts` endpoint.

use std::io::Cursor;
use std::time::Duration;

use serde::Serialize;

use crate::backend::{map_http_error, map_transport_error};
use crate::config::BackendConfig;
use crate::error::{EngineError, Result};

/// Decoded synthesized speech, ready for an [`AudioSink`](crate::speech::AudioSink).
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// Mono f32 samples.
    pub samples: Vec<f32>,
    /// Sample rate of the samples.
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    /// Length of the utterance.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    language: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

/// Client for `POST /speech/tts`.
#[derive(Debug, Clone)]
pub struct SynthesisClient {
    client: reqwest::Client,
    base_url: String,
    voice: Option<String>,
}

impl SynthesisClient {
    /// Create a synthesis client using the backend's default voice.
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
            voice: None,
        })
    }

    /// Request a specific backend voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Synthesize `text` in `language` and decode the WAV response.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyMessage`] for blank text,
    /// [`EngineError::Synthesis`] for an undecodable payload,
    /// [`EngineError::Backend`] for non-2xx responses, and
    /// [`EngineError::Network`] for transport failures.
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<SynthesizedAudio> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let url = format!("{}/speech/tts", self.base_url);
        tracing::debug!(chars = text.len(), language, "requesting synthesis");

        let response = self
            .client
            .post(&url)
            .json(&SynthesisRequest {
                text,
                language,
                format: "wav",
                voice: self.voice.as_deref(),
            })
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let payload = response
            .bytes()
            .await
            .map_err(|e| EngineError::Network(format!("failed to read audio payload: {e}")))?;

        decode_wav(&payload)
    }
}

/// Decode a 16-bit or float WAV payload into mono f32 samples.
pub fn decode_wav(payload: &[u8]) -> Result<SynthesizedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(payload))
        .map_err(|e| EngineError::Synthesis(format!("undecodable audio payload: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| EngineError::Synthesis(format!("corrupt audio payload: {e}")))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| EngineError::Synthesis(format!("corrupt audio payload: {e}")))?,
    };

    let samples = if spec.channels > 1 {
        let ch = spec.channels as usize;
        samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    } else {
        samples
    };

    Ok(SynthesizedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
