//! Cancellable subscription to the backend's streamed chat endpoint.
//!
//! One streamed POST per call. Events are delivered in strict arrival order,
//! exactly one terminal item closes the subscription, and nothing is
//! delivered after cancellation. A watchdog aborts the stream when no event
//! arrives within the configured window, so a hung connection can never
//! block the session indefinitely.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::backend::{ChatRequest, map_http_error, map_transport_error};
use crate::config::{BackendConfig, StreamConfig};
use crate::error::{EngineError, Result};
use crate::stream::events::StreamEvent;
use crate::stream::frame::FrameDecoder;

/// A boxed, ordered subscription.
///
/// Items are `Ok(event)` for frames the backend sent (including its terminal
/// `complete`/`error` frames) and `Err(_)` for transport failures and
/// watchdog timeouts. After any terminal item — `Ok` terminal event or any
/// `Err` — the stream yields nothing further. Cancellation ends the stream
/// silently with no terminal item.
pub type Subscription = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Client for `POST /chat/stream`.
#[derive(Debug, Clone)]
pub struct StreamingClient {
    client: reqwest::Client,
    base_url: String,
    watchdog: Duration,
}

impl StreamingClient {
    /// Create a streaming client.
    ///
    /// No overall request timeout is set — a healthy stream may outlive any
    /// fixed deadline. Hangs are handled by the per-event watchdog instead.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the HTTP client cannot be built.
    pub fn new(backend: &BackendConfig, stream: &StreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(backend.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: backend.base_url.trim_end_matches('/').to_owned(),
            watchdog: Duration::from_secs(stream.watchdog_secs),
        })
    }

    /// Returns the watchdog window.
    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Open one streamed call.
    ///
    /// The returned subscription honors `cancel`: once the token is
    /// triggered, the underlying transport is dropped and no further items
    /// are yielded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Network`] when the connection cannot be
    /// established and [`EngineError::Backend`] for a non-2xx response.
    pub async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Subscription> {
        let url = format!("{}/chat/stream", self.base_url);
        tracing::debug!(language = %request.language, "opening chat stream");

        let response = self
            .client
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "chat stream rejected");
            return Err(map_http_error(status, &body));
        }

        tracing::debug!("chat stream established");
        let mut bytes = response.bytes_stream();
        let watchdog = self.watchdog;

        let subscription = async_stream::stream! {
            let mut decoder = FrameDecoder::new();
            let mut pending: VecDeque<StreamEvent> = VecDeque::new();

            loop {
                // Drain decoded events before touching the transport again.
                while let Some(event) = pending.pop_front() {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let terminal = event.is_terminal();
                    yield Ok(event);
                    if terminal {
                        return;
                    }
                }

                let read = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    read = tokio::time::timeout(watchdog, bytes.next()) => read,
                };

                match read {
                    Err(_elapsed) => {
                        tracing::warn!(window = ?watchdog, "stream watchdog fired");
                        yield Err(EngineError::StreamTimeout(watchdog));
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        tracing::warn!(error = %e, "stream read failed");
                        yield Err(EngineError::Network(format!("stream read error: {e}")));
                        return;
                    }
                    Ok(None) => {
                        // Transport closed. A trailing frame may still be
                        // buffered; a stream that ends without a terminal
                        // frame is a transport failure.
                        if let Some(payload) = decoder.flush()
                            && let Some(event) = StreamEvent::parse(&payload)
                        {
                            pending.push_back(event);
                        }
                        match pending.pop_front() {
                            Some(event) if event.is_terminal() && !cancel.is_cancelled() => {
                                yield Ok(event);
                            }
                            _ => {
                                if !cancel.is_cancelled() {
                                    yield Err(EngineError::Network(
                                        "stream closed before completion".into(),
                                    ));
                                }
                            }
                        }
                        return;
                    }
                    Ok(Some(Ok(chunk))) => {
                        for payload in decoder.push(&chunk) {
                            if let Some(event) = StreamEvent::parse(&payload) {
                                pending.push_back(event);
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(subscription))
    }
}
