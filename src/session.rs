//! Session orchestration: identity, language, history, and per-turn control.
//!
//! [`SessionManager`] owns the single live [`Session`], serializes calls on
//! it, and drives one turn end to end: append the user turn optimistically,
//! open the backend call with the windowed history, assemble the response,
//! apply the fallback policy, and append the assistant turn only once a real
//! terminal event has arrived.
//!
//! Concurrency model: the session and the in-flight flag are the only mutable
//! shared state. The flag is an atomic claimed before any await point; a
//! second send while one is in flight fails fast with
//! [`EngineError::SessionBusy`] rather than queuing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, ChatRequest};
use crate::config::EngineConfig;
use crate::context::{ContextWindow, HistoryMessage};
use crate::error::{EngineError, Result};
use crate::fallback::{FallbackPolicy, fallback_string};
use crate::stream::{StreamEvent, StreamingClient};
use crate::types::{Session, Source, Turn, is_supported_language};

/// State shared with in-flight streaming tasks.
#[derive(Debug)]
struct Shared {
    session: Mutex<Option<Session>>,
    in_flight: AtomicBool,
}

impl Shared {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the in-flight flag when the call (or its task) ends.
struct FlightGuard(Arc<Shared>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Append the assistant turn only while the call's session is still the live
/// one; a turn never crosses into a session it does not belong to.
fn finalize_turn(shared: &Shared, session_id: &str, turn: Turn) -> Option<Turn> {
    let mut guard = shared.lock_session();
    match guard.as_mut() {
        Some(session) if session.id == session_id => {
            session.push_turn(turn.clone());
            Some(turn)
        }
        _ => {
            tracing::warn!(%session_id, "session replaced mid-call, discarding assistant turn");
            None
        }
    }
}

/// Handle to an in-flight streamed call.
///
/// `stop()` is safe from any state, including after completion (a no-op
/// then). Cancellation is checked before every callback, so on a
/// multi-threaded runtime a `stop()` racing an already-decoded event can
/// let at most one more callback fire; no turn is ever appended after
/// cancellation.
pub struct StreamHandle {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<Result<Option<Turn>>>,
}

impl StreamHandle {
    /// Abort the streamed call. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the call has finished (completed, failed, or cancelled).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Await the outcome of the call.
    ///
    /// Returns `Ok(Some(turn))` once the assistant turn was appended,
    /// `Ok(None)` when the call was cancelled before completion, and `Err`
    /// on transport failure (the user turn stays in history for retry).
    pub async fn finished(self) -> Result<Option<Turn>> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(EngineError::Network(format!("stream task failed: {e}"))),
        }
    }
}

/// Owns session identity and turn history, and exposes the engine's public
/// operations.
pub struct SessionManager {
    backend: BackendClient,
    streaming: StreamingClient,
    window: ContextWindow,
    policy: FallbackPolicy,
    top_k: u32,
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Build a manager from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on invalid configuration.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend: BackendClient::new(&config.backend)?,
            streaming: StreamingClient::new(&config.backend, &config.stream)?,
            window: ContextWindow::new(config.session.context_window_turns),
            policy: FallbackPolicy::new(config.session.confidence_threshold),
            top_k: config.backend.top_k,
            shared: Arc::new(Shared {
                session: Mutex::new(None),
                in_flight: AtomicBool::new(false),
            }),
        })
    }

    /// Start (or reuse) a session in the given language.
    ///
    /// Idempotent per language: with a live session in the same language this
    /// reuses it (touching `updated_at`); with a different language the
    /// session is replaced and its history dropped.
    ///
    /// Session identity is bootstrapped from `POST /session`; when the
    /// backend is unreachable a local id is generated instead, since the
    /// `session_id` field is optional on every chat call.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an unsupported language code and
    /// [`EngineError::SessionBusy`] when replacing the session while a call
    /// is in flight.
    pub async fn start(&self, language: &str) -> Result<Session> {
        if !is_supported_language(language) {
            return Err(EngineError::Config(format!(
                "unsupported language code: {language}"
            )));
        }

        if let Some(session) = self.shared.lock_session().as_mut()
            && session.live
            && session.language == language
        {
            session.touch();
            return Ok(session.clone());
        }

        // Replacing the session under an in-flight call would let that
        // call's assistant turn land in the fresh session.
        if self.shared.in_flight.load(Ordering::SeqCst) {
            return Err(EngineError::SessionBusy);
        }

        let id = self.bootstrap_session_id(language).await;
        let session = Session::new(id, language);
        tracing::info!(session_id = %session.id, language, "session started");
        *self.shared.lock_session() = Some(session.clone());
        Ok(session)
    }

    /// Replace the session with a fresh one in `language`, dropping history.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionBusy`] while a call is in flight and
    /// [`EngineError::Config`] for an unsupported language code.
    pub async fn change_language(&self, language: &str) -> Result<Session> {
        if !is_supported_language(language) {
            return Err(EngineError::Config(format!(
                "unsupported language code: {language}"
            )));
        }
        if self.shared.in_flight.load(Ordering::SeqCst) {
            return Err(EngineError::SessionBusy);
        }

        let id = self.bootstrap_session_id(language).await;
        let session = Session::new(id, language);
        tracing::info!(session_id = %session.id, language, "session restarted");
        *self.shared.lock_session() = Some(session.clone());
        Ok(session)
    }

    /// Drop all turns, keeping session identity and language.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotInitialized`] without a live session
    /// and [`EngineError::SessionBusy`] while a call is in flight.
    pub fn clear(&self) -> Result<()> {
        if self.shared.in_flight.load(Ordering::SeqCst) {
            return Err(EngineError::SessionBusy);
        }
        let mut guard = self.shared.lock_session();
        match guard.as_mut() {
            Some(session) if session.live => {
                session.clear_turns();
                Ok(())
            }
            _ => Err(EngineError::SessionNotInitialized),
        }
    }

    /// A snapshot of the current session, if one exists.
    pub fn session(&self) -> Option<Session> {
        self.shared.lock_session().clone()
    }

    /// Abort an in-flight streamed call. Safe in any state.
    pub fn stop(&self, handle: &StreamHandle) {
        handle.stop();
    }

    /// Send a message and wait for the complete answer (non-streamed).
    ///
    /// The user turn is appended optimistically before the call. A backend
    /// error is mapped to the localized fallback and still appended as an
    /// assistant turn; a transport error propagates, leaving the user turn
    /// in history so the caller may retry.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyMessage`], [`EngineError::SessionNotInitialized`],
    /// [`EngineError::SessionBusy`], [`EngineError::Network`].
    pub async fn send(&self, text: &str) -> Result<Turn> {
        let _guard = self.acquire_flight()?;
        let (request, language) = self.prepare_request(text)?;

        match self.backend.chat(&request).await {
            Ok(response) => {
                let turn = if response.has_fallback {
                    // The backend already substituted its own canned answer.
                    Turn::assistant(response.content, &language, Vec::new(), true)
                } else {
                    let decision = self.policy.evaluate(
                        response.content,
                        response.sources,
                        response.confidence,
                        &response.guardrails,
                        &language,
                    );
                    Turn::assistant(decision.content, &language, decision.sources, decision.fallback)
                };
                self.append_assistant(turn.clone());
                Ok(turn)
            }
            Err(EngineError::Backend(message)) => {
                tracing::warn!(%message, "backend error, substituting fallback turn");
                let turn = Turn::assistant(fallback_string(&language), &language, Vec::new(), true);
                self.append_assistant(turn.clone());
                Ok(turn)
            }
            Err(e) => Err(e),
        }
    }

    /// Send a message over the streamed endpoint.
    ///
    /// `on_token` fires for each text fragment in arrival order; `on_sources`
    /// fires when citations arrive. Callbacks stop once [`StreamHandle::stop`]
    /// is observed (see [`StreamHandle`] for the exact guarantee). Turn
    /// finalization is gated on the terminal `complete`/`error` event, never
    /// on a timer.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send); additionally every failure to establish
    /// the stream leaves the user turn in history.
    pub async fn send_streaming<F, G>(
        &self,
        text: &str,
        on_token: F,
        on_sources: G,
    ) -> Result<StreamHandle>
    where
        F: Fn(&str) + Send + 'static,
        G: Fn(&[Source]) + Send + 'static,
    {
        let guard = self.acquire_flight()?;
        let (request, language) = self.prepare_request(text)?;

        let cancel = CancellationToken::new();
        let session_id = request.session_id.clone().unwrap_or_default();
        let mut subscription = self.streaming.open(&request, cancel.clone()).await?;

        let shared = Arc::clone(&self.shared);
        let policy = self.policy;
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            let mut content = String::new();
            let mut sources: Vec<Source> = Vec::new();

            while let Some(item) = subscription.next().await {
                // The subscription stops yielding after cancellation; the
                // extra check closes the race between an already-decoded
                // event and a concurrent stop().
                if task_cancel.is_cancelled() {
                    return Ok(None);
                }
                match item {
                    Ok(StreamEvent::Token { text }) => {
                        content.push_str(&text);
                        on_token(&text);
                    }
                    Ok(StreamEvent::Sources { sources: cited }) => {
                        sources = cited;
                        on_sources(&sources);
                    }
                    Ok(StreamEvent::Complete {
                        confidence,
                        guardrails,
                    }) => {
                        let decision =
                            policy.evaluate(content, sources, confidence, &guardrails, &language);
                        let turn = Turn::assistant(
                            decision.content,
                            &language,
                            decision.sources,
                            decision.fallback,
                        );
                        return Ok(finalize_turn(&shared, &session_id, turn));
                    }
                    Ok(StreamEvent::Error { message }) => {
                        tracing::warn!(%message, "stream error frame, substituting fallback turn");
                        let turn =
                            Turn::assistant(fallback_string(&language), &language, Vec::new(), true);
                        return Ok(finalize_turn(&shared, &session_id, turn));
                    }
                    Err(e) => return Err(e),
                }
            }

            // Silent close: the subscription was cancelled.
            Ok(None)
        });

        Ok(StreamHandle { cancel, task })
    }

    // ── Internals ──────────────────────────────────────────────

    /// Claim the single in-flight slot or fail fast.
    fn acquire_flight(&self) -> Result<FlightGuard> {
        self.shared
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::SessionBusy)?;
        Ok(FlightGuard(Arc::clone(&self.shared)))
    }

    /// Validate input, window the history, and append the user turn.
    ///
    /// The window is projected over the turns preceding this query; the query
    /// itself travels in the `query` field, not in `chat_history`.
    fn prepare_request(&self, text: &str) -> Result<(ChatRequest, String)> {
        let query = text.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let mut guard = self.shared.lock_session();
        let session = match guard.as_mut() {
            Some(session) if session.live => session,
            _ => return Err(EngineError::SessionNotInitialized),
        };

        let history: Vec<HistoryMessage> = self.window.project(&session.turns);
        let language = session.language.clone();
        let request = ChatRequest {
            query: query.to_owned(),
            language: language.clone(),
            session_id: Some(session.id.clone()),
            chat_history: history,
            top_k: Some(self.top_k),
            filters: None,
        };

        session.push_turn(Turn::user(query, &language));
        Ok((request, language))
    }

    fn append_assistant(&self, turn: Turn) {
        if let Some(session) = self.shared.lock_session().as_mut() {
            session.push_turn(turn);
        }
    }

    async fn bootstrap_session_id(&self, language: &str) -> String {
        match self.backend.create_session(language).await {
            Ok(id) => id,
            Err(e) => {
                let id = uuid::Uuid::new_v4().to_string();
                tracing::warn!(error = %e, %id, "session bootstrap failed, using local id");
                id
            }
        }
    }
}
