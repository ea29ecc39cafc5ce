//! Streamed Chat Contract Tests
//!
//! Verifies the `/chat/stream` consumption path end to end:
//! - Frame decoding and event ordering across the session layer
//! - Terminal handling: complete, error frame, premature close
//! - Confidence gating applied to the assembled answer
//! - Watchdog timeout and cancellation against a stalling server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use vaani::backend::ChatRequest;
use vaani::fallback::fallback_string;
use vaani::stream::{StreamEvent, StreamingClient};
use vaani::types::{Role, Source};
use vaani::{EngineConfig, EngineError, SessionManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(uri: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.backend.base_url = uri.to_owned();
    config
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "s-1" })))
        .mount(server)
        .await;
}

async fn mount_stream(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.to_owned(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

fn token_collector() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + 'static) {
    let tokens: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tokens);
    let callback = move |token: &str| {
        if let Ok(mut seen) = sink.lock() {
            seen.push(token.to_owned());
        }
    };
    (tokens, callback)
}

// ────────────────────────────────────────────────────────────────────────────
// Happy path
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn streamed_answer_assembles_in_order() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_stream(
        &server,
        concat!(
            "data: {\"type\":\"token\",\"text\":\"The\"}\n\n",
            "data: {\"type\":\"token\",\"text\":\" Taj\"}\n\n",
            "data: {\"type\":\"token\",\"text\":\" Mahal is a mausoleum.\"}\n\n",
            "data: {\"type\":\"sources\",\"sources\":[{\"title\":\"Taj Mahal\",\"url\":\"https://asi.nic.in/taj\",\"score\":0.91}]}\n\n",
            "data: {\"type\":\"complete\",\"confidence\":0.92}\n\n",
        ),
    )
    .await;

    let manager = SessionManager::new(&config_for(&server.uri())).expect("manager");
    manager.start("en").await.expect("start");

    let (tokens, on_token) = token_collector();
    let sources_seen = Arc::new(Mutex::new(0_usize));
    let sources_sink = Arc::clone(&sources_seen);

    let handle = manager
        .send_streaming("What is the Taj Mahal?", on_token, move |sources| {
            if let Ok(mut count) = sources_sink.lock() {
                *count += sources.len();
            }
        })
        .await
        .expect("open stream");

    let turn = handle.finished().await.expect("finished").expect("turn");
    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.content, "The Taj Mahal is a mausoleum.");
    assert!(!turn.fallback);
    assert_eq!(turn.sources.len(), 1);

    let seen = tokens.lock().expect("tokens").clone();
    assert_eq!(seen, vec!["The", " Taj", " Mahal is a mausoleum."]);
    assert_eq!(*sources_seen.lock().expect("count"), 1);

    let session = manager.session().expect("session");
    assert_eq!(session.turns.len(), 2);
    assert_eq!(session.turns[1].content, turn.content);
}

#[tokio::test]
async fn low_confidence_complete_substitutes_fallback() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_stream(
        &server,
        concat!(
            "data: {\"type\":\"token\",\"text\":\"maybe...\"}\n\n",
            "data: {\"type\":\"complete\",\"confidence\":0.30}\n\n",
        ),
    )
    .await;

    let manager = SessionManager::new(&config_for(&server.uri())).expect("manager");
    manager.start("hi").await.expect("start");

    let (_, on_token) = token_collector();
    let handle = manager
        .send_streaming("ताज महल कहाँ है?", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    let turn = handle.finished().await.expect("finished").expect("turn");
    assert!(turn.fallback);
    assert_eq!(turn.content, fallback_string("hi"));
    assert!(turn.sources.is_empty());
}

#[tokio::test]
async fn error_frame_yields_fallback_turn() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_stream(
        &server,
        concat!(
            "data: {\"type\":\"token\",\"text\":\"partial \"}\n\n",
            "data: {\"type\":\"error\",\"message\":\"retrieval index unavailable\"}\n\n",
        ),
    )
    .await;

    let manager = SessionManager::new(&config_for(&server.uri())).expect("manager");
    manager.start("en").await.expect("start");

    let (_, on_token) = token_collector();
    let handle = manager
        .send_streaming("anything", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    let turn = handle.finished().await.expect("finished").expect("turn");
    assert!(turn.fallback);
    assert_eq!(turn.content, fallback_string("en"));

    let session = manager.session().expect("session");
    assert_eq!(session.turns.len(), 2);
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_stream(
        &server,
        concat!(
            "data: this is not json\n\n",
            ": keepalive comment\n\n",
            "data: {\"type\":\"token\",\"text\":\"ok\"}\n\n",
            "data: {\"type\":\"complete\"}\n\n",
        ),
    )
    .await;

    let manager = SessionManager::new(&config_for(&server.uri())).expect("manager");
    manager.start("en").await.expect("start");

    let (tokens, on_token) = token_collector();
    let handle = manager
        .send_streaming("anything", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    let turn = handle.finished().await.expect("finished").expect("turn");
    assert_eq!(turn.content, "ok");
    assert_eq!(tokens.lock().expect("tokens").as_slice(), ["ok"]);
}

// ────────────────────────────────────────────────────────────────────────────
// Failure modes
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn premature_close_is_a_transport_error() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    // Tokens but no terminal frame before the body ends.
    mount_stream(
        &server,
        "data: {\"type\":\"token\",\"text\":\"half an ans\"}\n\n",
    )
    .await;

    let manager = SessionManager::new(&config_for(&server.uri())).expect("manager");
    manager.start("en").await.expect("start");

    let (_, on_token) = token_collector();
    let handle = manager
        .send_streaming("anything", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    let result = handle.finished().await;
    assert!(matches!(result, Err(EngineError::Network(_))));

    // The user turn stays for retry; no assistant turn was appended.
    let session = manager.session().expect("session");
    assert_eq!(session.turns.len(), 1);
    assert_eq!(session.turns[0].role, Role::User);
}

#[tokio::test]
async fn non_2xx_rejection_maps_to_backend_error() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"detail": "rate limited"})))
        .mount(&server)
        .await;

    let manager = SessionManager::new(&config_for(&server.uri())).expect("manager");
    manager.start("en").await.expect("start");

    let (_, on_token) = token_collector();
    let result = manager.send_streaming("anything", on_token, |_: &[Source]| {}).await;
    assert!(matches!(result, Err(EngineError::Backend(m)) if m.contains("rate limited")));
}

// ────────────────────────────────────────────────────────────────────────────
// Stalling server: watchdog and cancellation
// ────────────────────────────────────────────────────────────────────────────

/// Minimal HTTP server that answers `POST /session` normally, and answers
/// everything else with a chunked event-stream that sends `frames` and then
/// stalls without closing.
async fn stalling_server(frames: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0_u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();

                if head.starts_with("POST /session") {
                    let body = r#"{"session_id":"s-stall"}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    return;
                }

                let header = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
                let _ = socket.write_all(header.as_bytes()).await;
                if !frames.is_empty() {
                    let chunk = format!("{:x}\r\n{}\r\n", frames.len(), frames);
                    let _ = socket.write_all(chunk.as_bytes()).await;
                }
                let _ = socket.flush().await;
                // Hold the connection open, sending nothing further.
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });

    format!("http://{addr}")
}

/// Like [`stalling_server`], but after `first` the stream pauses for `gap`,
/// then delivers `rest` and closes cleanly.
async fn paced_server(first: &'static str, rest: &'static str, gap: Duration) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0_u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();

                if head.starts_with("POST /session") {
                    let body = r#"{"session_id":"s-paced"}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    return;
                }

                let header = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
                let _ = socket.write_all(header.as_bytes()).await;
                let chunk = format!("{:x}\r\n{}\r\n", first.len(), first);
                let _ = socket.write_all(chunk.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(gap).await;
                let chunk = format!("{:x}\r\n{}\r\n0\r\n\r\n", rest.len(), rest);
                let _ = socket.write_all(chunk.as_bytes()).await;
            });
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn start_cannot_replace_the_session_mid_stream() {
    let uri = paced_server(
        "data: {\"type\":\"token\",\"text\":\"English answer\"}\n\n",
        "data: {\"type\":\"complete\",\"confidence\":0.9}\n\n",
        Duration::from_millis(400),
    )
    .await;

    let manager = SessionManager::new(&config_for(&uri)).expect("manager");
    manager.start("en").await.expect("start");

    let (tokens, on_token) = token_collector();
    let handle = manager
        .send_streaming("a question in English", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    // Wait until the call is demonstrably mid-stream.
    for _ in 0..100 {
        if !tokens.lock().expect("tokens").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A language switch now would adopt this call's answer as an orphan
    // assistant turn; it must be rejected instead.
    assert!(matches!(
        manager.start("hi").await,
        Err(EngineError::SessionBusy)
    ));
    // Same-language reuse never replaces the session.
    let same = manager.start("en").await.expect("same-language start");
    assert_eq!(same.language, "en");

    let turn = handle.finished().await.expect("finished").expect("turn");
    assert_eq!(turn.content, "English answer");

    let session = manager.session().expect("session");
    assert_eq!(session.language, "en");
    assert_eq!(session.turns.len(), 2);
    assert_eq!(session.turns[0].role, Role::User);
    assert_eq!(session.turns[1].language, "en");
}

#[tokio::test]
async fn watchdog_aborts_a_silent_stream() {
    let uri = stalling_server("").await;
    let mut config = config_for(&uri);
    config.stream.watchdog_secs = 1;

    let manager = SessionManager::new(&config).expect("manager");
    manager.start("en").await.expect("start");

    let (tokens, on_token) = token_collector();
    let handle = manager
        .send_streaming("anything", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    let result = handle.finished().await;
    assert!(matches!(result, Err(EngineError::StreamTimeout(_))));
    assert!(tokens.lock().expect("tokens").is_empty());

    let session = manager.session().expect("session");
    assert_eq!(session.turns.len(), 1);
}

#[tokio::test]
async fn stop_cancels_without_appending_a_turn() {
    let uri =
        stalling_server("data: {\"type\":\"token\",\"text\":\"The \"}\n\n").await;
    let manager = SessionManager::new(&config_for(&uri)).expect("manager");
    manager.start("en").await.expect("start");

    let (tokens, on_token) = token_collector();
    let handle = manager
        .send_streaming("anything", on_token, |_: &[Source]| {})
        .await
        .expect("open stream");

    // Wait for the first token to arrive, then abort.
    for _ in 0..100 {
        if !tokens.lock().expect("tokens").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.stop();
    handle.stop(); // idempotent

    let outcome = handle.finished().await.expect("finished");
    assert!(outcome.is_none());

    let session = manager.session().expect("session");
    assert_eq!(session.turns.len(), 1);
    let count = tokens.lock().expect("tokens").len();
    assert!(count <= 1);

    // The slot is free again once the task has wound down.
    let (_, on_token) = token_collector();
    let second = manager.send_streaming("retry", on_token, |_: &[Source]| {}).await;
    assert!(second.is_ok() || matches!(second, Err(EngineError::SessionBusy)));
}

// ────────────────────────────────────────────────────────────────────────────
// StreamingClient directly
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscription_yields_nothing_after_terminal_event() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        concat!(
            "data: {\"type\":\"complete\",\"confidence\":0.9}\n\n",
            "data: {\"type\":\"token\",\"text\":\"stray\"}\n\n",
        ),
    )
    .await;

    let config = config_for(&server.uri());
    let client = StreamingClient::new(&config.backend, &config.stream).expect("client");
    let request = ChatRequest {
        query: "q".into(),
        language: "en".into(),
        session_id: None,
        chat_history: Vec::new(),
        top_k: None,
        filters: None,
    };

    let mut subscription = client
        .open(&request, CancellationToken::new())
        .await
        .expect("open");

    let first = subscription.next().await;
    assert!(matches!(
        first,
        Some(Ok(StreamEvent::Complete { .. }))
    ));
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn pre_cancelled_token_yields_nothing() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        "data: {\"type\":\"token\",\"text\":\"x\"}\n\ndata: {\"type\":\"complete\"}\n\n",
    )
    .await;

    let config = config_for(&server.uri());
    let client = StreamingClient::new(&config.backend, &config.stream).expect("client");
    let request = ChatRequest {
        query: "q".into(),
        language: "en".into(),
        session_id: None,
        chat_history: Vec::new(),
        top_k: None,
        filters: None,
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut subscription = client.open(&request, cancel).await.expect("open");
    assert!(subscription.next().await.is_none());
}
