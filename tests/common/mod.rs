//! Shared helpers: a local OpenAI-compatible provider and dataset builders.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

pub const GOOD_KEY: &str = "gsk_valid_test_key";

/// How the mock provider behaves for each request.
#[derive(Clone, Copy)]
pub enum Behaviour {
    /// Checks the bearer credential and echoes the row count back.
    Normal,
    /// Answers 503 for the first `n` requests, then behaves normally.
    FailFirst(usize),
    /// Always answers 429.
    RateLimited,
    /// Sleeps before answering normally.
    Slow(Duration),
    /// 200 with an empty completion.
    Empty,
}

#[derive(Clone)]
pub struct MockProvider {
    behaviour: Behaviour,
    pub calls: Arc<AtomicUsize>,
}

pub struct RunningProvider {
    pub base_url: String,
    pub calls: Arc<AtomicUsize>,
}

impl RunningProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub async fn spawn_provider(behaviour: Behaviour) -> RunningProvider {
    let provider = MockProvider {
        behaviour,
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let calls = provider.calls.clone();

    let router = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(provider);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    RunningProvider {
        base_url: format!("http://{}/v1", addr),
        calls,
    }
}

/// An address nothing listens on.
pub async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/v1", addr)
}

async fn chat_completions(
    State(provider): State<MockProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let call = provider.calls.fetch_add(1, Ordering::SeqCst);

    match provider.behaviour {
        Behaviour::FailFirst(n) if call < n => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"message": "upstream overloaded"}})),
            );
        }
        Behaviour::RateLimited => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "Rate limit reached", "type": "tokens"}})),
            );
        }
        Behaviour::Slow(delay) => tokio::time::sleep(delay).await,
        _ => {}
    }

    let expected = format!("Bearer {}", GOOD_KEY);
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == expected);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {
                "message": "Invalid API Key",
                "type": "invalid_request_error",
                "code": "invalid_api_key"
            }})),
        );
    }

    if matches!(provider.behaviour, Behaviour::Empty) {
        return (StatusCode::OK, Json(json!({"choices": [{"message": {"content": ""}}]})));
    }

    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
    let rows_line = prompt
        .lines()
        .find(|line| line.contains("Total Rows"))
        .unwrap_or("")
        .trim()
        .to_string();

    (
        StatusCode::OK,
        Json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": format!("- **Issue 1:** duplicate rows\n- **Code:** df.drop_duplicates()\n{}", rows_line)
                }
            }]
        })),
    )
}

pub fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture_bytes(name: &str) -> bytes::Bytes {
    bytes::Bytes::from(std::fs::read(fixtures_path().join(name)).unwrap())
}
