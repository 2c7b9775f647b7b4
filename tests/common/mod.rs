//! In-process mock of the Lacework API for integration tests.
//!
//! `POST /api/v2/access/tokens` hands out `tok-1`, `tok-2`, ... Every other
//! request is recorded and answered from a scripted queue; an empty queue
//! answers `200 {"data": []}`. A scripted answer may be delayed to simulate
//! a hung upstream.

#![allow(dead_code)]

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::post;
use chrono::Utc;
use lacework_mcp_server::config::Config;
use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<JsonValue>,
    pub authorization: Option<String>,
    pub subaccount: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    pub token_requests: AtomicUsize,
    /// Status returned by the token endpoint. 0 means 201.
    pub token_status: AtomicU16,
    pub token_bodies: Mutex<Vec<(HeaderMap, JsonValue)>>,
    pub requests: Mutex<Vec<RecordedRequest>>,
    script: Mutex<VecDeque<(u16, JsonValue, Duration)>>,
}

pub struct MockLacework {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockLacework {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/v2/access/tokens", post(issue_token))
            .fallback(api)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api/v2", addr),
            state,
        }
    }

    /// Queue a response for the next API call.
    pub fn respond(&self, status: u16, body: JsonValue) {
        self.respond_after(Duration::ZERO, status, body);
    }

    /// Queue a response that is only sent after `delay`.
    pub fn respond_after(&self, delay: Duration, status: u16, body: JsonValue) {
        self.state
            .script
            .lock()
            .unwrap()
            .push_back((status, body, delay));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn fail_tokens_with(&self, status: u16) {
        self.state.token_status.store(status, Ordering::SeqCst);
    }

    /// Configuration pointing at this mock with fast retries.
    pub fn config(&self) -> Config {
        Config {
            account: Some("mockcorp".to_string()),
            key_id: Some("MOCK_KEY".to_string()),
            secret: Some("_mock_secret".to_string()),
            subaccount: Some("tenant-a".to_string()),
            base_url: Some(self.base_url.clone()),
            retry_base_ms: 5,
            request_timeout: 1,
            connect_timeout: 2,
            trust_env: false,
            ..Config::default()
        }
    }
}

async fn issue_token(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    state.token_bodies.lock().unwrap().push((headers, body));

    let status = state.token_status.load(Ordering::SeqCst);
    if status != 0 {
        return (
            StatusCode::from_u16(status).unwrap(),
            Json(json!({"message": "Invalid API key"})),
        );
    }
    let expires_at = Utc::now() + chrono::Duration::hours(1);
    (
        StatusCode::CREATED,
        Json(json!({
            "token": format!("tok-{}", n),
            "expiresAt": expires_at.to_rfc3339(),
        })),
    )
}

async fn api(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<JsonValue>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(String::from),
        body: serde_json::from_slice(&body).ok(),
        authorization: header("authorization"),
        subaccount: header("x-lw-sub-account"),
    });

    let (status, body, delay) = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((200, json!({"data": []}), Duration::ZERO));
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    (StatusCode::from_u16(status).unwrap(), Json(body))
}
