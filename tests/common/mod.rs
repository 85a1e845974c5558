//! Shared fixtures for the conformance suite: the sample configuration and an
//! in-process mock of the Optiply token endpoint and REST API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use target_optiply::{ApiCredentials, Target, TargetConfig};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

pub const TOKEN_PATH: &str = "/oauth/token";

/// Label of the external resource the suite runs against.
pub fn resource() -> &'static str {
    "resource"
}

/// Sample configuration pointed at `mock`.
pub fn sample_config(mock: &MockOptiply) -> Value {
    json!({
        "auth_url": mock.auth_url(),
        "api_url": mock.api_url(),
        "api_credentials": {
            "username": "user@example.com",
            "password": "s3cret",
            "basic_token": "Y2xpZW50OnNlY3JldA==",
            "account_id": 101,
            "coupling_id": 202
        },
        "backoff_factor_ms": 1
    })
}

/// Credentials of [`sample_config`].
pub fn sample_credentials() -> ApiCredentials {
    ApiCredentials {
        username: "user@example.com".into(),
        password: "s3cret".into(),
        basic_token: "Y2xpZW50OnNlY3JldA==".into(),
        account_id: Some(101),
        coupling_id: Some(202),
    }
}

/// An `http://` URL on a local port nothing listens on.
pub async fn closed_port_url(path: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind scratch port");
    let addr = listener.local_addr().expect("scratch port address");
    drop(listener);
    format!("http://{addr}{path}")
}

pub fn target_with(config: Value) -> Target {
    let config = TargetConfig::from_value(config, None).expect("sample config is valid");
    Target::new(config).expect("target builds")
}

/// Join message lines the way a tap writes them.
pub fn messages(lines: &[Value]) -> String {
    lines
        .iter()
        .map(|line| format!("{line}\n"))
        .collect()
}

pub fn schema(stream: &str) -> Value {
    json!({
        "type": "SCHEMA",
        "stream": stream,
        "schema": {"type": "object", "properties": {}},
        "key_properties": ["id"]
    })
}

pub fn record(stream: &str, record: Value) -> Value {
    json!({"type": "RECORD", "stream": stream, "record": record})
}

pub fn state(value: Value) -> Value {
    json!({"type": "STATE", "value": value})
}

/// Counts the retry warnings the API client logs.
#[derive(Clone, Default)]
pub struct RetryCounter(Arc<AtomicUsize>);

impl RetryCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for RetryCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == tracing::Level::WARN && meta.target() == "target_optiply::client" {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub form: HashMap<String, String>,
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    token_requests: Mutex<Vec<TokenRequest>>,
    statuses: Mutex<VecDeque<u16>>,
    delays: Mutex<VecDeque<Duration>>,
    token_delay: Mutex<Duration>,
    token_status: AtomicU16,
    issued: AtomicUsize,
}

/// Mock Optiply service listening on an ephemeral local port.
pub struct MockOptiply {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: tokio::task::JoinHandle<()>,
}

impl MockOptiply {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        state.token_status.store(200, Ordering::SeqCst);

        let app = Router::new()
            .route(TOKEN_PATH, post(token))
            .fallback(api)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn auth_url(&self) -> String {
        format!("http://{}{}", self.addr, TOKEN_PATH)
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Statuses returned by the next API calls, in order. 201 afterwards.
    pub fn respond_with(&self, statuses: &[u16]) {
        self.state
            .statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }

    /// Hold the next API responses for these durations, in order.
    pub fn delay_responses(&self, delays: &[Duration]) {
        self.state
            .delays
            .lock()
            .unwrap()
            .extend(delays.iter().copied());
    }

    /// Hold every token response for `delay`.
    pub fn slow_token_endpoint(&self, delay: Duration) {
        *self.state.token_delay.lock().unwrap() = delay;
    }

    pub fn fail_token_requests(&self, status: u16) {
        self.state.token_status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.state.token_requests.lock().unwrap().clone()
    }
}

impl Drop for MockOptiply {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn token(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.token_requests.lock().unwrap().push(TokenRequest {
        query,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        form,
    });

    let delay = *state.token_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(state.token_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_success() {
        return (status, Json(json!({"error": "invalid_grant"})));
    }

    let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
    (
        status,
        Json(json!({
            "access_token": format!("token-{n}"),
            "refresh_token": format!("refresh-{n}"),
            "expires_in": 3600
        })),
    )
}

async fn api(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let delay = state.delays.lock().unwrap().pop_front();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let status = state.statuses.lock().unwrap().pop_front().unwrap_or(201);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = if status.is_success() {
        json!({"data": {"id": 1}}).to_string()
    } else {
        json!({"errors": [{"status": status.as_u16().to_string()}]}).to_string()
    };
    (status, body)
}
