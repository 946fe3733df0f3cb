//! A mock upstream pattern service for integration tests.
//!
//! Serves the documented REST contract with predictable fixture data on
//! an ephemeral port, plus a few reserved pattern names that trigger the
//! failure modes tests care about:
//!
//! - `explode` — the run endpoint answers 500;
//! - `slow` — the run endpoint stalls long enough to trip client timeouts;
//! - `malformed_result` — the run endpoint answers with the wrong shape;
//! - `drop_mid_stream` — a streaming run dies without a terminal fragment;
//! - `malformed_stream` — a streaming run emits an undecodable fragment.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::debug;

const PATTERN_NAMES: &[&str] = &["summarize", "extract_insights"];

#[derive(Clone)]
struct MockState {
    api_key: Option<String>,
    hits: Arc<AtomicUsize>,
}

/// Handle to a running mock upstream. Dropping it stops the server.
pub struct MockUpstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    /// Start an unauthenticated mock on an ephemeral port.
    pub async fn spawn() -> Self {
        Self::start(None).await
    }

    /// Start a mock that rejects requests lacking the given `X-API-Key`.
    pub async fn spawn_with_api_key(key: &str) -> Self {
        Self::start(Some(key.to_string())).await
    }

    async fn start(api_key: Option<String>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = MockState {
            api_key,
            hits: hits.clone(),
        };
        let app = router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        debug!(%addr, "mock upstream listening");
        Self { addr, hits, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests that reached the service.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: MockState) -> Router {
    Router::new()
        .route("/patterns/names", get(pattern_names))
        .route("/patterns/{name}", get(pattern_detail))
        .route("/patterns/{name}/run", post(run_pattern))
        .route("/models/names", get(model_names))
        .route("/strategies", get(strategies))
        .route("/config", get(configuration))
        .with_state(state)
}

/// 401 unless the configured key matches, mirroring how the real service
/// guards its API.
fn check_key(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let expected = state.api_key.as_deref()?;
    let presented = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());
    if presented == Some(expected) {
        None
    } else {
        Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "invalid or missing API key"})),
            )
                .into_response(),
        )
    }
}

async fn pattern_names(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_key(&state, &headers) {
        return denied;
    }
    Json(json!(PATTERN_NAMES)).into_response()
}

fn pattern_fixture(name: &str) -> Option<Value> {
    match name {
        "summarize" => Some(json!({
            "name": "summarize",
            "content": "# IDENTITY\n\nYou are an expert content summarizer.\n\n## INPUT\n\nINPUT:",
            "metadata": {"author": "x", "version": "1.0", "tags": ["a"]},
        })),
        "extract_insights" => Some(json!({
            "name": "extract_insights",
            "content": "# IDENTITY\n\nYou extract surprising insights from text.\n\n## INPUT\n\nINPUT:",
            "metadata": {"author": "y", "version": "2.0", "tags": ["analysis", "insight"]},
        })),
        _ => None,
    }
}

async fn pattern_detail(
    State(state): State<MockState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = check_key(&state, &headers) {
        return denied;
    }
    match pattern_fixture(&name) {
        Some(detail) => Json(detail).into_response(),
        None => not_found(&name),
    }
}

async fn run_pattern(
    State(state): State<MockState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = check_key(&state, &headers) {
        return denied;
    }

    let wants_stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let input = body.get("input").and_then(Value::as_str).unwrap_or("");
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("gpt-4o")
        .to_string();

    match name.as_str() {
        "explode" => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "internal failure"})),
            )
                .into_response();
        }
        "slow" => tokio::time::sleep(Duration::from_secs(5)).await,
        "malformed_result" => {
            return Json(json!({"weird": true})).into_response();
        }
        "drop_mid_stream" | "malformed_stream" => {
            if wants_stream {
                return faulty_stream(&name);
            }
        }
        other if pattern_fixture(other).is_none() => return not_found(other),
        _ => {}
    }

    if wants_stream {
        let chunks = vec![
            sse_content(&format!("Mock {name} output ")),
            sse_content(&format!("for input: {input}")),
            sse_line(&json!({"type": "complete"})),
        ];
        return sse_response(chunks.into_iter().map(Ok).collect());
    }

    Json(json!({
        "output_format": "text",
        "output_text": format!("Mock {name} output for input: {input}"),
        "model_used": model,
        "tokens_used": 10,
        "execution_time_ms": 5,
    }))
    .into_response()
}

fn faulty_stream(name: &str) -> Response {
    match name {
        // Emit one real chunk, yield so hyper flushes the response head
        // and that chunk to the client, then sever the connection with no
        // terminal fragment. Without the await point the body stream would
        // resolve `Ok` then `Err` synchronously and hyper would abort
        // before sending headers, surfacing as a failed send rather than
        // the mid-stream drop this fixture is meant to simulate.
        "drop_mid_stream" => {
            let frames = futures::stream::unfold(0u8, |step| async move {
                match step {
                    0 => Some((
                        Ok(sse_content("partial output before the connection dies")),
                        1,
                    )),
                    1 => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Some((
                            Err(std::io::Error::new(
                                std::io::ErrorKind::ConnectionReset,
                                "connection reset by peer",
                            )),
                            2,
                        ))
                    }
                    _ => None,
                }
            });
            sse_response_stream(Body::from_stream(frames))
        }
        _ => sse_response(vec![
            Ok(sse_content("one good chunk")),
            Ok("data: {this is not json}\n\n".to_string()),
        ]),
    }
}

fn sse_content(text: &str) -> String {
    sse_line(&json!({"type": "content", "content": text, "format": "text"}))
}

fn sse_line(fragment: &Value) -> String {
    format!("data: {fragment}\n\n")
}

fn sse_response(frames: Vec<Result<String, std::io::Error>>) -> Response {
    sse_response_stream(Body::from_stream(futures::stream::iter(frames)))
}

fn sse_response_stream(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .expect("static response parts are valid")
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": format!("Pattern '{name}' not found")})),
    )
        .into_response()
}

async fn model_names(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_key(&state, &headers) {
        return denied;
    }
    Json(json!({
        "models": ["gpt-4o", "gpt-3.5-turbo", "claude-3-opus", "llama2"],
        "vendors": {
            "openai": ["gpt-4o", "gpt-3.5-turbo"],
            "anthropic": ["claude-3-opus"],
            "ollama": ["llama2"],
        },
    }))
    .into_response()
}

async fn strategies(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_key(&state, &headers) {
        return denied;
    }
    Json(json!([
        {
            "name": "default",
            "description": "Default strategy for pattern execution",
            "prompt": "Execute the pattern with balanced parameters",
        },
        {
            "name": "creative",
            "description": "Higher temperature for more varied output",
            "prompt": "Execute the pattern with enhanced creativity",
        },
        {
            "name": "focused",
            "description": "Lower temperature for consistent output",
            "prompt": "Execute the pattern with precision",
        },
        // Deliberately invalid: listings must skip it, not fail.
        {"name": "", "description": "nameless strategy", "prompt": ""},
    ]))
    .into_response()
}

async fn configuration(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_key(&state, &headers) {
        return denied;
    }
    Json(json!({
        "openai_api_key": "sk-test123456789",
        "anthropic_api_key": "ant-test987654321",
        "google_api_key": "",
        "fabric_token": "fabric_secret_token_123",
        "database_secret": "db_secret_password",
        "user_password": "test_user_password",
        "empty_secret": "",
        "api_timeout": 30,
        "fabric_config_dir": "~/.config/fabric",
        "default_model": "gpt-4",
        "debug_mode": false,
        "allowed_patterns": ["summarize", "analyze"],
    }))
    .into_response()
}
