//! The JSON-RPC endpoint.
//!
//! `POST {path}` carries one JSON-RPC frame. Non-streaming outcomes come
//! back as a JSON body; streaming tool calls come back as an SSE body
//! whose last event is the terminal JSON-RPC response. When the caller
//! disconnects mid-stream, axum drops the response stream, which drops
//! the translator and the upstream connection with it.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use pb_mcp::bridge::stream_complete_result;
use pb_mcp::protocol::{JsonRpcError, JsonRpcMessage, JsonRpcResponse};
use pb_mcp::{Bridge, RequestOutcome};
use pb_types::StreamEvent;

pub fn router(bridge: Arc<Bridge>) -> Router {
    let path = bridge.config().path.clone();
    Router::new()
        .route(&path, post(handle_rpc).get(endpoint_info))
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

async fn endpoint_info() -> Response {
    (
        StatusCode::OK,
        "Pattern Bridge\n\
         \n\
         POST one JSON-RPC 2.0 frame to this path.\n\
         Streaming tool calls answer with a text/event-stream body;\n\
         everything else answers with a JSON body.\n",
    )
        .into_response()
}

async fn handle_rpc(State(bridge): State<Arc<Bridge>>, body: String) -> Response {
    let message: JsonRpcMessage = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::parse_error(format!("unparseable frame: {e}")),
            ))
            .into_response();
        }
    };

    let request = match message {
        JsonRpcMessage::Request(request) => request,
        JsonRpcMessage::Notification(notification) => {
            debug!(method = %notification.method, "acknowledging notification");
            return StatusCode::ACCEPTED.into_response();
        }
        JsonRpcMessage::Response(_) => {
            warn!("dropping unexpected response frame on the request endpoint");
            return StatusCode::ACCEPTED.into_response();
        }
    };

    match bridge.handle_request(request).await {
        RequestOutcome::Response(response) => Json(response).into_response(),
        RequestOutcome::Stream { id, events } => {
            let stream = events.map(move |event| Ok::<Event, Infallible>(frame_event(&id, event)));
            Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
    }
}

/// Frame one stream event for the SSE body. Incremental events are named
/// `chunk`/`progress`; the single terminal event is named `response` and
/// carries the full JSON-RPC response, so callers get exactly one
/// success-or-failure verdict per invocation.
fn frame_event(id: &Value, event: StreamEvent) -> Event {
    let (name, payload) = match event {
        StreamEvent::Chunk { content, format } => (
            "chunk",
            json!({"id": id, "content": content, "format": format}),
        ),
        StreamEvent::Progress { metadata } => {
            ("progress", json!({"id": id, "metadata": metadata}))
        }
        StreamEvent::Complete { summary } => {
            let response = JsonRpcResponse::success(id.clone(), stream_complete_result(&summary));
            ("response", json!(response))
        }
        StreamEvent::Failed { error } => {
            let response = JsonRpcResponse::error(id.clone(), JsonRpcError::from_bridge(&error));
            ("response", json!(response))
        }
    };
    Event::default()
        .event(name)
        .json_data(&payload)
        .unwrap_or_else(|e| {
            warn!(%e, "failed to frame stream event");
            Event::default().event("response").data("{}")
        })
}
