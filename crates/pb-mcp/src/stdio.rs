//! Local-channel transport: newline-delimited JSON-RPC over stdin/stdout.
//!
//! One framed request is read and answered at a time, in FIFO order; the
//! channel is private to a single caller process, so there is nothing to
//! interleave. All logging goes to stderr — stdout belongs to the
//! protocol.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use pb_types::{BridgeResult, StreamEvent};

use crate::bridge::{stream_complete_result, Bridge, RequestOutcome};
use crate::protocol::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcResponse};
use crate::Transport;

/// Method used for incremental events between a streaming call's request
/// and its terminal response.
pub const STREAM_NOTIFICATION_METHOD: &str = "notifications/stream";

#[derive(Default)]
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn serve(self, bridge: Arc<Bridge>) -> BridgeResult<()> {
        info!("serving on stdio");

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut writer = tokio::io::stdout();
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                // EOF: the caller hung up. Anything in flight was already
                // answered; just stop.
                info!("stdin closed, shutting down");
                return Ok(());
            }

            let frame = line.trim();
            if frame.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcMessage>(frame) {
                Ok(JsonRpcMessage::Request(request)) => {
                    let outcome = bridge.handle_request(request).await;
                    deliver(&mut writer, outcome).await?;
                }
                Ok(JsonRpcMessage::Notification(notification)) => {
                    debug!(method = %notification.method, "ignoring notification");
                }
                Ok(JsonRpcMessage::Response(_)) => {
                    warn!("dropping unexpected response frame on the request channel");
                }
                Err(e) => {
                    let response = JsonRpcResponse::error(
                        Value::Null,
                        JsonRpcError::parse_error(format!("unparseable frame: {e}")),
                    );
                    write_frame(&mut writer, &response).await?;
                }
            }
        }
    }
}

/// Deliver one request's outcome. A streaming outcome is unrolled into
/// notifications followed by exactly one terminal response; a write
/// failure drops the event stream, which cancels the upstream call.
async fn deliver<W>(writer: &mut W, outcome: RequestOutcome) -> BridgeResult<()>
where
    W: AsyncWrite + Unpin + Send,
{
    match outcome {
        RequestOutcome::Response(response) => write_frame(writer, &response).await,
        RequestOutcome::Stream { id, mut events } => {
            while let Some(event) = events.next().await {
                match event {
                    StreamEvent::Chunk { content, format } => {
                        let notification = JsonRpcNotification::new(
                            STREAM_NOTIFICATION_METHOD,
                            Some(json!({
                                "id": id,
                                "type": "chunk",
                                "content": content,
                                "format": format,
                            })),
                        );
                        write_frame(writer, &notification).await?;
                    }
                    StreamEvent::Progress { metadata } => {
                        let notification = JsonRpcNotification::new(
                            STREAM_NOTIFICATION_METHOD,
                            Some(json!({
                                "id": id,
                                "type": "progress",
                                "metadata": metadata,
                            })),
                        );
                        write_frame(writer, &notification).await?;
                    }
                    StreamEvent::Complete { summary } => {
                        let response =
                            JsonRpcResponse::success(id, stream_complete_result(&summary));
                        return write_frame(writer, &response).await;
                    }
                    StreamEvent::Failed { error } => {
                        let response =
                            JsonRpcResponse::error(id, JsonRpcError::from_bridge(&error));
                        return write_frame(writer, &response).await;
                    }
                }
            }

            // The translator guarantees a terminal event; an exhausted
            // stream without one means the invariant broke upstream of us.
            let response = JsonRpcResponse::error(
                id,
                JsonRpcError::internal_error("stream ended without a terminal event"),
            );
            write_frame(writer, &response).await
        }
    }
}

async fn write_frame<W, T>(writer: &mut W, frame: &T) -> BridgeResult<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize,
{
    let mut payload = serde_json::to_vec(frame)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
