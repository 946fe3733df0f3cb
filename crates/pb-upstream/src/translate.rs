//! Translation of an upstream SSE body into ordered [`StreamEvent`]s.
//!
//! The upstream streams `data: {json}` lines whose fragments are tagged
//! `content`, `progress`, `complete`, or `error`. The translator is a
//! pull-based state machine over those lines: zero or more chunk/progress
//! events, then exactly one terminal event, then nothing. It holds no
//! state across invocations — one translator per in-flight call.

use std::fmt::Display;
use std::pin::Pin;

use async_stream::stream;
use futures::Stream;
use reqwest::Response;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use pb_types::{BridgeError, RunSummary, StreamEvent};

/// Lazily produced, non-restartable event sequence for one invocation.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

const DEFAULT_OUTPUT_FORMAT: &str = "text";

#[derive(Debug, Deserialize)]
struct SseFragment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

/// Translate a streaming run response. The response body is consumed
/// incrementally; dropping the returned stream drops the response and
/// with it the upstream connection.
pub fn translate(response: Response, model_hint: Option<String>) -> EventStream {
    translate_bytes(response.bytes_stream(), model_hint)
}

/// Translate any byte stream carrying the SSE framing. Split out from
/// [`translate`] so edge cases are testable with synthetic input.
pub fn translate_bytes<S, B, E>(body: S, model_hint: Option<String>) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream! {
        let lines = sse_lines(body);
        let mut format = DEFAULT_OUTPUT_FORMAT.to_string();
        let mut chunks: u64 = 0;

        for await line in lines {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    yield StreamEvent::Failed {
                        error: BridgeError::StreamInterrupted(format!(
                            "upstream connection failed mid-stream: {e}"
                        )),
                    };
                    return;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Only data lines carry fragments; SSE comments and other
            // fields are not part of the upstream contract.
            let Some(payload) = trimmed.strip_prefix("data:") else {
                continue;
            };

            let fragment: SseFragment = match serde_json::from_str(payload.trim_start()) {
                Ok(fragment) => fragment,
                Err(e) => {
                    warn!(line = %trimmed, "malformed stream fragment");
                    yield StreamEvent::Failed {
                        error: BridgeError::MalformedResponse(format!(
                            "undecodable stream fragment: {e}"
                        )),
                    };
                    return;
                }
            };

            match fragment.kind.as_str() {
                "content" => {
                    if let Some(f) = fragment.format {
                        format = f;
                    }
                    chunks += 1;
                    yield StreamEvent::Chunk {
                        content: fragment.content,
                        format: format.clone(),
                    };
                }
                "progress" => {
                    yield StreamEvent::Progress {
                        metadata: fragment.metadata.unwrap_or_default(),
                    };
                }
                "complete" => {
                    yield StreamEvent::Complete {
                        summary: RunSummary {
                            output_format: format.clone(),
                            model_used: model_hint.clone(),
                            chunks,
                        },
                    };
                    return;
                }
                "error" => {
                    let message = if fragment.content.is_empty() {
                        "unspecified upstream error".to_string()
                    } else {
                        fragment.content
                    };
                    yield StreamEvent::Failed {
                        error: BridgeError::UpstreamError {
                            status: 200,
                            body: message,
                        },
                    };
                    return;
                }
                other => {
                    yield StreamEvent::Failed {
                        error: BridgeError::MalformedResponse(format!(
                            "unexpected stream fragment type '{other}'"
                        )),
                    };
                    return;
                }
            }
        }

        // EOF with no terminal fragment, including a completely empty
        // body: the consumer must still observe exactly one terminal.
        yield StreamEvent::Failed {
            error: BridgeError::StreamInterrupted(
                "upstream closed the stream before completion".to_string(),
            ),
        };
    })
}

/// Reassemble complete lines from arbitrary byte chunk boundaries. A
/// trailing partial line is flushed at EOF.
fn sse_lines<S, B, E>(body: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    stream! {
        let mut buffer = String::new();
        for await piece in body {
            match piece {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        yield Ok(line.trim_end_matches(['\r', '\n']).to_string());
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            yield Ok(std::mem::take(&mut buffer));
        }
    }
}
