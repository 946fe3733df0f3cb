//! Request handling and tool dispatch.
//!
//! A [`Bridge`] owns the upstream client and holds no per-request state,
//! so one instance serves any number of concurrent invocations. Transports
//! feed it [`JsonRpcRequest`]s and deliver whatever comes back; every
//! failure below this layer is converted into a structured error result
//! rather than tearing the process down.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use pb_config::ServerConfig;
use pb_types::{BridgeError, BridgeResult, RunRequest, RunSummary};
use pb_upstream::{translate, EventStream, UpstreamClient};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::redact::redact_configuration;
use crate::registry::{self, ToolKind};

pub struct Bridge {
    config: Arc<ServerConfig>,
    upstream: UpstreamClient,
}

/// What one dispatched tool call produced.
pub enum ToolOutcome {
    /// A single terminal value.
    Value(Value),
    /// A lazy event sequence ending in exactly one terminal event.
    Stream(EventStream),
}

impl std::fmt::Debug for ToolOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolOutcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            ToolOutcome::Stream(_) => f.debug_tuple("Stream").field(&"..").finish(),
        }
    }
}

/// What the transport must deliver for one request.
pub enum RequestOutcome {
    Response(JsonRpcResponse),
    Stream { id: Value, events: EventStream },
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

impl Bridge {
    pub fn new(config: Arc<ServerConfig>) -> BridgeResult<Self> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self { config, upstream })
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Handle one protocol request. Always produces an outcome; the
    /// process-level invariant is that a request never vanishes without
    /// either a response or a terminal stream event.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> RequestOutcome {
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, "handling request");

        match request.method.as_str() {
            "initialize" => {
                RequestOutcome::Response(JsonRpcResponse::success(id, self.initialize_result()))
            }
            "ping" => RequestOutcome::Response(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => {
                RequestOutcome::Response(JsonRpcResponse::success(id, Self::tools_list()))
            }
            "tools/call" => self.handle_tools_call(id, request.params).await,
            other => RequestOutcome::Response(JsonRpcResponse::error(
                id,
                JsonRpcError::method_not_found(other),
            )),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": "2025-03-26",
            "serverInfo": {
                "name": "pattern-bridge",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": {} },
            "instructions":
                "Bridge to a pattern execution service: list, inspect, and run named patterns.",
        })
    }

    pub fn tools_list() -> Value {
        let tools: Vec<Value> = registry::TOOLS
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> RequestOutcome {
        let params = params.unwrap_or(Value::Null);
        let call: CallParams = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(e) => {
                return RequestOutcome::Response(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("malformed tools/call params: {e}")),
                ));
            }
        };

        match self.dispatch(&call.name, &call.arguments).await {
            Ok(ToolOutcome::Value(value)) => RequestOutcome::Response(JsonRpcResponse::success(
                id,
                call_tool_result(value),
            )),
            Ok(ToolOutcome::Stream(events)) => RequestOutcome::Stream { id, events },
            Err(error) => {
                warn!(tool = %call.name, %error, "tool call failed");
                RequestOutcome::Response(JsonRpcResponse::error(
                    id,
                    JsonRpcError::from_bridge(&error),
                ))
            }
        }
    }

    /// Look up, validate, and route one tool call. The match on
    /// [`ToolKind`] is exhaustive: a new tool variant will not compile
    /// until it is routed here.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> BridgeResult<ToolOutcome> {
        let tool = registry::find(tool_name)
            .ok_or_else(|| BridgeError::UnknownTool(tool_name.to_string()))?;
        tool.validate_args(args)?;

        match tool.kind {
            ToolKind::ListPatterns => {
                let names = self.upstream.list_pattern_names().await?;
                Ok(ToolOutcome::Value(serde_json::to_value(names)?))
            }
            ToolKind::GetPatternDetails => {
                // Presence and non-blankness were validated above.
                let name = string_arg(args, "pattern_name").unwrap_or_default();
                let descriptor = self.upstream.get_pattern(&name).await?;
                Ok(ToolOutcome::Value(serde_json::to_value(descriptor)?))
            }
            ToolKind::RunPattern => {
                let request = RunRequest {
                    pattern_name: string_arg(args, "pattern_name").unwrap_or_default(),
                    input_text: string_arg(args, "input_text").unwrap_or_default(),
                    stream: args.get("stream").and_then(Value::as_bool).unwrap_or(false),
                    model_name: string_arg(args, "model_name"),
                };
                if request.stream {
                    let response = self.upstream.run_pattern_stream(&request).await?;
                    Ok(ToolOutcome::Stream(translate(
                        response,
                        request.model_name.clone(),
                    )))
                } else {
                    let result = self.upstream.run_pattern(&request).await?;
                    Ok(ToolOutcome::Value(serde_json::to_value(result)?))
                }
            }
            ToolKind::ListModels => {
                let inventory = self.upstream.list_models().await?;
                Ok(ToolOutcome::Value(serde_json::to_value(inventory)?))
            }
            ToolKind::ListStrategies => {
                let strategies = self.upstream.list_strategies().await?;
                Ok(ToolOutcome::Value(json!({ "strategies": strategies })))
            }
            ToolKind::GetConfiguration => {
                let raw = self.upstream.raw_configuration().await?;
                Ok(ToolOutcome::Value(Value::Object(redact_configuration(raw))))
            }
        }
    }
}

/// Wrap a tool value in the call-result shape callers expect: readable
/// text plus the structured value.
pub fn call_tool_result(value: Value) -> Value {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": value,
    })
}

/// Terminal result delivered after a stream completes normally.
pub fn stream_complete_result(summary: &RunSummary) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": format!(
                "stream complete: {} chunk(s), format '{}'",
                summary.chunks, summary.output_format
            ),
        }],
        "structuredContent": summary,
    })
}

fn string_arg(args: &Map<String, Value>, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    use pb_config::{ConfigOverrides, ServerConfig};
    use pb_mock::MockUpstream;
    use pb_types::StreamEvent;

    use super::*;

    fn bridge_for(url: &str) -> Bridge {
        let overrides = ConfigOverrides {
            upstream_url: Some(url.to_string()),
            timeout_secs: Some(2),
            ..Default::default()
        };
        let config = ServerConfig::resolve_with(overrides, |_| None).unwrap();
        Bridge::new(Arc::new(config)).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn dispatch_value(bridge: &Bridge, tool: &str, arguments: Value) -> Value {
        match bridge.dispatch(tool, &args(arguments)).await.unwrap() {
            ToolOutcome::Value(value) => value,
            ToolOutcome::Stream(_) => panic!("expected a value outcome"),
        }
    }

    #[tokio::test]
    async fn list_patterns_returns_the_upstream_order() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let value = dispatch_value(&bridge, "list_patterns", json!({})).await;
        assert_eq!(value, json!(["summarize", "extract_insights"]));
    }

    #[tokio::test]
    async fn list_patterns_is_idempotent() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let first = dispatch_value(&bridge, "list_patterns", json!({})).await;
        let second = dispatch_value(&bridge, "list_patterns", json!({})).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn pattern_details_carry_all_documented_fields() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let value =
            dispatch_value(&bridge, "get_pattern_details", json!({"pattern_name": "summarize"}))
                .await;
        assert_eq!(value["name"], "summarize");
        assert!(value["content"].as_str().is_some_and(|c| !c.is_empty()));
        assert_eq!(value["metadata"]["author"], "x");
        assert_eq!(value["metadata"]["version"], "1.0");
        assert_eq!(value["metadata"]["tags"], json!(["a"]));
    }

    #[tokio::test]
    async fn unknown_pattern_detail_is_not_found() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let err = bridge
            .dispatch(
                "get_pattern_details",
                &args(json!({"pattern_name": "no_such_pattern"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(name) if name == "no_such_pattern"));
    }

    #[tokio::test]
    async fn run_pattern_returns_the_upstream_result_verbatim() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let value = dispatch_value(
            &bridge,
            "run_pattern",
            json!({"pattern_name": "summarize", "input_text": "hello"}),
        )
        .await;
        assert_eq!(
            value,
            json!({
                "output_format": "text",
                "output_text": "Mock summarize output for input: hello",
                "model_used": "gpt-4o",
                "tokens_used": 10,
                "execution_time_ms": 5,
            })
        );
    }

    #[tokio::test]
    async fn upstream_500_is_reported_not_fatal() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let err = bridge
            .dispatch(
                "run_pattern",
                &args(json!({"pattern_name": "explode", "input_text": "x"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamError { status: 500, .. }));

        // The bridge is still usable after the failure.
        let value = dispatch_value(&bridge, "list_patterns", json!({})).await;
        assert_eq!(value, json!(["summarize", "extract_insights"]));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_such() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let err = bridge
            .dispatch("fabricate_patterns", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTool(name) if name == "fabricate_patterns"));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_upstream() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let err = bridge
            .dispatch("run_pattern", &args(json!({"input_text": "hello"})))
            .await
            .unwrap_err();
        assert!(
            matches!(err, BridgeError::InvalidArguments { ref field, .. } if field == "pattern_name")
        );
        assert_eq!(mock.hits(), 0);
    }

    #[tokio::test]
    async fn streaming_run_yields_ordered_chunks_then_complete() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let outcome = bridge
            .dispatch(
                "run_pattern",
                &args(json!({"pattern_name": "summarize", "input_text": "hello", "stream": true})),
            )
            .await
            .unwrap();
        let events: Vec<StreamEvent> = match outcome {
            ToolOutcome::Stream(events) => events.collect().await,
            ToolOutcome::Value(_) => panic!("expected a stream outcome"),
        };

        assert!(events.len() >= 2);
        let (terminal, chunks) = events.split_last().unwrap();
        assert!(chunks
            .iter()
            .all(|event| matches!(event, StreamEvent::Chunk { .. })));
        match terminal {
            StreamEvent::Complete { summary } => {
                assert_eq!(summary.chunks as usize, chunks.len());
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        let text: String = chunks
            .iter()
            .map(|event| match event {
                StreamEvent::Chunk { content, .. } => content.as_str(),
                _ => "",
            })
            .collect();
        assert!(text.contains("hello"));
    }

    #[tokio::test]
    async fn severed_stream_ends_with_exactly_one_interrupted_event() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let outcome = bridge
            .dispatch(
                "run_pattern",
                &args(json!({"pattern_name": "drop_mid_stream", "stream": true})),
            )
            .await
            .unwrap();
        let events: Vec<StreamEvent> = match outcome {
            ToolOutcome::Stream(events) => events.collect().await,
            ToolOutcome::Value(_) => panic!("expected a stream outcome"),
        };

        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(
            events.last().unwrap(),
            StreamEvent::Failed {
                error: BridgeError::StreamInterrupted(_)
            }
        ));
    }

    #[tokio::test]
    async fn malformed_stream_fragment_fails_the_stream() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let outcome = bridge
            .dispatch(
                "run_pattern",
                &args(json!({"pattern_name": "malformed_stream", "stream": true})),
            )
            .await
            .unwrap();
        let events: Vec<StreamEvent> = match outcome {
            ToolOutcome::Stream(events) => events.collect().await,
            ToolOutcome::Value(_) => panic!("expected a stream outcome"),
        };

        assert!(matches!(
            events.last().unwrap(),
            StreamEvent::Failed {
                error: BridgeError::MalformedResponse(_)
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_streams_do_not_interleave() {
        let mock = MockUpstream::spawn().await;
        let bridge = Arc::new(bridge_for(&mock.base_url()));

        let run = |pattern: &'static str| {
            let bridge = bridge.clone();
            async move {
                let outcome = bridge
                    .dispatch(
                        "run_pattern",
                        &args(json!({"pattern_name": pattern, "input_text": "in", "stream": true})),
                    )
                    .await
                    .unwrap();
                match outcome {
                    ToolOutcome::Stream(events) => events.collect::<Vec<_>>().await,
                    ToolOutcome::Value(_) => panic!("expected a stream outcome"),
                }
            }
        };

        let (summarize, extract) =
            tokio::join!(run("summarize"), run("extract_insights"));

        let text_of = |events: &[StreamEvent]| -> String {
            events
                .iter()
                .filter_map(|event| match event {
                    StreamEvent::Chunk { content, .. } => Some(content.clone()),
                    _ => None,
                })
                .collect()
        };
        assert!(text_of(&summarize).contains("summarize"));
        assert!(!text_of(&summarize).contains("extract_insights"));
        assert!(text_of(&extract).contains("extract_insights"));
        assert!(!text_of(&extract).contains("summarize"));
    }

    #[tokio::test]
    async fn list_models_and_strategies_come_back_structured() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let models = dispatch_value(&bridge, "list_models", json!({})).await;
        assert!(models["models"]
            .as_array()
            .is_some_and(|m| m.contains(&json!("gpt-4o"))));
        assert!(models["vendors"]["openai"].is_array());

        let strategies = dispatch_value(&bridge, "list_strategies", json!({})).await;
        let entries = strategies["strategies"].as_array().unwrap();
        // The fixture includes one entry with a blank name; it is skipped.
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|s| !s["name"].as_str().unwrap().is_empty()));
    }

    #[tokio::test]
    async fn configuration_is_redacted_before_leaving_the_bridge() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let config = dispatch_value(&bridge, "get_configuration", json!({})).await;
        assert_eq!(config["openai_api_key"], "[REDACTED_BY_BRIDGE]");
        assert_eq!(config["fabric_token"], "[REDACTED_BY_BRIDGE]");
        assert_eq!(config["google_api_key"], "");
        assert_eq!(config["api_timeout"], 30);
        assert_eq!(config["default_model"], "gpt-4");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_distinguished_from_timeout() {
        // Nothing listens on port 1.
        let bridge = bridge_for("http://127.0.0.1:1");
        let err = bridge
            .dispatch("list_patterns", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamUnreachable(_)));

        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());
        let err = bridge
            .dispatch(
                "run_pattern",
                &args(json!({"pattern_name": "slow", "input_text": "x"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamTimeout(_)));
    }

    #[tokio::test]
    async fn credential_rejection_is_a_distinct_error() {
        let mock = MockUpstream::spawn_with_api_key("expected-key").await;

        // No credential configured: upstream rejects the call.
        let bridge = bridge_for(&mock.base_url());
        let err = bridge
            .dispatch("list_patterns", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamAuth { status: 401, .. }));

        // Matching credential: calls succeed.
        let overrides = ConfigOverrides {
            upstream_url: Some(mock.base_url()),
            api_key: Some("expected-key".to_string()),
            timeout_secs: Some(2),
            ..Default::default()
        };
        let config = ServerConfig::resolve_with(overrides, |_| None).unwrap();
        let bridge = Bridge::new(Arc::new(config)).unwrap();
        let value = dispatch_value(&bridge, "list_patterns", json!({})).await;
        assert_eq!(value, json!(["summarize", "extract_insights"]));
    }

    #[tokio::test]
    async fn handle_request_covers_the_protocol_surface() {
        let mock = MockUpstream::spawn().await;
        let bridge = bridge_for(&mock.base_url());

        let request = JsonRpcRequest::with_id(1, "initialize", None);
        match bridge.handle_request(request).await {
            RequestOutcome::Response(response) => {
                let result = response.result.unwrap();
                assert_eq!(result["serverInfo"]["name"], "pattern-bridge");
            }
            RequestOutcome::Stream { .. } => panic!("initialize must not stream"),
        }

        let request = JsonRpcRequest::with_id(2, "tools/list", None);
        match bridge.handle_request(request).await {
            RequestOutcome::Response(response) => {
                let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
                assert_eq!(tools, registry::TOOLS.len());
            }
            RequestOutcome::Stream { .. } => panic!("tools/list must not stream"),
        }

        let request = JsonRpcRequest::with_id(3, "patterns/steal", None);
        match bridge.handle_request(request).await {
            RequestOutcome::Response(response) => {
                assert_eq!(
                    response.error.unwrap().code,
                    crate::protocol::METHOD_NOT_FOUND
                );
            }
            RequestOutcome::Stream { .. } => panic!("unknown methods must not stream"),
        }

        let request = JsonRpcRequest::with_id(
            4,
            "tools/call",
            Some(json!({"name": "list_patterns", "arguments": {}})),
        );
        match bridge.handle_request(request).await {
            RequestOutcome::Response(response) => {
                let result = response.result.unwrap();
                assert_eq!(
                    result["structuredContent"],
                    json!(["summarize", "extract_insights"])
                );
                assert!(result["content"][0]["text"].as_str().is_some());
            }
            RequestOutcome::Stream { .. } => panic!("non-streaming call must not stream"),
        }
    }
}
