//! JSON-RPC 2.0 message types for the tool protocol.
//!
//! Reference: https://www.jsonrpc.org/specification

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use pb_types::BridgeError;

pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Application-specific error codes, one per upstream failure kind so
// callers can branch without parsing messages.
pub const TOOL_NOT_FOUND: i32 = -32001;
pub const PATTERN_NOT_FOUND: i32 = -32002;
pub const UPSTREAM_UNREACHABLE: i32 = -32010;
pub const UPSTREAM_TIMEOUT: i32 = -32011;
pub const UPSTREAM_ERROR: i32 = -32012;
pub const UPSTREAM_AUTH: i32 = -32013;
pub const MALFORMED_UPSTREAM: i32 = -32014;
pub const STREAM_INTERRUPTED: i32 = -32015;

/// A request sent by a protocol caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,

    /// Correlates the response; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A response delivered back to the caller; carries exactly one of
/// `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,

    pub id: Value,

    // `"result": null` is a legal success; keep it distinct from an
    // absent result field.
    #[serde(default, deserialize_with = "deserialize_result")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn deserialize_result<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Value::deserialize(deserializer)?))
}

/// The structured error object of a failed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A request without an id; the bridge never answers these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Envelope for parsing inbound frames.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if value.get("result").is_some() || value.get("error").is_some() {
            return serde_json::from_value(value)
                .map(JsonRpcMessage::Response)
                .map_err(serde::de::Error::custom);
        }

        if value.get("method").is_some() {
            if value.get("id").is_some() {
                return serde_json::from_value(value)
                    .map(JsonRpcMessage::Request)
                    .map_err(serde::de::Error::custom);
            }
            return serde_json::from_value(value)
                .map(JsonRpcMessage::Notification)
                .map_err(serde::de::Error::custom);
        }

        Err(serde::de::Error::custom(
            "invalid JSON-RPC message: missing 'method', 'result', and 'error'",
        ))
    }
}

impl JsonRpcRequest {
    pub fn new(id: Option<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn with_id(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(Some(Value::Number(id.into())), method, params)
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message, None)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message, None)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", method.into()),
            None,
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message, None)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message, None)
    }

    /// Map a bridge failure onto its protocol representation. Every
    /// taxonomy kind keeps a stable code and a `data.kind` tag; callers
    /// never see a raw panic or stack trace.
    pub fn from_bridge(error: &BridgeError) -> Self {
        let message = error.to_string();
        let mut data = json!({ "kind": error.kind() });

        let code = match error {
            BridgeError::UnknownTool(_) => TOOL_NOT_FOUND,
            BridgeError::InvalidArguments { tool, field, .. } => {
                data["tool"] = json!(tool);
                data["field"] = json!(field);
                INVALID_PARAMS
            }
            BridgeError::NotFound(name) => {
                data["pattern"] = json!(name);
                PATTERN_NOT_FOUND
            }
            BridgeError::UpstreamUnreachable(_) => UPSTREAM_UNREACHABLE,
            BridgeError::UpstreamTimeout(_) => UPSTREAM_TIMEOUT,
            BridgeError::UpstreamError { status, .. } => {
                data["status"] = json!(status);
                UPSTREAM_ERROR
            }
            BridgeError::UpstreamAuth { status, .. } => {
                data["status"] = json!(status);
                UPSTREAM_AUTH
            }
            BridgeError::MalformedResponse(_) => MALFORMED_UPSTREAM,
            BridgeError::StreamInterrupted(_) => STREAM_INTERRUPTED,
            BridgeError::Config(_) | BridgeError::Io(_) | BridgeError::Serialization(_) => {
                INTERNAL_ERROR
            }
        };

        Self::new(code, message, Some(data))
    }
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}
