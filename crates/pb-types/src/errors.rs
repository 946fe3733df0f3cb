//! Error types and conversions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool '{tool}': field '{field}' {reason}")]
    InvalidArguments {
        tool: String,
        field: String,
        reason: String,
    },

    #[error("Unable to reach upstream service: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream returned status {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Upstream rejected the configured credential (status {status}): {body}")]
    UpstreamAuth { status: u16, body: String },

    #[error("Pattern '{0}' not found upstream")]
    NotFound(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Stable taxonomy tag carried in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config_invalid",
            BridgeError::UnknownTool(_) => "unknown_tool",
            BridgeError::InvalidArguments { .. } => "invalid_arguments",
            BridgeError::UpstreamUnreachable(_) => "upstream_unreachable",
            BridgeError::UpstreamTimeout(_) => "upstream_timeout",
            BridgeError::UpstreamError { .. } => "upstream_error",
            BridgeError::UpstreamAuth { .. } => "upstream_auth",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::MalformedResponse(_) => "malformed_upstream_response",
            BridgeError::StreamInterrupted(_) => "stream_interrupted",
            BridgeError::Io(_) => "io",
            BridgeError::Serialization(_) => "serialization",
        }
    }
}
