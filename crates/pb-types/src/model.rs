//! Wire shapes for the upstream REST contract and the bridge's own
//! invocation values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::BridgeError;

/// Pattern metadata as served by `GET /patterns/{name}`. All fields are
/// free-form strings owned by the upstream service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMetadata {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A named pattern with its opaque content. Request-scoped; the bridge
/// never stores or interprets the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDescriptor {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub metadata: PatternMetadata,
}

/// One pattern execution request, built from validated tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub pattern_name: String,
    pub input_text: String,
    pub stream: bool,
    pub model_name: Option<String>,
}

impl RunRequest {
    pub fn new(pattern_name: impl Into<String>, input_text: impl Into<String>) -> Self {
        Self {
            pattern_name: pattern_name.into(),
            input_text: input_text.into(),
            stream: false,
            model_name: None,
        }
    }
}

/// Terminal value of a non-streaming execution, as served by
/// `POST /patterns/{name}/run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub output_format: String,
    pub output_text: String,
    pub model_used: String,
    pub tokens_used: u64,
    pub execution_time_ms: u64,
}

/// Model listing as served by `GET /models/names`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInventory {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub vendors: BTreeMap<String, Vec<String>>,
}

/// One execution strategy as served by `GET /strategies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub prompt: String,
}

/// Summary delivered with the terminal `Complete` event of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub output_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub chunks: u64,
}

/// One incremental event of a streaming invocation.
///
/// A well-formed stream is zero or more `Chunk`/`Progress` events followed
/// by exactly one `Complete` or `Failed`; nothing is emitted after the
/// terminal event.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk { content: String, format: String },
    Progress { metadata: Map<String, Value> },
    Complete { summary: RunSummary },
    Failed { error: BridgeError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Failed { .. }
        )
    }
}
