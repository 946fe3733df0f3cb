//! The fixed tool set and its input contracts.
//!
//! Tools are a closed enum dispatched through an exhaustive match, not a
//! string-keyed handler table; adding a tool means adding a variant and
//! the compiler walks every match that must learn about it.

use serde_json::{json, Map, Value};

use pb_types::{BridgeError, BridgeResult};

/// Every tool the bridge exposes. Closed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ListPatterns,
    GetPatternDetails,
    RunPattern,
    ListModels,
    ListStrategies,
    GetConfiguration,
}

/// JSON type expected for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Bool,
}

impl ParamKind {
    fn schema_name(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Bool => "boolean",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Bool => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    /// Whether an empty string is acceptable. Pattern input may be empty;
    /// names may not.
    pub allow_blank: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolDefinition {
    pub kind: ToolKind,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    /// Whether the tool can produce an incremental event stream instead
    /// of a single value.
    pub streaming: bool,
}

const RUN_PATTERN_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "pattern_name",
        description: "Name of the pattern to execute",
        kind: ParamKind::String,
        required: true,
        allow_blank: false,
    },
    ParamSpec {
        name: "input_text",
        description: "Input text the pattern is applied to",
        kind: ParamKind::String,
        required: false,
        allow_blank: true,
    },
    ParamSpec {
        name: "stream",
        description: "Deliver output incrementally as it is produced",
        kind: ParamKind::Bool,
        required: false,
        allow_blank: true,
    },
    ParamSpec {
        name: "model_name",
        description: "Model override for this execution",
        kind: ParamKind::String,
        required: false,
        allow_blank: false,
    },
];

const GET_PATTERN_DETAILS_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "pattern_name",
    description: "Name of the pattern to describe",
    kind: ParamKind::String,
    required: true,
    allow_blank: false,
}];

/// The registry. Built into the binary; read-only for the process
/// lifetime, so it is shared freely across concurrent invocations.
pub const TOOLS: &[ToolDefinition] = &[
    ToolDefinition {
        kind: ToolKind::ListPatterns,
        name: "list_patterns",
        description: "List the names of all patterns available upstream",
        params: &[],
        streaming: false,
    },
    ToolDefinition {
        kind: ToolKind::GetPatternDetails,
        name: "get_pattern_details",
        description: "Fetch the content and metadata of a named pattern",
        params: GET_PATTERN_DETAILS_PARAMS,
        streaming: false,
    },
    ToolDefinition {
        kind: ToolKind::RunPattern,
        name: "run_pattern",
        description: "Execute a pattern against input text, optionally streaming the output",
        params: RUN_PATTERN_PARAMS,
        streaming: true,
    },
    ToolDefinition {
        kind: ToolKind::ListModels,
        name: "list_models",
        description: "List configured models, flat and grouped by vendor",
        params: &[],
        streaming: false,
    },
    ToolDefinition {
        kind: ToolKind::ListStrategies,
        name: "list_strategies",
        description: "List available execution strategies",
        params: &[],
        streaming: false,
    },
    ToolDefinition {
        kind: ToolKind::GetConfiguration,
        name: "get_configuration",
        description: "Fetch the upstream configuration with sensitive values redacted",
        params: &[],
        streaming: false,
    },
];

pub fn find(name: &str) -> Option<&'static ToolDefinition> {
    TOOLS.iter().find(|tool| tool.name == name)
}

impl ToolDefinition {
    /// JSON-Schema-shaped input contract advertised through `tools/list`.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.params {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.schema_name(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(param.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check arguments against the declared specs, reporting the first
    /// offending field. Validation failures never reach the upstream.
    pub fn validate_args(&self, args: &Map<String, Value>) -> BridgeResult<()> {
        for param in self.params {
            match args.get(param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(self.bad_argument(param.name, "is required"));
                    }
                }
                Some(value) => {
                    if !param.kind.matches(value) {
                        return Err(self.bad_argument(
                            param.name,
                            match param.kind {
                                ParamKind::String => "must be a string",
                                ParamKind::Bool => "must be a boolean",
                            },
                        ));
                    }
                    if !param.allow_blank {
                        if let Some(s) = value.as_str() {
                            if s.trim().is_empty() {
                                return Err(
                                    self.bad_argument(param.name, "must be a non-empty string")
                                );
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn bad_argument(&self, field: &str, reason: &str) -> BridgeError {
        BridgeError::InvalidArguments {
            tool: self.name.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
