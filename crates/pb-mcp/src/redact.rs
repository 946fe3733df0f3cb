//! Redaction of sensitive upstream configuration values.
//!
//! The upstream `/config` endpoint returns credentials in the clear; they
//! must never cross the bridge to a protocol caller. A value is redacted
//! when its key matches a sensitive pattern or the value itself carries a
//! known API-key prefix. Empty sensitive values pass through so callers
//! can still see that a key is unset.

use serde_json::{Map, Value};

pub const REDACTED_PLACEHOLDER: &str = "[REDACTED_BY_BRIDGE]";

/// Key suffixes (case-insensitive) that mark a configuration entry as
/// sensitive.
const SENSITIVE_KEY_SUFFIXES: &[&str] = &["_API_KEY", "_TOKEN", "_SECRET", "_PASSWORD"];

/// Value prefixes that mark a string as an API key regardless of its key.
const API_KEY_PREFIXES: &[&str] = &["sk-", "ant-", "xai-", "gsk_", "AIza"];

pub fn redact_configuration(config: Map<String, Value>) -> Map<String, Value> {
    config
        .into_iter()
        .map(|(key, value)| {
            let redacted = if should_redact(&key, &value) {
                Value::String(REDACTED_PLACEHOLDER.to_string())
            } else {
                value
            };
            (key, redacted)
        })
        .collect()
}

fn should_redact(key: &str, value: &Value) -> bool {
    if value.as_str() == Some("") {
        return false;
    }

    let upper = key.to_uppercase();
    if SENSITIVE_KEY_SUFFIXES
        .iter()
        .any(|suffix| upper.ends_with(suffix))
    {
        return true;
    }

    value
        .as_str()
        .is_some_and(|s| API_KEY_PREFIXES.iter().any(|prefix| s.starts_with(prefix)))
}
