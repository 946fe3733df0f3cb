//! Runtime configuration for the bridge.
//!
//! Configuration is resolved exactly once at startup: CLI flags override
//! environment variables, which override built-in defaults. The resolved
//! [`ServerConfig`] is immutable and shared by reference; no component
//! reads environment state after startup.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;

use pb_types::{BridgeError, BridgeResult};

pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_HTTP_PATH: &str = "/message";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_UPSTREAM_URL: &str = "PATTERN_BRIDGE_UPSTREAM_URL";
pub const ENV_API_KEY: &str = "PATTERN_BRIDGE_API_KEY";
pub const ENV_LOG_LEVEL: &str = "PATTERN_BRIDGE_LOG_LEVEL";

/// Which transport the bridge binds at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// JSON-RPC over an HTTP endpoint, streaming responses as SSE.
    Http,
}

impl FromStr for TransportMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportMode::Stdio),
            "http" => Ok(TransportMode::Http),
            other => Err(BridgeError::Config(format!(
                "unknown transport '{other}' (expected 'stdio' or 'http')"
            ))),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Stdio => write!(f, "stdio"),
            TransportMode::Http => write!(f, "http"),
        }
    }
}

/// Log verbosity, validated up front so a typo fails startup instead of
/// silently filtering everything out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(BridgeError::Config(format!(
                "unknown log level '{other}' (expected trace|debug|info|warn|error)"
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable runtime configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub upstream_url: Url,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub log_level: LogLevel,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Startup flag values; `None` falls through to environment, then defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub upstream_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub transport: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl ServerConfig {
    /// Resolve configuration from flags and the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> BridgeResult<Self> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolve configuration with an explicit environment lookup, so tests
    /// never mutate process-global state.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> BridgeResult<Self> {
        let raw_url = overrides
            .upstream_url
            .or_else(|| non_empty(env(ENV_UPSTREAM_URL)))
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
        let upstream_url = Url::parse(&raw_url)
            .map_err(|e| BridgeError::Config(format!("invalid upstream URL '{raw_url}': {e}")))?;
        if upstream_url.scheme() != "http" && upstream_url.scheme() != "https" {
            return Err(BridgeError::Config(format!(
                "upstream URL '{raw_url}' must use http or https"
            )));
        }

        // An empty credential means unauthenticated, same as an absent one.
        let api_key = overrides.api_key.filter(|k| !k.is_empty());
        let api_key = api_key.or_else(|| non_empty(env(ENV_API_KEY)));

        let log_level = match overrides.log_level.or_else(|| non_empty(env(ENV_LOG_LEVEL))) {
            Some(raw) => raw.parse::<LogLevel>()?,
            None => LogLevel::default(),
        };

        let transport = match overrides.transport {
            Some(raw) => raw.parse::<TransportMode>()?,
            None => TransportMode::default(),
        };

        let timeout_secs = overrides.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(BridgeError::Config(
                "request timeout must be at least one second".to_string(),
            ));
        }

        let host = overrides
            .host
            .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string());
        let port = overrides.port.unwrap_or(DEFAULT_HTTP_PORT);
        let path = overrides
            .path
            .unwrap_or_else(|| DEFAULT_HTTP_PATH.to_string());

        let config = Self {
            upstream_url,
            api_key,
            timeout_secs,
            log_level,
            transport,
            host,
            port,
            path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on combinations that cannot produce a working transport.
    fn validate(&self) -> BridgeResult<()> {
        if self.transport == TransportMode::Http {
            if self.host.trim().is_empty() {
                return Err(BridgeError::Config(
                    "HTTP transport requires a bind host".to_string(),
                ));
            }
            if self.port == 0 {
                return Err(BridgeError::Config(
                    "HTTP transport requires a non-zero port".to_string(),
                ));
            }
            if !self.path.starts_with('/') {
                return Err(BridgeError::Config(format!(
                    "endpoint path '{}' must start with '/'",
                    self.path
                )));
            }
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ServerConfig::resolve_with(ConfigOverrides::default(), no_env).unwrap();
        assert_eq!(config.upstream_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.port, DEFAULT_HTTP_PORT);
        assert_eq!(config.path, "/message");
    }

    #[test]
    fn environment_fills_gaps_and_flags_win() {
        let env = |name: &str| match name {
            ENV_UPSTREAM_URL => Some("http://fabric.internal:9999".to_string()),
            ENV_API_KEY => Some("secret-key".to_string()),
            ENV_LOG_LEVEL => Some("debug".to_string()),
            _ => None,
        };
        let config = ServerConfig::resolve_with(ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.upstream_url.as_str(), "http://fabric.internal:9999/");
        assert_eq!(config.api_key.as_deref(), Some("secret-key"));
        assert_eq!(config.log_level, LogLevel::Debug);

        let overrides = ConfigOverrides {
            upstream_url: Some("http://localhost:1234".to_string()),
            log_level: Some("error".to_string()),
            ..Default::default()
        };
        let config = ServerConfig::resolve_with(overrides, env).unwrap();
        assert_eq!(config.upstream_url.as_str(), "http://localhost:1234/");
        assert_eq!(config.log_level, LogLevel::Error);
        // Env still supplies what the flags left unset.
        assert_eq!(config.api_key.as_deref(), Some("secret-key"));
    }

    #[test]
    fn empty_api_key_means_unauthenticated() {
        let env = |name: &str| match name {
            ENV_API_KEY => Some(String::new()),
            _ => None,
        };
        let config = ServerConfig::resolve_with(ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn invalid_upstream_url_fails_fast() {
        let overrides = ConfigOverrides {
            upstream_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let err = ServerConfig::resolve_with(overrides, no_env).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let overrides = ConfigOverrides {
            upstream_url: Some("ftp://example.com".to_string()),
            ..Default::default()
        };
        let err = ServerConfig::resolve_with(overrides, no_env).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn http_transport_requires_a_usable_bind() {
        let overrides = ConfigOverrides {
            transport: Some("http".to_string()),
            port: Some(0),
            ..Default::default()
        };
        let err = ServerConfig::resolve_with(overrides, no_env).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        let overrides = ConfigOverrides {
            transport: Some("http".to_string()),
            path: Some("message".to_string()),
            ..Default::default()
        };
        let err = ServerConfig::resolve_with(overrides, no_env).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn stdio_transport_ignores_http_bind_validation() {
        let overrides = ConfigOverrides {
            transport: Some("stdio".to_string()),
            port: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::resolve_with(overrides, no_env).is_ok());
    }

    #[test]
    fn unknown_log_level_and_transport_are_config_errors() {
        let overrides = ConfigOverrides {
            log_level: Some("loud".to_string()),
            ..Default::default()
        };
        assert!(ServerConfig::resolve_with(overrides, no_env).is_err());

        let overrides = ConfigOverrides {
            transport: Some("carrier-pigeon".to_string()),
            ..Default::default()
        };
        assert!(ServerConfig::resolve_with(overrides, no_env).is_err());
    }
}
