//! CLI argument parsing.
//!
//! Flags override environment variables (`PATTERN_BRIDGE_UPSTREAM_URL`,
//! `PATTERN_BRIDGE_API_KEY`, `PATTERN_BRIDGE_LOG_LEVEL`), which override
//! built-in defaults. The credential is deliberately environment-only so
//! it never shows up in process listings.

use clap::Parser;

use pb_config::ConfigOverrides;

/// Expose a pattern execution service as MCP-style tools.
#[derive(Parser, Debug)]
#[command(name = "pattern-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Transport mechanism: 'stdio' (default) or 'http'.
    #[arg(long)]
    pub transport: Option<String>,

    /// Base URL of the upstream pattern service.
    ///
    /// Defaults to http://127.0.0.1:8080.
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Per-request upstream timeout in seconds (default: 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Host to bind the server to (HTTP transport only).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind the server to (HTTP transport only, default: 8000).
    #[arg(long)]
    pub port: Option<u16>,

    /// Endpoint path for the JSON-RPC endpoint (HTTP transport only,
    /// default: /message).
    #[arg(long)]
    pub mcp_path: Option<String>,

    /// Log verbosity: trace, debug, info, warn, or error.
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            upstream_url: self.upstream_url,
            api_key: None,
            timeout_secs: self.timeout,
            log_level: self.log_level,
            transport: self.transport,
            host: self.host,
            port: self.port,
            path: self.mcp_path,
        }
    }
}
