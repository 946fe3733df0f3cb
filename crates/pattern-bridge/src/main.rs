//! Entry point: resolve configuration, set up logging, pick a transport.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pb_config::{ServerConfig, TransportMode};
use pb_mcp::{Bridge, StdioTransport, Transport};
use pb_server::HttpTransport;
use pb_types::BridgeResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse_args();

    let config = match ServerConfig::resolve(cli.into_overrides()) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet; this is the one place errors go to
            // stderr bare.
            eprintln!("pattern-bridge: {e}");
            return ExitCode::from(2);
        }
    };

    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr on both transports: on stdio, stdout carries the
/// protocol frames. `RUST_LOG` wins over the configured level when set.
fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: ServerConfig) -> BridgeResult<()> {
    let transport = config.transport;
    let config = Arc::new(config);
    let bridge = Arc::new(Bridge::new(config.clone())?);

    info!(
        upstream = %config.upstream_url,
        %transport,
        authenticated = config.api_key.is_some(),
        "starting pattern-bridge v{}",
        env!("CARGO_PKG_VERSION"),
    );

    match transport {
        TransportMode::Stdio => StdioTransport::new().serve(bridge).await,
        TransportMode::Http => HttpTransport::new().serve(bridge).await,
    }
}
