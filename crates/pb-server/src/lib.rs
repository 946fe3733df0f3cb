//! HTTP transport: binds the bridge to a configured host/port/path.
//!
//! Each inbound request is handled independently and concurrently — one
//! task per connection, axum's model. Streaming tool calls answer with a
//! Server-Sent Events body; everything else is a plain JSON response.

pub mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::info;

use pb_mcp::{Bridge, Transport};
use pb_types::BridgeResult;

#[derive(Default)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn serve(self, bridge: Arc<Bridge>) -> BridgeResult<()> {
        let config = bridge.config().clone();
        let app = routes::router(bridge);

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!(
            "serving on http://{}{}",
            listener.local_addr()?,
            config.path
        );

        axum::serve(listener, app).await?;
        Ok(())
    }
}
