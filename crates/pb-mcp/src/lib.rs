//! The bridge's protocol core: JSON-RPC 2.0 message types, the closed
//! tool registry, the dispatcher, and the stdio transport.

pub mod bridge;
pub mod protocol;
pub mod redact;
pub mod registry;
pub mod stdio;

use std::sync::Arc;

use async_trait::async_trait;

use pb_types::BridgeResult;

pub use bridge::{Bridge, RequestOutcome, ToolOutcome};
pub use stdio::StdioTransport;

/// The seam between the dispatcher and a concrete channel. Both the stdio
/// loop and the HTTP server drive the same [`Bridge`] through this trait,
/// so the dispatcher never branches on transport.
#[async_trait]
pub trait Transport {
    /// Serve requests until the channel closes. Per-invocation failures
    /// are reported to the caller through the channel; only a broken
    /// channel itself ends the loop with an error.
    async fn serve(self, bridge: Arc<Bridge>) -> BridgeResult<()>;
}
