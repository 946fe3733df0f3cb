//! Upstream access for the bridge: a thin REST client for the pattern
//! service and the translator that turns its streamed responses into
//! ordered [`pb_types::StreamEvent`] sequences.

pub mod client;
pub mod translate;

pub use client::UpstreamClient;
pub use translate::{translate, EventStream};
