//! Transport layer for the MCP server.
//!
//! Only stdio is provided: the gateway is launched as a subprocess by the
//! MCP client.

pub mod stdio;

pub use stdio::StdioTransport;

use crate::error::GatewayResult;
use std::future::Future;

/// Trait for MCP transport implementations.
pub trait Transport: Send + Sync {
    /// Start the transport and begin handling requests.
    ///
    /// This method should block until the transport is shut down.
    fn run(&self) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
