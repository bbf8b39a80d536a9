//! Stdio transport for the MCP server.
//!
//! Reads JSON-RPC messages from stdin and writes responses to stdout.
//! Logging must go to stderr while this transport runs.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::QueryGateway;
use crate::mcp::GatewayService;
use crate::transport::Transport;
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

pub struct StdioTransport {
    gateway: Arc<QueryGateway>,
}

impl StdioTransport {
    pub fn new(gateway: Arc<QueryGateway>) -> Self {
        Self { gateway }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> GatewayResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = GatewayService::new(self.gateway.clone());
        let running_service = service.serve(stdio()).await.map_err(|e| {
            GatewayError::internal(format!("Failed to start stdio transport: {}", e))
        })?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => {
                        info!("Stdio transport completed normally");
                    }
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        return Err(GatewayError::internal(format!(
                            "Stdio transport error: {}",
                            e
                        )));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });

            // tokio::select! cannot interrupt a blocking stdin read
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
///
/// A signal source that cannot be installed never fires.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::db::MemoryStore;

    #[test]
    fn test_stdio_transport_creation() {
        let gateway = QueryGateway::new(Arc::new(MemoryStore::new()), GatewayConfig::default());
        let transport = StdioTransport::new(Arc::new(gateway));
        assert_eq!(transport.name(), "stdio");
    }
}
