//! DB Query Gateway - Main entry point.
//!
//! Serves the gateway's MCP tools over stdio so an AI assistant can register
//! databases, run read-only queries and generate SQL.

use clap::Parser;
use db_query_gateway::config::Config;
use db_query_gateway::db::{MemoryStore, MetadataStore, SqliteStore};
use db_query_gateway::gateway::QueryGateway;
use db_query_gateway::llm::OpenAiClient;
use db_query_gateway::transport::{StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the MCP protocol.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn MetadataStore>, Box<dyn std::error::Error>> {
    if config.uses_memory_store() {
        warn!("Using in-memory store; registrations are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::connect(&config.store_url).await?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    info!(
        store = %config.store_url,
        row_cap = config.row_cap,
        "Starting DB Query Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store = open_store(&config).await?;
    let mut gateway = QueryGateway::new(store, config.gateway_config());

    match config.llm_endpoint() {
        Some(endpoint) => {
            info!(model = %config.llm_model, base_url = %endpoint.base_url, "SQL generation enabled");
            gateway = gateway.with_llm(Arc::new(OpenAiClient::new(endpoint)?));
        }
        None => warn!("OPENAI_API_KEY not set; SQL generation disabled"),
    }

    let transport = StdioTransport::new(Arc::new(gateway));
    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
