//! DB Toolkit - Main entry point.
//!
//! Serves the toolkit's MCP tools over stdio. Connection details arrive with
//! every tool call, so the server needs no database configuration to start.

use db_toolkit::config::Config;
use db_toolkit::db::SchemaCache;
use db_toolkit::mcp::DbService;
use db_toolkit::transport::{StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the MCP protocol.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    init_tracing(&config);

    info!(
        schema_cache_ttl_ms = config.schema_cache_ttl_ms,
        batch_size = config.batch_size,
        connect_timeout_secs = config.connect_timeout,
        "Starting DB Toolkit v{}",
        env!("CARGO_PKG_VERSION")
    );

    let cache = Arc::new(SchemaCache::new());
    let service = DbService::new(config.tool_context(cache));

    let transport = StdioTransport::new(service);
    info!(transport = transport.name(), "Serving MCP tools");

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
