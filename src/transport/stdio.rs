//! Stdio transport for the MCP server.
//!
//! This transport reads JSON-RPC messages from stdin and writes responses to
//! stdout. Logs go to stderr so they never corrupt the protocol stream.

use crate::error::{DbError, DbResult};
use crate::mcp::DbService;
use crate::transport::Transport;
use rmcp::{ServiceExt, transport::stdio};
use tokio::signal;
use tracing::{info, warn};

pub struct StdioTransport {
    service: DbService,
}

impl StdioTransport {
    pub fn new(service: DbService) -> Self {
        Self { service }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let running_service = self
            .service
            .clone()
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Stdio transport completed normally"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        return Err(DbError::internal(format!("Stdio transport error: {}", e)));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received");
                true
            }
        };

        // Connections are per invocation, so only the cache holds state
        self.service.context().inspector().cache().invalidate_all().await;

        if shutdown_requested {
            // A blocking stdin read cannot be interrupted by tokio::select!
            info!("Exiting process");
            std::process::exit(0);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

/// Wait for SIGINT, or SIGTERM on unix.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
