//! Configuration handling for the DB toolkit server.
//!
//! This module provides configuration management via CLI arguments and
//! environment variables. Connection details are not configured here: every
//! tool call carries its own vendor and connection string.

use crate::db::cache::DEFAULT_SCHEMA_CACHE_TTL_MS;
use crate::db::connection::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::db::SchemaCache;
use crate::models::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use crate::tools::ToolContext;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the DB toolkit server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-toolkit",
    about = "MCP server with safe SQL tools for PostgreSQL, MySQL and SQLite",
    version,
    author
)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DBKIT_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBKIT_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (written to stderr)
    #[arg(long, env = "DBKIT_ENABLE_LOGS")]
    pub enable_logs: bool,

    /// Default schema cache TTL in milliseconds (0 disables caching)
    #[arg(
        long,
        default_value_t = DEFAULT_SCHEMA_CACHE_TTL_MS,
        env = "DBKIT_SCHEMA_CACHE_TTL_MS"
    )]
    pub schema_cache_ttl_ms: u64,

    /// Default chunk size for batch operations
    #[arg(
        long,
        default_value_t = DEFAULT_BATCH_SIZE,
        env = "DBKIT_BATCH_SIZE",
        value_parser = parse_batch_size
    )]
    pub batch_size: usize,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DBKIT_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,
}

fn parse_batch_size(raw: &str) -> Result<usize, String> {
    let size: usize = raw
        .parse()
        .map_err(|e| format!("invalid batch size '{}': {}", raw, e))?;
    if size == 0 || size > MAX_BATCH_SIZE {
        return Err(format!(
            "batch size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, size
        ));
    }
    Ok(size)
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
            schema_cache_ttl_ms: DEFAULT_SCHEMA_CACHE_TTL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Tool context carrying these defaults and the given schema cache.
    pub fn tool_context(&self, cache: Arc<SchemaCache>) -> ToolContext {
        ToolContext::new(cache)
            .with_batch_size(self.batch_size)
            .with_connect_timeout(self.connect_timeout_duration())
            .with_schema_cache_ttl(self.schema_cache_ttl_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
