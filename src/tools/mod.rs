//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `query`: structured `select`
//! - `write`: `insert`, `update`, `delete`, `batch_update`, `batch_delete`
//! - `schema`: `get_schema` and `diff_schema`
//! - `sql`: guarded raw `execute_sql`
//! - `sql_validator`: statement classification for raw SQL
//! - `response`: the `{success, ...}` envelope every tool returns
//!
//! Every handler opens its own connection for the duration of one call and
//! releases it on every exit path.

pub mod query;
pub mod response;
pub mod schema;
pub mod sql;
pub mod sql_validator;
pub mod write;

pub use query::{QueryToolHandler, SelectInput};
pub use response::{ToolErrorBody, ToolFailure, ToolResponse, ToolResult};
pub use schema::{
    DiffSchemaInput, DiffSchemaOutput, GetSchemaInput, GetSchemaOutput, SchemaToolHandler,
};
pub use sql::{ExecuteSqlInput, ExecuteSqlOutput, SqlToolHandler};
pub use write::{
    BatchDeleteInput, BatchUpdateInput, DeleteInput, InsertInput, UpdateInput, WriteToolHandler,
};

use crate::db::cache::DEFAULT_SCHEMA_CACHE_TTL_MS;
use crate::db::connection::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::db::{ConnectionManager, QueryExecutor, SchemaCache, SchemaInspector};
use crate::models::ConnectionConfig;
use std::sync::Arc;
use std::time::Duration;

/// Settings and shared state every tool handler works with.
#[derive(Debug, Clone)]
pub struct ToolContext {
    executor: QueryExecutor,
    inspector: SchemaInspector,
    connect_timeout: Duration,
    schema_cache_ttl_ms: u64,
}

impl ToolContext {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self {
            executor: QueryExecutor::new(),
            inspector: SchemaInspector::new(cache),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            schema_cache_ttl_ms: DEFAULT_SCHEMA_CACHE_TTL_MS,
        }
    }

    /// Chunk size for batches that do not set `batchSize`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.executor = QueryExecutor::with_batch_size(batch_size);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// TTL for `get_schema` calls that do not set `cacheTtlMs`.
    pub fn with_schema_cache_ttl(mut self, ttl_ms: u64) -> Self {
        self.schema_cache_ttl_ms = ttl_ms;
        self
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn inspector(&self) -> &SchemaInspector {
        &self.inspector
    }

    pub fn schema_cache_ttl_ms(&self) -> u64 {
        self.schema_cache_ttl_ms
    }

    /// A fresh, unconnected manager for one invocation.
    pub fn manager(&self, config: ConnectionConfig) -> ConnectionManager {
        ConnectionManager::new(config).with_connect_timeout(self.connect_timeout)
    }
}
