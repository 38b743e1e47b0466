//! Structured read tool.
//!
//! This module implements the `select` MCP tool. The statement is built and
//! validated before any connection is opened.

use crate::db::executor::RowsResult;
use crate::db::with_connection;
use crate::models::{ConnectionConfig, SelectQuery};
use crate::tools::ToolContext;
use crate::tools::response::{ToolFailure, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

/// Input for the select tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct SelectInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub query: SelectQuery,
}

pub struct QueryToolHandler {
    ctx: ToolContext,
}

impl QueryToolHandler {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn select(&self, input: SelectInput) -> ToolResult<RowsResult> {
        let SelectInput { connection, query } = input;
        let built = query.build(connection.vendor)?;
        let statement = built.clone();
        let executor = self.ctx.executor().clone();

        let result = with_connection(self.ctx.manager(connection), move |conn| {
            Box::pin(async move { executor.fetch(conn, &statement).await })
        })
        .await
        .map_err(|e| ToolFailure::at(e, &built))?;

        info!(
            table = %query.table,
            row_count = result.row_count,
            execution_time_ms = result.execution_time_ms,
            "Select executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SchemaCache;
    use crate::error::DbError;
    use std::sync::Arc;

    fn handler() -> QueryToolHandler {
        QueryToolHandler::new(ToolContext::new(Arc::new(SchemaCache::new())))
    }

    fn input(json: serde_json::Value) -> SelectInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_select_input_flattens_connection_and_query() {
        let input = input(serde_json::json!({
            "vendor": "postgresql",
            "connectionString": "postgres://u:p@localhost/app",
            "table": "users",
            "columns": ["id", "email"],
            "where": [{"column": "id", "operator": "gt", "value": 10}],
            "orderBy": [{"column": "id", "direction": "desc"}],
            "limit": 5
        }));
        assert_eq!(input.query.table, "users");
        assert_eq!(input.query.columns.len(), 2);
        assert_eq!(input.query.conditions.len(), 1);
        assert_eq!(input.query.limit, Some(5));
        assert_eq!(input.connection.logical_database(), "app");
    }

    #[tokio::test]
    async fn test_invalid_table_fails_before_connecting() {
        // The host is unreachable; a connection attempt would surface a
        // connection error instead of the identifier error.
        let input = input(serde_json::json!({
            "vendor": "postgresql",
            "connectionString": "postgres://u:p@nonexistent.invalid/app",
            "table": "users; DROP TABLE users"
        }));
        let failure = handler().select(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::InvalidIdentifier { .. }));
        assert!(failure.sql.is_none());
    }

    #[tokio::test]
    async fn test_select_against_memory_database_reports_missing_table() {
        let input = input(serde_json::json!({
            "vendor": "sqlite",
            "connectionString": "sqlite::memory:",
            "table": "missing"
        }));
        let failure = handler().select(input).await.err().unwrap();
        assert_eq!(failure.sql.as_deref(), Some("SELECT * FROM \"missing\""));
        assert_eq!(failure.param_count, 0);
    }
}
