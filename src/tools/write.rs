//! Structured write tools.
//!
//! This module implements `insert`, `update`, `delete`, `batch_update` and
//! `batch_delete`. Requests are compiled to parameterized statements before
//! a connection is opened, so validation failures never reach the database.

use crate::db::executor::{BatchResult, PlannedWrite, WriteResult, plan_batch};
use crate::db::with_connection;
use crate::error::DbResult;
use crate::models::{BatchOptions, ConnectionConfig, DeleteQuery, InsertQuery, UpdateQuery};
use crate::tools::ToolContext;
use crate::tools::response::{ToolFailure, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

/// Input for the insert tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct InsertInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub query: InsertQuery,
}

/// Input for the update tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct UpdateInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub query: UpdateQuery,
}

/// Input for the delete tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct DeleteInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub query: DeleteQuery,
}

/// Input for the batch_update tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct BatchUpdateInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Independent UPDATE operations, run in order
    pub operations: Vec<UpdateQuery>,
    #[serde(flatten)]
    pub options: BatchOptions,
}

/// Input for the batch_delete tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct BatchDeleteInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Independent DELETE operations, run in order
    pub operations: Vec<DeleteQuery>,
    #[serde(flatten)]
    pub options: BatchOptions,
}

pub struct WriteToolHandler {
    ctx: ToolContext,
}

impl WriteToolHandler {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn insert(&self, input: InsertInput) -> ToolResult<WriteResult> {
        let InsertInput { connection, query } = input;
        let statements = query.build(connection.vendor)?;
        // Rows share one column set, so the first statement stands for all
        let template = statements.first().cloned();
        let executor = self.ctx.executor().clone();

        let result = with_connection(self.ctx.manager(connection), move |conn| {
            Box::pin(async move { executor.insert_statements(conn, statements).await })
        })
        .await
        .map_err(|e| match &template {
            Some(statement) => ToolFailure::at(e, statement),
            None => ToolFailure::from(e),
        })?;

        info!(
            table = %query.table,
            rows = query.rows.len(),
            row_count = result.row_count,
            execution_time_ms = result.execution_time_ms,
            "Insert executed"
        );
        Ok(result)
    }

    pub async fn update(&self, input: UpdateInput) -> ToolResult<WriteResult> {
        let UpdateInput { connection, query } = input;
        let planned = PlannedWrite::update(&query, connection.vendor)?;
        self.run_planned(connection, planned, "Update executed").await
    }

    pub async fn delete(&self, input: DeleteInput) -> ToolResult<WriteResult> {
        let DeleteInput { connection, query } = input;
        let planned = PlannedWrite::delete(&query, connection.vendor)?;
        self.run_planned(connection, planned, "Delete executed").await
    }

    async fn run_planned(
        &self,
        connection: ConnectionConfig,
        planned: PlannedWrite,
        message: &'static str,
    ) -> ToolResult<WriteResult> {
        let template = planned.query().clone();
        let executor = self.ctx.executor().clone();
        let result = with_connection(self.ctx.manager(connection), move |conn| {
            Box::pin(async move { executor.execute_planned(conn, &planned).await })
        })
        .await
        .map_err(|e| ToolFailure::at(e, &template))?;

        info!(
            row_count = result.row_count,
            execution_time_ms = result.execution_time_ms,
            "{}", message
        );
        Ok(result)
    }

    pub async fn batch_update(&self, input: BatchUpdateInput) -> ToolResult<BatchResult> {
        let BatchUpdateInput {
            connection,
            operations,
            options,
        } = input;
        let plans = plan_batch(&operations, connection.vendor, PlannedWrite::update);
        self.run_batch(connection, plans, options).await
    }

    pub async fn batch_delete(&self, input: BatchDeleteInput) -> ToolResult<BatchResult> {
        let BatchDeleteInput {
            connection,
            operations,
            options,
        } = input;
        let plans = plan_batch(&operations, connection.vendor, PlannedWrite::delete);
        self.run_batch(connection, plans, options).await
    }

    async fn run_batch(
        &self,
        connection: ConnectionConfig,
        plans: Vec<DbResult<PlannedWrite>>,
        options: BatchOptions,
    ) -> ToolResult<BatchResult> {
        let executor = self.ctx.executor().clone();
        // Checked without connecting
        let batch = executor.prepare_batch(plans, &options)?;

        let operations = batch.len();
        let result = with_connection(self.ctx.manager(connection), move |conn| {
            Box::pin(async move { executor.run_prepared(conn, batch).await })
        })
        .await?;

        info!(
            operations,
            succeeded = result.succeeded,
            failed = result.failed,
            total_row_count = result.total_row_count,
            execution_time_ms = result.execution_time_ms,
            "Batch executed"
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

    const UNREACHABLE: &str = "postgres://u:p@nonexistent.invalid/app";

    fn handler() -> WriteToolHandler {
        WriteToolHandler::new(ToolContext::new(Arc::new(SchemaCache::new())))
    }

    #[tokio::test]
    async fn test_update_without_where_is_refused_before_connecting() {
        let input: UpdateInput = serde_json::from_value(serde_json::json!({
            "vendor": "postgresql",
            "connectionString": UNREACHABLE,
            "table": "users",
            "data": {"active": false}
        }))
        .unwrap();
        let failure = handler().update(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::FullTableMutation { .. }));
    }

    #[tokio::test]
    async fn test_insert_without_rows_is_invalid() {
        let input: InsertInput = serde_json::from_value(serde_json::json!({
            "vendor": "postgresql",
            "connectionString": UNREACHABLE,
            "table": "users",
            "rows": []
        }))
        .unwrap();
        let failure = handler().insert(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_batch_rejects_invalid_operation_before_connecting() {
        let input: BatchDeleteInput = serde_json::from_value(serde_json::json!({
            "vendor": "postgresql",
            "connectionString": UNREACHABLE,
            "operations": [
                {"table": "users", "where": [{"column": "id", "operator": "eq", "value": 1}]},
                {"table": "users"}
            ]
        }))
        .unwrap();
        let failure = handler().batch_delete(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::FullTableMutation { .. }));
    }

    #[tokio::test]
    async fn test_batch_size_out_of_range() {
        let input: BatchUpdateInput = serde_json::from_value(serde_json::json!({
            "vendor": "postgresql",
            "connectionString": UNREACHABLE,
            "operations": [],
            "batchSize": 5000
        }))
        .unwrap();
        let failure = handler().batch_update(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::InvalidInput { .. }));
    }
}
