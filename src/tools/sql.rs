//! Guarded raw SQL tool.
//!
//! `execute_sql` runs one caller-written statement after the sanitizer has
//! rejected schema-changing keywords and unparameterized mutations. Values
//! always travel as bound parameters.

use crate::db::connection::JsonRow;
use crate::db::sanitizer::{enforce_parameterized_query_usage, validate_sql_string};
use crate::db::with_connection;
use crate::models::{BuiltQuery, ConnectionConfig, SqlValue};
use crate::tools::ToolContext;
use crate::tools::response::{ToolFailure, ToolResult};
use crate::tools::sql_validator::{StatementKind, classify_sql};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for the execute_sql tool.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct ExecuteSqlInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// One SQL statement. Use $1.. (PostgreSQL) or ? (MySQL, SQLite) placeholders.
    pub sql: String,
    /// Positional parameters bound to the placeholders
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

/// Output from the execute_sql tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSqlOutput {
    /// Result rows for row-returning statements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<JsonRow>>,
    /// Rows returned, or rows affected for writes
    pub row_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

pub struct SqlToolHandler {
    ctx: ToolContext,
}

impl SqlToolHandler {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn execute_sql(&self, input: ExecuteSqlInput) -> ToolResult<ExecuteSqlOutput> {
        let ExecuteSqlInput {
            connection,
            sql,
            params,
        } = input;
        validate_sql_string(&sql)?;
        enforce_parameterized_query_usage(&sql, &params)?;
        let kind = classify_sql(&sql, connection.vendor)?;

        let built = BuiltQuery::new(sql, params);
        let statement = built.clone();
        let executor = self.ctx.executor().clone();
        let output = with_connection(self.ctx.manager(connection), move |conn| {
            Box::pin(async move {
                match kind {
                    StatementKind::Read => {
                        let result = executor.fetch(conn, &statement).await?;
                        Ok(ExecuteSqlOutput {
                            row_count: result.row_count as u64,
                            rows: Some(result.rows),
                            last_insert_id: None,
                            execution_time_ms: result.execution_time_ms,
                        })
                    }
                    StatementKind::Insert => {
                        let result = executor.insert_statements(conn, vec![statement]).await?;
                        Ok(ExecuteSqlOutput {
                            rows: None,
                            row_count: result.row_count,
                            last_insert_id: result.last_insert_id,
                            execution_time_ms: result.execution_time_ms,
                        })
                    }
                    StatementKind::Write => {
                        let result = executor.execute(conn, &statement).await?;
                        Ok(ExecuteSqlOutput {
                            rows: None,
                            row_count: result.row_count,
                            last_insert_id: None,
                            execution_time_ms: result.execution_time_ms,
                        })
                    }
                }
            })
        })
        .await
        .map_err(|e| ToolFailure::at(e, &built))?;

        info!(
            kind = ?kind,
            row_count = output.row_count,
            execution_time_ms = output.execution_time_ms,
            "Raw SQL executed"
        );
        Ok(output)
    }
}
