//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with all database tools
//! exposed via the MCP protocol using the rmcp framework's macros. Every
//! tool answers with a [`ToolResponse`] envelope; failures are reported in
//! the envelope rather than as protocol errors.

use crate::db::SchemaCache;
use crate::db::executor::{BatchResult, RowsResult, WriteResult, elapsed_ms};
use crate::tools::response::{ToolResponse, ToolResult};
use crate::tools::{
    BatchDeleteInput, BatchUpdateInput, DeleteInput, DiffSchemaInput, DiffSchemaOutput,
    ExecuteSqlInput, ExecuteSqlOutput, GetSchemaInput, GetSchemaOutput, InsertInput,
    QueryToolHandler, SchemaToolHandler, SelectInput, SqlToolHandler, ToolContext, UpdateInput,
    WriteToolHandler,
};
use rmcp::Json;
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct DbService {
    /// Settings and the shared schema cache handed to every handler
    context: ToolContext,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            tool_router: Self::tool_router(),
        }
    }

    /// Service with default settings and a private schema cache.
    pub fn with_defaults() -> Self {
        Self::new(ToolContext::new(Arc::new(SchemaCache::new())))
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }
}

/// Run one tool invocation inside its own span and wrap the outcome.
async fn invoke<T, F>(tool: &'static str, work: F) -> Json<ToolResponse<T>>
where
    F: Future<Output = ToolResult<T>>,
{
    let span = info_span!("tool", tool, invocation_id = %Uuid::new_v4());
    async move {
        let start = Instant::now();
        let result = work.await;
        debug!(
            success = result.is_ok(),
            elapsed_ms = elapsed_ms(start),
            "Tool invocation finished"
        );
        Json(ToolResponse::from_result(tool, result))
    }
    .instrument(span)
    .await
}

#[tool_router]
impl DbService {
    #[tool(
        description = "Read rows from one table.\nColumns, where conditions (eq, ne, gt, lt, gte, lte, like, in, notIn, isNull, isNotNull), orderBy, limit and offset are validated and every value is bound as a parameter.\nOptional row lock (forUpdate, forShare) and softDeleteColumn to hide soft-deleted rows."
    )]
    async fn select(
        &self,
        Parameters(input): Parameters<SelectInput>,
    ) -> Json<ToolResponse<RowsResult>> {
        let handler = QueryToolHandler::new(self.context.clone());
        invoke("select", handler.select(input)).await
    }

    #[tool(
        description = "Insert one or more rows.\nEvery row must name the same columns. Multiple rows are inserted atomically in one transaction."
    )]
    async fn insert(
        &self,
        Parameters(input): Parameters<InsertInput>,
    ) -> Json<ToolResponse<WriteResult>> {
        let handler = WriteToolHandler::new(self.context.clone());
        invoke("insert", handler.insert(input)).await
    }

    #[tool(
        description = "Update rows matching where conditions.\nRefuses to update every row unless allowFullTableUpdate is true.\nWith optimisticLock the update only applies when the lock column still holds the expected value, and fails with OPTIMISTIC_LOCK_FAILED otherwise."
    )]
    async fn update(
        &self,
        Parameters(input): Parameters<UpdateInput>,
    ) -> Json<ToolResponse<WriteResult>> {
        let handler = WriteToolHandler::new(self.context.clone());
        invoke("update", handler.update(input)).await
    }

    #[tool(
        description = "Delete rows matching where conditions.\nRefuses to delete every row unless allowFullTableDelete is true.\nWith softDelete the rows are marked (column set to a value or CURRENT_TIMESTAMP) instead of removed."
    )]
    async fn delete(
        &self,
        Parameters(input): Parameters<DeleteInput>,
    ) -> Json<ToolResponse<WriteResult>> {
        let handler = WriteToolHandler::new(self.context.clone());
        invoke("delete", handler.delete(input)).await
    }

    #[tool(
        description = "Run independent update operations in order.\nbatchSize (default 100, max 1000) bounds each chunk. With continueOnError=false the first failure aborts the batch; with true every outcome is reported."
    )]
    async fn batch_update(
        &self,
        Parameters(input): Parameters<BatchUpdateInput>,
    ) -> Json<ToolResponse<BatchResult>> {
        let handler = WriteToolHandler::new(self.context.clone());
        invoke("batch_update", handler.batch_update(input)).await
    }

    #[tool(
        description = "Run independent delete operations in order.\nbatchSize (default 100, max 1000) bounds each chunk. With continueOnError=false the first failure aborts the batch; with true every outcome is reported."
    )]
    async fn batch_delete(
        &self,
        Parameters(input): Parameters<BatchDeleteInput>,
    ) -> Json<ToolResponse<BatchResult>> {
        let handler = WriteToolHandler::new(self.context.clone());
        invoke("batch_delete", handler.batch_delete(input)).await
    }

    #[tool(
        description = "Describe tables, columns, primary keys, foreign keys and indexes.\nSnapshots are cached per database for cacheTtlMs (default 5 minutes); refreshCache forces a fresh inspection.\nThe returned schema document can be passed to diff_schema."
    )]
    async fn get_schema(
        &self,
        Parameters(input): Parameters<GetSchemaInput>,
    ) -> Json<ToolResponse<GetSchemaOutput>> {
        let handler = SchemaToolHandler::new(self.context.clone());
        invoke("get_schema", handler.get_schema(input)).await
    }

    #[tool(
        description = "Compare two schema snapshots and report added, removed and changed tables and columns.\nPass 'after' as a snapshot document, or vendor and connectionString to compare against the live database."
    )]
    async fn diff_schema(
        &self,
        Parameters(input): Parameters<DiffSchemaInput>,
    ) -> Json<ToolResponse<DiffSchemaOutput>> {
        let handler = SchemaToolHandler::new(self.context.clone());
        invoke("diff_schema", handler.diff_schema(input)).await
    }

    #[tool(
        description = "Execute one raw SQL statement with bound params.\nCREATE, DROP, TRUNCATE and ALTER are blocked. INSERT, UPDATE and DELETE require params, as does any statement with placeholders."
    )]
    async fn execute_sql(
        &self,
        Parameters(input): Parameters<ExecuteSqlInput>,
    ) -> Json<ToolResponse<ExecuteSqlOutput>> {
        let handler = SqlToolHandler::new(self.context.clone());
        invoke("execute_sql", handler.execute_sql(input)).await
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-toolkit".to_owned(),
                title: Some("DB Toolkit".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Safe SQL tools for PostgreSQL, MySQL and SQLite.\n\
                \n\
                ## Connections\n\
                Every call names `vendor` (postgresql, mysql, sqlite) and `connectionString`,\n\
                either a URL or an object with host/port/user/password/database.\n\
                Each call opens and closes its own connection.\n\
                \n\
                ## Responses\n\
                Success: `{\"success\": true, ...}`. Failure: `{\"success\": false, \"error\": {code, category, message, suggestion}}`.\n\
                \n\
                ## Writing\n\
                Prefer `insert`, `update` and `delete`: identifiers are validated and values bound.\n\
                `execute_sql` is for statements the structured tools cannot express.\n\
                \n\
                ## Drift detection\n\
                Save the `schema` from `get_schema`, then call `diff_schema` with it as `before`."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::RowsResult;

    #[test]
    fn test_server_info() {
        let service = DbService::with_defaults();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-toolkit");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_all_tools_registered() {
        let service = DbService::with_defaults();
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "batch_delete",
                "batch_update",
                "delete",
                "diff_schema",
                "execute_sql",
                "get_schema",
                "insert",
                "select",
                "update",
            ]
        );
    }

    #[tokio::test]
    async fn test_invoke_wraps_failure() {
        let Json(response) = invoke::<RowsResult, _>("select", async {
            Err(crate::error::DbError::EmptyQuery.into())
        })
        .await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "EMPTY_QUERY");
    }
}
