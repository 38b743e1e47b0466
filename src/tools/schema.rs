//! Schema introspection and drift tools.
//!
//! This module implements the `get_schema` and `diff_schema` MCP tools. The
//! `schema` field of a `get_schema` response is a snapshot document that
//! `diff_schema` accepts back as `before` or `after`.

use crate::db::diff::{SchemaDiff, diff_schemas, import_schema};
use crate::db::schema::InspectOptions;
use crate::db::with_manager;
use crate::error::DbError;
use crate::models::{ConnectionConfig, DatabaseSchema, SchemaSummary};
use crate::tools::ToolContext;
use crate::tools::response::ToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Input for the get_schema tool.
#[derive(Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSchemaInput {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Only describe these tables (bare or schema-qualified names)
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    /// Accept a cached snapshot up to this old. 0 disables caching. Default: 300000
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    /// Ignore any cached snapshot and re-inspect
    #[serde(default)]
    pub refresh_cache: bool,
}

/// Output from the get_schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSchemaOutput {
    pub schema: DatabaseSchema,
    pub summary: SchemaSummary,
    /// True when served from the schema cache
    pub cached: bool,
}

/// Input for the diff_schema tool.
#[derive(Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffSchemaInput {
    /// Baseline snapshot, as returned in `get_schema`'s `schema` field
    pub before: JsonValue,
    /// Snapshot to compare with. Omit to inspect the database given by
    /// vendor and connectionString instead.
    #[serde(default)]
    pub after: Option<JsonValue>,
    #[serde(flatten)]
    pub connection: Option<ConnectionConfig>,
    /// Restrict a live inspection to these tables
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

/// Output from the diff_schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DiffSchemaOutput {
    pub diff: SchemaDiff,
}

pub struct SchemaToolHandler {
    ctx: ToolContext,
}

impl SchemaToolHandler {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn get_schema(&self, input: GetSchemaInput) -> ToolResult<GetSchemaOutput> {
        let options = InspectOptions {
            tables: input.tables,
            cache_ttl_ms: input
                .cache_ttl_ms
                .unwrap_or(self.ctx.schema_cache_ttl_ms()),
            refresh_cache: input.refresh_cache,
        };
        let inspection = self.inspect(input.connection, options).await?;
        let schema = inspection.schema.as_ref().clone();
        let summary = schema.summary();

        info!(
            vendor = %schema.vendor,
            tables = summary.table_count,
            cached = inspection.cached,
            "Schema inspected"
        );
        Ok(GetSchemaOutput {
            schema,
            summary,
            cached: inspection.cached,
        })
    }

    pub async fn diff_schema(&self, input: DiffSchemaInput) -> ToolResult<DiffSchemaOutput> {
        let before = import_schema(input.before)?;
        let after = match (input.after, input.connection) {
            (Some(after), _) => import_schema(after)?,
            (None, Some(connection)) => {
                // Drift checks compare against the database as it is now
                let options = InspectOptions {
                    tables: input.tables,
                    cache_ttl_ms: self.ctx.schema_cache_ttl_ms(),
                    refresh_cache: true,
                };
                self.inspect(connection, options).await?.schema.as_ref().clone()
            }
            (None, None) => {
                return Err(DbError::invalid_input(
                    "diff_schema needs either 'after' or vendor and connectionString",
                )
                .into());
            }
        };

        let diff = diff_schemas(&before, &after);
        info!(
            identical = diff.identical,
            tables_added = diff.summary.tables_added,
            tables_removed = diff.summary.tables_removed,
            tables_changed = diff.summary.tables_changed,
            "Schema diff computed"
        );
        Ok(DiffSchemaOutput { diff })
    }

    async fn inspect(
        &self,
        connection: ConnectionConfig,
        options: InspectOptions,
    ) -> ToolResult<crate::db::Inspection> {
        let inspector = self.ctx.inspector().clone();
        let inspection = with_manager(self.ctx.manager(connection), move |conn| {
            Box::pin(async move { inspector.inspect(conn, &options).await })
        })
        .await?;
        Ok(inspection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SchemaCache;
    use crate::db::diff::export_schema_to_json;
    use crate::models::{ColumnSchema, TableSchema, Vendor};
    use chrono::Utc;
    use std::sync::Arc;

    fn handler() -> SchemaToolHandler {
        SchemaToolHandler::new(ToolContext::new(Arc::new(SchemaCache::new())))
    }

    fn snapshot(columns: &[&str]) -> JsonValue {
        let table = TableSchema::new(
            "notes",
            None,
            columns
                .iter()
                .map(|c| ColumnSchema::new(*c, "TEXT", true))
                .collect(),
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        let schema = DatabaseSchema::new(Vendor::SQLite, Utc::now(), vec![table]);
        serde_json::from_str(&export_schema_to_json(&schema).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_diff_two_documents() {
        let input: DiffSchemaInput = serde_json::from_value(serde_json::json!({
            "before": snapshot(&["body"]),
            "after": snapshot(&["body", "title"])
        }))
        .unwrap();
        let output = handler().diff_schema(input).await.ok().unwrap();
        assert!(!output.diff.identical);
        assert_eq!(output.diff.summary.columns_added, 1);
    }

    #[tokio::test]
    async fn test_diff_requires_after_or_connection() {
        let input: DiffSchemaInput =
            serde_json::from_value(serde_json::json!({ "before": snapshot(&["body"]) })).unwrap();
        assert!(input.connection.is_none());
        let failure = handler().diff_schema(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_diff_rejects_malformed_before() {
        let input: DiffSchemaInput = serde_json::from_value(serde_json::json!({
            "before": {"vendor": "sqlite"},
            "after": snapshot(&["body"])
        }))
        .unwrap();
        let failure = handler().diff_schema(input).await.err().unwrap();
        assert!(matches!(failure.error, DbError::SchemaImport { .. }));
    }

    #[tokio::test]
    async fn test_get_schema_of_memory_database() {
        let input: GetSchemaInput = serde_json::from_value(serde_json::json!({
            "vendor": "sqlite",
            "connectionString": "sqlite::memory:"
        }))
        .unwrap();
        let output = handler().get_schema(input).await.ok().unwrap();
        assert!(output.schema.tables.is_empty());
        assert_eq!(output.summary.table_count, 0);
        assert!(!output.cached);
    }
}
