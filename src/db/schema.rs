//! Schema introspection.
//!
//! The inspector runs the dialect's introspection statements through an open
//! [`ConnectionManager`] and assembles a [`DatabaseSchema`]. Complete
//! snapshots are cached in a shared [`SchemaCache`]; a fresh entry is served
//! without touching the connection at all.

use crate::db::cache::{DEFAULT_SCHEMA_CACHE_TTL_MS, SchemaCache, SchemaCacheKey};
use crate::db::connection::{ConnectionManager, JsonRow, QueryTarget};
use crate::db::dialect::TableRef;
use crate::db::executor::elapsed_ms;
use crate::db::identifier::validate_identifier;
use crate::db::types::map_column_type;
use crate::error::DbResult;
use crate::models::{
    BuiltQuery, ColumnSchema, ConnectionConfig, DatabaseSchema, ForeignKey, ForeignKeyAction,
    IndexSchema, TableSchema, parse_default_value,
};
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct InspectOptions {
    /// Restrict the snapshot to these tables (bare or `schema.table`)
    pub tables: Option<Vec<String>>,
    pub cache_ttl_ms: u64,
    /// Ignore any cached snapshot
    pub refresh_cache: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            tables: None,
            cache_ttl_ms: DEFAULT_SCHEMA_CACHE_TTL_MS,
            refresh_cache: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inspection {
    pub schema: Arc<DatabaseSchema>,
    /// Served from the cache without querying the database
    pub cached: bool,
}

/// Schema inspector for database introspection.
#[derive(Debug, Clone)]
pub struct SchemaInspector {
    cache: Arc<SchemaCache>,
}

impl SchemaInspector {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Evict the cached snapshot for `config` ahead of the next inspection.
    pub async fn invalidate_cache(&self, config: &ConnectionConfig) -> bool {
        self.cache.invalidate(&SchemaCacheKey::for_config(config)).await
    }

    /// Describe the database behind `conn`, connecting only when needed.
    pub async fn inspect(
        &self,
        conn: &mut ConnectionManager,
        options: &InspectOptions,
    ) -> DbResult<Inspection> {
        let filter = options.tables.as_deref().filter(|t| !t.is_empty());
        if let Some(names) = filter {
            for name in names {
                validate_identifier(name)?;
            }
        }

        let key = SchemaCacheKey::for_config(conn.config());
        if !options.refresh_cache {
            if let Some(schema) = self.cache.get(&key, options.cache_ttl_ms).await {
                let schema = match filter {
                    Some(names) => Arc::new(schema.filtered(names)),
                    None => schema,
                };
                return Ok(Inspection {
                    schema,
                    cached: true,
                });
            }
        }

        if !conn.is_connected() {
            conn.connect().await?;
        }
        let schema = Arc::new(introspect(conn, filter).await?);
        if filter.is_none() {
            self.cache
                .put(key, schema.clone(), options.cache_ttl_ms)
                .await;
        }
        Ok(Inspection {
            schema,
            cached: false,
        })
    }
}

/// Text value of a result cell. Numbers and booleans are rendered as text.
fn text(row: &JsonRow, column: &str) -> Option<String> {
    match row.get(column)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn is_yes(row: &JsonRow, column: &str) -> bool {
    text(row, column).is_some_and(|v| v.eq_ignore_ascii_case("yes"))
}

fn matches_filter(table: &TableRef, names: &[String]) -> bool {
    names.iter().any(|n| {
        table.name.eq_ignore_ascii_case(n)
            || table
                .schema
                .as_ref()
                .is_some_and(|s| format!("{}.{}", s, table.name).eq_ignore_ascii_case(n))
    })
}

async fn introspect(
    conn: &mut ConnectionManager,
    filter: Option<&[String]>,
) -> DbResult<DatabaseSchema> {
    let start = Instant::now();
    let vendor = conn.vendor();
    let sql = vendor.dialect().introspection();

    let table_rows = conn.fetch(&BuiltQuery::new(sql.tables, vec![])).await?;
    let refs: Vec<TableRef> = table_rows
        .iter()
        .filter_map(|row| {
            Some(TableRef {
                schema: text(row, "table_schema"),
                name: text(row, "table_name")?,
            })
        })
        .filter(|t| filter.is_none_or(|names| matches_filter(t, names)))
        .collect();

    let mut tables = Vec::with_capacity(refs.len());
    for table in &refs {
        tables.push(inspect_table(conn, table).await?);
    }

    info!(
        vendor = %vendor,
        tables = tables.len(),
        elapsed_ms = elapsed_ms(start),
        "Schema introspected"
    );
    Ok(DatabaseSchema::new(vendor, Utc::now(), tables))
}

async fn inspect_table(conn: &mut ConnectionManager, table: &TableRef) -> DbResult<TableSchema> {
    let vendor = conn.vendor();
    let dialect = vendor.dialect();
    let sql = dialect.introspection();
    let params = dialect.table_params(table);
    let query = |statement: &str| BuiltQuery::new(statement, params.clone());

    debug!(vendor = %vendor, table = %table.name, "Inspecting table");

    let primary_key: Vec<String> = conn
        .fetch(&query(sql.primary_key))
        .await?
        .iter()
        .filter_map(|row| text(row, "column_name"))
        .collect();

    let columns = conn
        .fetch(&query(sql.columns))
        .await?
        .iter()
        .filter_map(|row| {
            let name = text(row, "column_name")?;
            let data_type = text(row, "data_type").unwrap_or_default();
            let mapped = map_column_type(vendor, &data_type, is_yes(row, "is_nullable"));
            let mut column = ColumnSchema::new(name, data_type, mapped.nullable);
            column.default_value = text(row, "column_default")
                .and_then(|d| parse_default_value(&d, mapped.semantic_type));
            column.is_primary_key = primary_key.contains(&column.name);
            column.semantic_type = mapped.semantic_type;
            column.type_note = mapped.note;
            Some(column)
        })
        .collect();

    let foreign_keys = conn
        .fetch(&query(sql.foreign_keys))
        .await?
        .iter()
        .filter_map(|row| {
            Some(ForeignKey {
                name: text(row, "constraint_name"),
                column: text(row, "column_name")?,
                referenced_table: text(row, "referenced_table")?,
                referenced_column: text(row, "referenced_column").unwrap_or_default(),
                on_delete: ForeignKeyAction::parse(&text(row, "on_delete").unwrap_or_default()),
                on_update: ForeignKeyAction::parse(&text(row, "on_update").unwrap_or_default()),
            })
        })
        .collect();

    // One row per indexed column, ordered by index then position
    let mut indexes: Vec<IndexSchema> = Vec::new();
    for row in conn.fetch(&query(sql.indexes)).await? {
        let (Some(name), Some(column)) = (text(&row, "index_name"), text(&row, "column_name"))
        else {
            continue;
        };
        match indexes.last_mut() {
            Some(index) if index.name == name => index.columns.push(column),
            _ => indexes.push(IndexSchema {
                name,
                columns: vec![column],
                unique: is_yes(&row, "is_unique"),
                primary: is_yes(&row, "is_primary"),
            }),
        }
    }

    TableSchema::new(
        table.name.clone(),
        table.schema.clone(),
        columns,
        primary_key,
        foreign_keys,
        indexes,
    )
}
