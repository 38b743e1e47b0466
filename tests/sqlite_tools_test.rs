//! End-to-end tests of the structured tools against a SQLite file.
//!
//! Every tool call opens and closes its own connection, so these tests also
//! verify that writes are visible to later, independent calls.

use db_toolkit::db::{ConnectionManager, QueryTarget, SchemaCache};
use db_toolkit::error::{DbError, ErrorCategory, GENERIC_INFRASTRUCTURE_MESSAGE};
use db_toolkit::models::{BuiltQuery, ConnectionConfig, Vendor};
use db_toolkit::tools::{
    BatchDeleteInput, BatchUpdateInput, DeleteInput, ExecuteSqlInput, InsertInput,
    QueryToolHandler, SelectInput, SqlToolHandler, ToolContext, UpdateInput, WriteToolHandler,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Create a SQLite file with an `items` table and return its URL.
async fn setup_db() -> String {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the file after the handle is dropped
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let url = format!("sqlite:{}", db_path);

    let mut conn = ConnectionManager::new(ConnectionConfig::from_url(Vendor::SQLite, &url));
    conn.connect().await.unwrap();
    conn.execute(&BuiltQuery::new(
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            price REAL,
            version INTEGER NOT NULL DEFAULT 1,
            deleted_at TEXT
        )",
        vec![],
    ))
    .await
    .unwrap();
    conn.disconnect().await.unwrap();

    url
}

fn context() -> ToolContext {
    ToolContext::new(Arc::new(SchemaCache::new()))
}

/// Merge connection fields into a tool argument object.
fn args(url: &str, rest: Value) -> Value {
    let mut value = json!({ "vendor": "sqlite", "connectionString": url });
    if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), rest) {
        target.extend(extra);
    }
    value
}

async fn insert_items(url: &str, names: &[&str]) {
    let rows: Vec<Value> = names
        .iter()
        .map(|n| json!({ "name": n, "price": 9.5 }))
        .collect();
    let input: InsertInput =
        serde_json::from_value(args(url, json!({ "table": "items", "rows": rows }))).unwrap();
    let result = WriteToolHandler::new(context()).insert(input).await.ok().unwrap();
    assert_eq!(result.row_count, names.len() as u64);
}

async fn select_names(url: &str, extra: Value) -> Vec<String> {
    let mut query = json!({ "table": "items", "orderBy": [{ "column": "id" }] });
    if let (Some(target), Value::Object(extra)) = (query.as_object_mut(), extra) {
        target.extend(extra);
    }
    let input: SelectInput = serde_json::from_value(args(url, query)).unwrap();
    let result = QueryToolHandler::new(context()).select(input).await.ok().unwrap();
    result
        .rows
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_insert_then_select() {
    let url = setup_db().await;
    insert_items(&url, &["apple", "pear", "plum"]).await;

    assert_eq!(select_names(&url, json!({})).await, ["apple", "pear", "plum"]);

    let filtered = select_names(
        &url,
        json!({ "where": [{ "column": "name", "operator": "like", "value": "p%" }], "limit": 1 }),
    )
    .await;
    assert_eq!(filtered, ["pear"]);

    let listed = select_names(
        &url,
        json!({ "where": [{ "column": "name", "operator": "in", "value": ["apple", "plum"] }] }),
    )
    .await;
    assert_eq!(listed, ["apple", "plum"]);
}

#[tokio::test]
async fn test_select_returns_typed_values() {
    let url = setup_db().await;
    insert_items(&url, &["apple"]).await;

    let input: SelectInput = serde_json::from_value(args(
        &url,
        json!({ "table": "items", "columns": ["id", "name", "price", "version"] }),
    ))
    .unwrap();
    let result = QueryToolHandler::new(context()).select(input).await.ok().unwrap();
    assert_eq!(result.row_count, 1);
    let row = &result.rows[0];
    // Columns come back in the order they were requested
    let keys: Vec<&String> = row.keys().collect();
    assert_eq!(keys, ["id", "name", "price", "version"]);
    assert_eq!(row["id"], 1);
    assert_eq!(row["price"], 9.5);
    assert_eq!(row["version"], 1);
}

#[tokio::test]
async fn test_multi_row_insert_is_atomic() {
    let url = setup_db().await;
    // The second row violates NOT NULL on name
    let input: InsertInput = serde_json::from_value(args(
        &url,
        json!({ "table": "items", "rows": [{ "name": "ok" }, { "name": null }] }),
    ))
    .unwrap();
    let failure = WriteToolHandler::new(context()).insert(input).await.err().unwrap();
    assert!(matches!(failure.error, DbError::ConstraintViolation { .. }));
    assert!(failure.sql.unwrap().starts_with("INSERT INTO \"items\""));

    assert!(select_names(&url, json!({})).await.is_empty());
}

#[tokio::test]
async fn test_update_with_optimistic_lock() {
    let url = setup_db().await;
    insert_items(&url, &["apple"]).await;
    let handler = WriteToolHandler::new(context());

    let update = |expected: i64| -> UpdateInput {
        serde_json::from_value(args(
            &url,
            json!({
                "table": "items",
                "data": { "price": 12.0 },
                "where": [{ "column": "id", "operator": "eq", "value": 1 }],
                "optimisticLock": { "column": "version", "expected": expected, "increment": true }
            }),
        ))
        .unwrap()
    };

    let result = handler.update(update(1)).await.ok().unwrap();
    assert_eq!(result.row_count, 1);

    // The row moved to version 2, so expecting 1 again must fail
    let failure = handler.update(update(1)).await.err().unwrap();
    assert!(matches!(failure.error, DbError::OptimisticLockFailed { .. }));
    assert_eq!(failure.error.code(), "OPTIMISTIC_LOCK_FAILED");

    let result = handler.update(update(2)).await.ok().unwrap();
    assert_eq!(result.row_count, 1);
}

#[tokio::test]
async fn test_update_requires_where_unless_allowed() {
    let url = setup_db().await;
    insert_items(&url, &["apple", "pear"]).await;
    let handler = WriteToolHandler::new(context());

    let input: UpdateInput = serde_json::from_value(args(
        &url,
        json!({ "table": "items", "data": { "price": 1.0 } }),
    ))
    .unwrap();
    let failure = handler.update(input).await.err().unwrap();
    assert!(matches!(failure.error, DbError::FullTableMutation { .. }));

    let input: UpdateInput = serde_json::from_value(args(
        &url,
        json!({ "table": "items", "data": { "price": 1.0 }, "allowFullTableUpdate": true }),
    ))
    .unwrap();
    let result = handler.update(input).await.ok().unwrap();
    assert_eq!(result.row_count, 2);
}

#[tokio::test]
async fn test_soft_delete_hides_rows() {
    let url = setup_db().await;
    insert_items(&url, &["apple", "pear"]).await;

    let input: DeleteInput = serde_json::from_value(args(
        &url,
        json!({
            "table": "items",
            "where": [{ "column": "name", "operator": "eq", "value": "apple" }],
            "softDelete": {}
        }),
    ))
    .unwrap();
    let result = WriteToolHandler::new(context()).delete(input).await.ok().unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.soft_deleted, Some(true));

    // The row is still there, but hidden by the soft-delete filter
    assert_eq!(select_names(&url, json!({})).await, ["apple", "pear"]);
    assert_eq!(
        select_names(&url, json!({ "softDeleteColumn": "deleted_at" })).await,
        ["pear"]
    );
}

#[tokio::test]
async fn test_hard_delete() {
    let url = setup_db().await;
    insert_items(&url, &["apple", "pear"]).await;

    let input: DeleteInput = serde_json::from_value(args(
        &url,
        json!({
            "table": "items",
            "where": [{ "column": "name", "operator": "ne", "value": "pear" }]
        }),
    ))
    .unwrap();
    let result = WriteToolHandler::new(context()).delete(input).await.ok().unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.soft_deleted, Some(false));
    assert_eq!(select_names(&url, json!({})).await, ["pear"]);
}

#[tokio::test]
async fn test_batch_update_continue_on_error() {
    let url = setup_db().await;
    insert_items(&url, &["apple", "pear", "plum"]).await;

    let input: BatchUpdateInput = serde_json::from_value(args(
        &url,
        json!({
            "operations": [
                { "table": "items", "data": { "price": 1.0 }, "where": [{ "column": "id", "operator": "eq", "value": 1 }] },
                { "table": "items", "data": { "missing_column": 1 }, "where": [{ "column": "id", "operator": "eq", "value": 2 }] },
                { "table": "items", "data": { "price": 3.0 }, "where": [{ "column": "id", "operator": "eq", "value": 3 }] }
            ],
            "batchSize": 2,
            "continueOnError": true
        }),
    ))
    .unwrap();
    let result = WriteToolHandler::new(context())
        .batch_update(input)
        .await
        .ok()
        .unwrap();

    assert!(result.completed);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 1);
    assert_eq!(result.total_row_count, 2);
    assert_eq!(result.results.len(), 3);
    assert!(result.results[0].success);
    assert!(!result.results[1].success);
    assert_eq!(result.results[1].index, 1);
    assert!(result.results[1].error.is_some());
    assert!(result.results[2].success);
}

#[tokio::test]
async fn test_batch_delete_stops_at_first_failure() {
    let url = setup_db().await;
    insert_items(&url, &["apple", "pear", "plum"]).await;

    let input: BatchDeleteInput = serde_json::from_value(args(
        &url,
        json!({
            "operations": [
                { "table": "items", "where": [{ "column": "id", "operator": "eq", "value": 1 }] },
                { "table": "no_such_table", "where": [{ "column": "id", "operator": "eq", "value": 2 }] },
                { "table": "items", "where": [{ "column": "id", "operator": "eq", "value": 3 }] }
            ]
        }),
    ))
    .unwrap();
    let failure = WriteToolHandler::new(context())
        .batch_delete(input)
        .await
        .err()
        .unwrap();
    assert_eq!(failure.error.code(), "DATABASE_ERROR");

    // Batches are not transactional: the first delete stays applied and the
    // third never ran
    assert_eq!(select_names(&url, json!({})).await, ["pear", "plum"]);
}

#[tokio::test]
async fn test_execute_sql_round_trip() {
    let url = setup_db().await;
    let handler = SqlToolHandler::new(context());

    let input: ExecuteSqlInput = serde_json::from_value(args(
        &url,
        json!({ "sql": "INSERT INTO items (name, price) VALUES (?, ?)", "params": ["fig", 2.5] }),
    ))
    .unwrap();
    let output = handler.execute_sql(input).await.ok().unwrap();
    assert_eq!(output.row_count, 1);
    assert_eq!(output.last_insert_id, Some(1));
    assert!(output.rows.is_none());

    let input: ExecuteSqlInput = serde_json::from_value(args(
        &url,
        json!({ "sql": "SELECT name, price FROM items WHERE price > ?", "params": [1] }),
    ))
    .unwrap();
    let output = handler.execute_sql(input).await.ok().unwrap();
    let rows = output.rows.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "fig");

    let input: ExecuteSqlInput = serde_json::from_value(args(
        &url,
        json!({ "sql": "ALTER TABLE items ADD COLUMN sku TEXT" }),
    ))
    .unwrap();
    let failure = handler.execute_sql(input).await.err().unwrap();
    assert_eq!(failure.error.code(), "DANGEROUS_OPERATION");
}

#[tokio::test]
async fn test_unreachable_database_is_reported() {
    let input: SelectInput = serde_json::from_value(json!({
        "vendor": "sqlite",
        "connectionString": "sqlite:/nonexistent-dir/missing.db",
        "table": "items"
    }))
    .unwrap();
    let failure = QueryToolHandler::new(context()).select(input).await.err().unwrap();
    assert_eq!(failure.error.category(), ErrorCategory::Infrastructure);
    // Driver details stay in the server log
    assert_eq!(
        failure.error.sanitized_message(),
        GENERIC_INFRASTRUCTURE_MESSAGE
    );
    assert_eq!(failure.sql.as_deref(), Some("SELECT * FROM \"items\""));
}
