//! Schema drift detection and snapshot import/export.
//!
//! Two snapshots are compared table by table. Table, column, index and
//! primary key names compare ignoring ASCII case; the first occurrence wins
//! when a snapshot holds several tables with the same bare name in different
//! namespaces.

use crate::db::types::map_column_type;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnSchema, DatabaseSchema, ForeignKey, IndexSchema, SqlValue, TableSchema, Vendor,
};
use chrono::DateTime;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Added,
    Removed,
    Changed,
}

/// One property of a column that differs between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChange {
    /// `type`, `isNullable` or `defaultValue`
    pub property: String,
    pub before: JsonValue,
    pub after: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnChange {
    pub name: String,
    pub changes: Vec<PropertyChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableDiff {
    pub name: String,
    pub status: TableStatus,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    pub columns_changed: Vec<ColumnChange>,
    pub primary_key_changed: bool,
    pub indexes_added: Vec<String>,
    pub indexes_removed: Vec<String>,
    pub indexes_changed: Vec<String>,
    pub foreign_keys_added: Vec<ForeignKey>,
    pub foreign_keys_removed: Vec<ForeignKey>,
}

impl TableDiff {
    fn new(name: &str, status: TableStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            columns_added: Vec::new(),
            columns_removed: Vec::new(),
            columns_changed: Vec::new(),
            primary_key_changed: false,
            indexes_added: Vec::new(),
            indexes_removed: Vec::new(),
            indexes_changed: Vec::new(),
            foreign_keys_added: Vec::new(),
            foreign_keys_removed: Vec::new(),
        }
    }

    fn has_changes(&self) -> bool {
        !self.columns_added.is_empty()
            || !self.columns_removed.is_empty()
            || !self.columns_changed.is_empty()
            || self.primary_key_changed
            || !self.indexes_added.is_empty()
            || !self.indexes_removed.is_empty()
            || !self.indexes_changed.is_empty()
            || !self.foreign_keys_added.is_empty()
            || !self.foreign_keys_removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_removed: usize,
    pub tables_changed: usize,
    pub columns_added: usize,
    pub columns_removed: usize,
    pub columns_changed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    pub identical: bool,
    /// Sorted by lowercase table name
    pub tables: Vec<TableDiff>,
    pub summary: DiffSummary,
}

fn by_lower_name<'a, T>(
    items: &'a [T],
    name: impl Fn(&T) -> &str,
) -> BTreeMap<String, &'a T> {
    let mut map = BTreeMap::new();
    for item in items {
        map.entry(name(item).to_ascii_lowercase()).or_insert(item);
    }
    map
}

/// Compare two snapshots. Added tables count only as tables; their columns
/// are not reflected in `columnsAdded`.
pub fn diff_schemas(before: &DatabaseSchema, after: &DatabaseSchema) -> SchemaDiff {
    let old_tables = by_lower_name(&before.tables, |t| t.name.as_str());
    let new_tables = by_lower_name(&after.tables, |t| t.name.as_str());

    let mut tables = Vec::new();
    let mut summary = DiffSummary::default();

    for (key, old) in &old_tables {
        match new_tables.get(key) {
            Some(new) => {
                let diff = diff_table(old, new);
                if diff.has_changes() {
                    summary.tables_changed += 1;
                    summary.columns_added += diff.columns_added.len();
                    summary.columns_removed += diff.columns_removed.len();
                    summary.columns_changed += diff.columns_changed.len();
                    tables.push((key.clone(), diff));
                }
            }
            None => {
                summary.tables_removed += 1;
                tables.push((key.clone(), TableDiff::new(&old.name, TableStatus::Removed)));
            }
        }
    }
    for (key, new) in &new_tables {
        if !old_tables.contains_key(key) {
            summary.tables_added += 1;
            tables.push((key.clone(), TableDiff::new(&new.name, TableStatus::Added)));
        }
    }
    tables.sort_by(|a, b| a.0.cmp(&b.0));

    SchemaDiff {
        identical: tables.is_empty(),
        tables: tables.into_iter().map(|(_, diff)| diff).collect(),
        summary,
    }
}

fn diff_table(old: &TableSchema, new: &TableSchema) -> TableDiff {
    let mut diff = TableDiff::new(&new.name, TableStatus::Changed);

    let old_columns = by_lower_name(&old.columns, |c| c.name.as_str());
    let new_columns = by_lower_name(&new.columns, |c| c.name.as_str());
    for (key, old_col) in &old_columns {
        match new_columns.get(key) {
            Some(new_col) => {
                let changes = diff_column(old_col, new_col);
                if !changes.is_empty() {
                    diff.columns_changed.push(ColumnChange {
                        name: new_col.name.clone(),
                        changes,
                    });
                }
            }
            None => diff.columns_removed.push(old_col.name.clone()),
        }
    }
    for (key, new_col) in &new_columns {
        if !old_columns.contains_key(key) {
            diff.columns_added.push(new_col.name.clone());
        }
    }

    diff.primary_key_changed = old.primary_key.len() != new.primary_key.len()
        || old
            .primary_key
            .iter()
            .zip(&new.primary_key)
            .any(|(a, b)| !a.eq_ignore_ascii_case(b));

    let old_indexes = by_lower_name(&old.indexes, |i| i.name.as_str());
    let new_indexes = by_lower_name(&new.indexes, |i| i.name.as_str());
    for (key, old_idx) in &old_indexes {
        match new_indexes.get(key) {
            Some(new_idx) if !same_index(old_idx, new_idx) => {
                diff.indexes_changed.push(new_idx.name.clone())
            }
            Some(_) => {}
            None => diff.indexes_removed.push(old_idx.name.clone()),
        }
    }
    for (key, new_idx) in &new_indexes {
        if !old_indexes.contains_key(key) {
            diff.indexes_added.push(new_idx.name.clone());
        }
    }

    diff.foreign_keys_removed = old
        .foreign_keys
        .iter()
        .filter(|fk| !new.foreign_keys.contains(fk))
        .cloned()
        .collect();
    diff.foreign_keys_added = new
        .foreign_keys
        .iter()
        .filter(|fk| !old.foreign_keys.contains(fk))
        .cloned()
        .collect();

    diff
}

fn same_index(a: &IndexSchema, b: &IndexSchema) -> bool {
    a.unique == b.unique && a.primary == b.primary && a.columns == b.columns
}

fn default_json(value: &Option<SqlValue>) -> JsonValue {
    value
        .as_ref()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(JsonValue::Null)
}

fn diff_column(old: &ColumnSchema, new: &ColumnSchema) -> Vec<PropertyChange> {
    let mut changes = Vec::new();
    if old.data_type != new.data_type {
        changes.push(PropertyChange {
            property: "type".to_string(),
            before: JsonValue::String(old.data_type.clone()),
            after: JsonValue::String(new.data_type.clone()),
        });
    }
    if old.nullable != new.nullable {
        changes.push(PropertyChange {
            property: "isNullable".to_string(),
            before: JsonValue::Bool(old.nullable),
            after: JsonValue::Bool(new.nullable),
        });
    }
    if old.default_value != new.default_value {
        changes.push(PropertyChange {
            property: "defaultValue".to_string(),
            before: default_json(&old.default_value),
            after: default_json(&new.default_value),
        });
    }
    changes
}

/// Pretty JSON with a fixed field order, so equal snapshots export equal text.
pub fn export_schema_to_json(schema: &DatabaseSchema) -> DbResult<String> {
    serde_json::to_string_pretty(schema)
        .map_err(|e| DbError::internal(format!("Failed to serialize schema: {}", e)))
}

pub fn import_schema_from_json(json: &str) -> DbResult<DatabaseSchema> {
    let value: JsonValue = serde_json::from_str(json)
        .map_err(|e| DbError::schema_import(vec![format!("document is not valid JSON: {}", e)]))?;
    import_schema(value)
}

/// Validate and load a snapshot document.
///
/// Structural problems are collected in one pass and reported together.
/// Columns without a `semanticType` get one derived from their vendor type.
pub fn import_schema(value: JsonValue) -> DbResult<DatabaseSchema> {
    let violations = snapshot_violations(&value);
    if !violations.is_empty() {
        return Err(DbError::schema_import(violations));
    }

    let mut schema: DatabaseSchema = serde_json::from_value(value.clone())
        .map_err(|e| DbError::schema_import(vec![e.to_string()]))?;

    let pk_violations: Vec<String> = schema
        .tables
        .iter()
        .flat_map(|t| t.primary_key_violations())
        .collect();
    if !pk_violations.is_empty() {
        return Err(DbError::schema_import(pk_violations));
    }

    let vendor = schema.vendor;
    for (ti, table) in schema.tables.iter_mut().enumerate() {
        for (ci, column) in table.columns.iter_mut().enumerate() {
            let raw = &value["tables"][ti]["columns"][ci];
            if raw.get("semanticType").is_none() {
                let mapped = map_column_type(vendor, &column.data_type, column.nullable);
                column.semantic_type = mapped.semantic_type;
                if column.type_note.is_none() {
                    column.type_note = mapped.note;
                }
            }
        }
    }
    Ok(schema)
}

fn require_string(obj: &serde_json::Map<String, JsonValue>, path: &str, field: &str, out: &mut Vec<String>) {
    match obj.get(field) {
        None | Some(JsonValue::Null) => out.push(format!("{}{} is required", path, field)),
        Some(JsonValue::String(_)) => {}
        Some(_) => out.push(format!("{}{} must be a string", path, field)),
    }
}

fn require_array<'a>(
    obj: &'a serde_json::Map<String, JsonValue>,
    path: &str,
    field: &str,
    out: &mut Vec<String>,
) -> Option<&'a Vec<JsonValue>> {
    match obj.get(field) {
        None | Some(JsonValue::Null) => {
            out.push(format!("{}{} is required", path, field));
            None
        }
        Some(JsonValue::Array(items)) => Some(items),
        Some(_) => {
            out.push(format!("{}{} must be an array", path, field));
            None
        }
    }
}

fn snapshot_violations(value: &JsonValue) -> Vec<String> {
    let mut out = Vec::new();
    let Some(root) = value.as_object() else {
        out.push("snapshot must be a JSON object".to_string());
        return out;
    };

    match root.get("vendor") {
        None | Some(JsonValue::Null) => out.push("vendor is required".to_string()),
        Some(JsonValue::String(v)) => {
            if serde_json::from_value::<Vendor>(JsonValue::String(v.clone())).is_err() {
                out.push(format!("vendor '{}' is not supported", v));
            }
        }
        Some(_) => out.push("vendor must be a string".to_string()),
    }

    match root.get("generatedAt") {
        None | Some(JsonValue::Null) => out.push("generatedAt is required".to_string()),
        Some(JsonValue::String(ts)) => {
            if DateTime::parse_from_rfc3339(ts).is_err() {
                out.push("generatedAt must be an RFC 3339 timestamp".to_string());
            }
        }
        Some(_) => out.push("generatedAt must be a string".to_string()),
    }

    let Some(tables) = require_array(root, "", "tables", &mut out) else {
        return out;
    };

    for (ti, table) in tables.iter().enumerate() {
        let table_path = format!("tables[{}].", ti);
        let Some(table) = table.as_object() else {
            out.push(format!("tables[{}] must be an object", ti));
            continue;
        };
        require_string(table, &table_path, "name", &mut out);
        if let Some(pk) = require_array(table, &table_path, "primaryKey", &mut out) {
            for (ki, entry) in pk.iter().enumerate() {
                if !entry.is_string() {
                    out.push(format!("{}primaryKey[{}] must be a string", table_path, ki));
                }
            }
        }
        let Some(columns) = require_array(table, &table_path, "columns", &mut out) else {
            continue;
        };
        for (ci, column) in columns.iter().enumerate() {
            let column_path = format!("{}columns[{}].", table_path, ci);
            let Some(column) = column.as_object() else {
                out.push(format!("{}columns[{}] must be an object", table_path, ci));
                continue;
            };
            require_string(column, &column_path, "name", &mut out);
            require_string(column, &column_path, "type", &mut out);
            match column.get("nullable") {
                None | Some(JsonValue::Null) => {
                    out.push(format!("{}nullable is required", column_path))
                }
                Some(JsonValue::Bool(_)) => {}
                Some(_) => out.push(format!("{}nullable must be a boolean", column_path)),
            }
        }
    }
    out
}
