//! Schema snapshot data models.
//!
//! A [`DatabaseSchema`] is produced by the schema inspector or by importing a
//! previously exported snapshot. All types serialize with camelCase keys.

use crate::error::{DbError, DbResult};
use crate::models::connection::Vendor;
use crate::models::query::SqlValue;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Broad value category a column maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Number,
    String,
    Boolean,
    Bytes,
    /// Open or untrusted type; values pass through as JSON
    #[default]
    Json,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Bytes => "bytes",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    /// Vendor-specific type as reported by the database
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    /// Omitted when unset; an explicit `null` reads back as `Some(SqlValue::Null)`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_default"
    )]
    #[schemars(with = "Option<SqlValue>")]
    pub default_value: Option<SqlValue>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub semantic_type: SemanticType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_note: Option<String>,
}

fn explicit_default<'de, D>(deserializer: D) -> Result<Option<SqlValue>, D::Error>
where
    D: Deserializer<'de>,
{
    SqlValue::deserialize(deserializer).map(Some)
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            semantic_type: SemanticType::Json,
            type_note: None,
        }
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced)
    #[default]
    NoAction,
    /// Restrict (same as NoAction in most databases)
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    /// Namespace (PostgreSQL schema, MySQL database); absent for SQLite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// Assemble a table, checking every primary key column exists.
    pub fn new(
        name: impl Into<String>,
        schema: Option<String>,
        columns: Vec<ColumnSchema>,
        primary_key: Vec<String>,
        foreign_keys: Vec<ForeignKey>,
        indexes: Vec<IndexSchema>,
    ) -> DbResult<Self> {
        let table = Self {
            name: name.into(),
            schema,
            columns,
            primary_key,
            foreign_keys,
            indexes,
        };
        let violations = table.primary_key_violations();
        if violations.is_empty() {
            Ok(table)
        } else {
            Err(DbError::schema_import(violations))
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn primary_key_violations(&self) -> Vec<String> {
        self.primary_key
            .iter()
            .filter(|pk| self.column(pk).is_none())
            .map(|pk| {
                format!(
                    "table '{}': primary key column '{}' is not among its columns",
                    self.name, pk
                )
            })
            .collect()
    }

    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// Whether `name` (bare or `schema.table`) names this table, ignoring case.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.qualified_name().eq_ignore_ascii_case(name)
    }
}

/// Point-in-time description of a database's tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchema {
    pub vendor: Vendor,
    /// RFC 3339 timestamp
    #[schemars(with = "String")]
    pub generated_at: DateTime<Utc>,
    pub tables: Vec<TableSchema>,
}

/// Counts reported alongside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub table_count: usize,
    pub column_count: usize,
    pub foreign_key_count: usize,
    pub index_count: usize,
}

impl DatabaseSchema {
    pub fn new(vendor: Vendor, generated_at: DateTime<Utc>, tables: Vec<TableSchema>) -> Self {
        Self {
            vendor,
            generated_at,
            tables,
        }
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Copy of this snapshot restricted to the named tables (case-insensitive).
    pub fn filtered(&self, names: &[String]) -> Self {
        let tables = self
            .tables
            .iter()
            .filter(|t| names.iter().any(|n| t.matches_name(n)))
            .cloned()
            .collect();
        Self::new(self.vendor, self.generated_at, tables)
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            table_count: self.tables.len(),
            column_count: self.tables.iter().map(|t| t.columns.len()).sum(),
            foreign_key_count: self.tables.iter().map(|t| t.foreign_keys.len()).sum(),
            index_count: self.tables.iter().map(|t| t.indexes.len()).sum(),
        }
    }
}

/// Parse a column default as reported by the database into a scalar.
///
/// Quoted literals are unquoted (and PostgreSQL `::type` casts dropped);
/// numbers and booleans are typed according to the column's semantic type.
/// `NULL` defaults yield `None`. Expressions stay as strings.
pub fn parse_default_value(default_str: &str, semantic_type: SemanticType) -> Option<SqlValue> {
    let mut raw = default_str.trim();
    // SQLite keeps parentheses around expression defaults: (0), ('x')
    while is_parenthesized(raw) {
        raw = raw[1..raw.len() - 1].trim();
    }
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.to_lowercase().starts_with("null::")
    {
        return None;
    }

    if let Some(literal) = unquote_literal(raw) {
        return Some(SqlValue::String(literal));
    }

    match semantic_type {
        SemanticType::Number => {
            if let Ok(n) = raw.parse::<i64>() {
                return Some(SqlValue::Int(n));
            }
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() {
                    return Some(SqlValue::Float(f));
                }
            }
        }
        SemanticType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "1" | "t" => return Some(SqlValue::Bool(true)),
            "false" | "0" | "f" => return Some(SqlValue::Bool(false)),
            _ => {}
        },
        _ => {}
    }

    // Everything else: decimals, big integers, expressions, etc.
    Some(SqlValue::String(raw.to_string()))
}

/// True when the outer parentheses of `raw` enclose the whole string.
fn is_parenthesized(raw: &str) -> bool {
    if !(raw.starts_with('(') && raw.ends_with(')')) {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != raw.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// `'it''s'` or `'it''s'::text` → `it's`; `None` if `raw` is not a single literal.
fn unquote_literal(raw: &str) -> Option<String> {
    let body = raw.strip_prefix('\'')?;
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                out.push('\'');
                continue;
            }
            let rest = body[i + 1..].trim();
            return (rest.is_empty() || rest.starts_with("::")).then_some(out);
        }
        out.push(c);
    }
    None
}
