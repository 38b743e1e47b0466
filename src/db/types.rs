//! Type mapping and row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. [`map_column_type`] normalizes a vendor type name and looks it up in the
//!    vendor dictionary, yielding a [`SemanticType`]
//! 2. Vendor-specific decoders extract each row value according to that
//!    category, falling back through the other categories when the driver
//!    refuses the preferred Rust type
//!
//! Mapping never fails: unknown types become [`SemanticType::Json`] with a note.

use crate::models::{SemanticType, Vendor};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use serde_json::Value as JsonValue;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use std::sync::LazyLock;

// =============================================================================
// Type Classification
// =============================================================================

/// Result of mapping a vendor column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    pub semantic_type: SemanticType,
    pub nullable: bool,
    pub note: Option<String>,
}

static SIZE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid size suffix pattern"));

static MODIFIERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(unsigned|signed|zerofill|with(out)? time zone)\b").expect("valid modifier pattern")
});

/// Lowercase, drop size/precision suffixes and vendor modifiers, collapse spaces.
///
/// `"BIGINT(20) UNSIGNED"` → `"bigint"`, `"timestamp(3) with time zone"` → `"timestamp"`.
pub fn normalize_type_name(raw_type: &str) -> String {
    let lower = raw_type.trim().to_lowercase();
    let stripped = SIZE_SUFFIX.replace_all(&lower, " ");
    let stripped = MODIFIERS.replace_all(&stripped, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse(raw_type: &str) -> String {
    raw_type
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a vendor column type to its semantic category.
pub fn map_column_type(vendor: Vendor, raw_type: &str, nullable: bool) -> MappedType {
    let dialect = vendor.dialect();
    let mapped = |semantic_type, note| MappedType {
        semantic_type,
        nullable,
        note,
    };

    let full = collapse(raw_type);
    if full.is_empty() {
        return mapped(SemanticType::Json, Some("no declared type".to_string()));
    }

    if let Some(element) = full.strip_suffix("[]") {
        let inner = map_column_type(vendor, element, true).semantic_type;
        return mapped(SemanticType::Json, Some(format!("array of {}", inner)));
    }

    // Exact spellings first: tinyint(1), unsigned big int
    if let Some(semantic) = dialect.semantic_type(&full) {
        return mapped(semantic, None);
    }

    let base = normalize_type_name(&full);
    match dialect.semantic_type(&base) {
        Some(semantic) => mapped(semantic, None),
        None => mapped(
            SemanticType::Json,
            Some(format!("unrecognized {} type '{}'", vendor, raw_type.trim())),
        ),
    }
}

// =============================================================================
// Value helpers
// =============================================================================

fn is_null<R>(row: &R, idx: usize) -> bool
where
    R: Row,
    usize: ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true)
}

fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, usize>(idx).ok().flatten()
}

fn float_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Encode binary data as base64.
pub fn encode_bytes(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn naive_datetime_json(v: chrono::NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn datetime_json(v: chrono::DateTime<chrono::Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn text_as_json(v: String, semantic: SemanticType) -> JsonValue {
    if semantic == SemanticType::Json {
        if let Ok(parsed) = serde_json::from_str::<JsonValue>(&v) {
            return parsed;
        }
    }
    JsonValue::String(v)
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

fn row_to_map<R>(
    row: &R,
    vendor: Vendor,
    decode: impl Fn(&R, usize, SemanticType) -> Option<JsonValue>,
) -> serde_json::Map<String, JsonValue>
where
    R: Row,
    usize: ColumnIndex<R>,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let value = if is_null(row, idx) {
                JsonValue::Null
            } else {
                let type_name = col.type_info().name();
                let semantic = map_column_type(vendor, type_name, true).semantic_type;
                decode(row, idx, semantic).unwrap_or_else(|| {
                    tracing::warn!(
                        column = %col.name(),
                        type_name = %type_name,
                        "Unable to decode column value, returning null"
                    );
                    JsonValue::Null
                })
            };
            (col.name().to_string(), value)
        })
        .collect()
}

#[cfg(feature = "postgres")]
impl RowToJson for sqlx::postgres::PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        row_to_map(self, Vendor::PostgreSQL, postgres::decode_column)
    }
}

#[cfg(feature = "mysql")]
impl RowToJson for sqlx::mysql::MySqlRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        row_to_map(self, Vendor::MySQL, mysql::decode_column)
    }
}

#[cfg(feature = "sqlite")]
impl RowToJson for sqlx::sqlite::SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        row_to_map(self, Vendor::SQLite, sqlite::decode_column)
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::postgres::PgRow;

    pub fn decode_column(row: &PgRow, idx: usize, semantic: SemanticType) -> Option<JsonValue> {
        let preferred = match semantic {
            SemanticType::Number => decode_number(row, idx),
            SemanticType::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
            SemanticType::Bytes => get::<_, Vec<u8>>(row, idx).map(|b| encode_bytes(&b)),
            SemanticType::Json => get::<_, JsonValue>(row, idx),
            SemanticType::String => decode_text(row, idx, semantic),
        };
        preferred
            .or_else(|| decode_text(row, idx, semantic))
            .or_else(|| decode_number(row, idx))
            .or_else(|| get::<_, bool>(row, idx).map(JsonValue::Bool))
            .or_else(|| get::<_, JsonValue>(row, idx))
            .or_else(|| decode_array(row, idx))
            .or_else(|| get::<_, Vec<u8>>(row, idx).map(|b| encode_bytes(&b)))
    }

    fn decode_number(row: &PgRow, idx: usize) -> Option<JsonValue> {
        get::<_, i16>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, f32>(row, idx).map(|v| float_json(v as f64)))
            .or_else(|| get::<_, f64>(row, idx).map(float_json))
    }

    fn decode_text(row: &PgRow, idx: usize, semantic: SemanticType) -> Option<JsonValue> {
        get::<_, String>(row, idx)
            .map(|v| text_as_json(v, semantic))
            .or_else(|| get::<_, i64>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, Decimal>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, DateTime<Utc>>(row, idx).map(datetime_json))
            .or_else(|| get::<_, NaiveDateTime>(row, idx).map(naive_datetime_json))
            .or_else(|| get::<_, NaiveDate>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, NaiveTime>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, uuid::Uuid>(row, idx).map(|v| JsonValue::String(v.to_string())))
    }

    fn decode_array(row: &PgRow, idx: usize) -> Option<JsonValue> {
        get::<_, Vec<String>>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, Vec<i64>>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, Vec<i32>>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, Vec<f64>>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, Vec<bool>>(row, idx).map(JsonValue::from))
    }
}

#[cfg(feature = "mysql")]
mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::mysql::MySqlRow;

    pub fn decode_column(row: &MySqlRow, idx: usize, semantic: SemanticType) -> Option<JsonValue> {
        let preferred = match semantic {
            SemanticType::Number => decode_number(row, idx),
            SemanticType::Boolean => get::<_, bool>(row, idx)
                .or_else(|| get::<_, i8>(row, idx).map(|v| v != 0))
                .map(JsonValue::Bool),
            SemanticType::Bytes => get::<_, Vec<u8>>(row, idx).map(|b| encode_bytes(&b)),
            SemanticType::Json => get::<_, JsonValue>(row, idx),
            SemanticType::String => decode_text(row, idx, semantic),
        };
        preferred
            .or_else(|| decode_text(row, idx, semantic))
            .or_else(|| decode_number(row, idx))
            .or_else(|| get::<_, bool>(row, idx).map(JsonValue::Bool))
            .or_else(|| get::<_, JsonValue>(row, idx))
            .or_else(|| get::<_, Vec<u8>>(row, idx).map(|b| encode_bytes(&b)))
    }

    fn decode_number(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        get::<_, i8>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, i16>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u8>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u16>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, f32>(row, idx).map(|v| float_json(v as f64)))
            .or_else(|| get::<_, f64>(row, idx).map(float_json))
    }

    fn decode_text(row: &MySqlRow, idx: usize, semantic: SemanticType) -> Option<JsonValue> {
        get::<_, String>(row, idx)
            .map(|v| text_as_json(v, semantic))
            // information_schema text may arrive as VARBINARY
            .or_else(|| {
                get::<_, Vec<u8>>(row, idx)
                    .and_then(|b| String::from_utf8(b).ok())
                    .map(|v| text_as_json(v, semantic))
            })
            .or_else(|| get::<_, i64>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, u64>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, Decimal>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, DateTime<Utc>>(row, idx).map(datetime_json))
            .or_else(|| get::<_, NaiveDateTime>(row, idx).map(naive_datetime_json))
            .or_else(|| get::<_, NaiveDate>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, NaiveTime>(row, idx).map(|v| JsonValue::String(v.to_string())))
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use sqlx::sqlite::SqliteRow;

    pub fn decode_column(row: &SqliteRow, idx: usize, semantic: SemanticType) -> Option<JsonValue> {
        let preferred = match semantic {
            SemanticType::Number => decode_number(row, idx),
            SemanticType::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
            SemanticType::Bytes => get::<_, Vec<u8>>(row, idx).map(|b| encode_bytes(&b)),
            SemanticType::Json | SemanticType::String => decode_text(row, idx, semantic),
        };
        preferred
            .or_else(|| decode_text(row, idx, semantic))
            .or_else(|| decode_number(row, idx))
            .or_else(|| get::<_, Vec<u8>>(row, idx).map(|b| encode_bytes(&b)))
    }

    fn decode_number(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, f64>(row, idx).map(float_json))
            .or_else(|| get::<_, bool>(row, idx).map(|b| JsonValue::from(b as i64)))
    }

    fn decode_text(row: &SqliteRow, idx: usize, semantic: SemanticType) -> Option<JsonValue> {
        get::<_, String>(row, idx)
            .map(|v| text_as_json(v, semantic))
            .or_else(|| get::<_, NaiveDateTime>(row, idx).map(naive_datetime_json))
            .or_else(|| get::<_, NaiveDate>(row, idx).map(|v| JsonValue::String(v.to_string())))
            .or_else(|| get::<_, NaiveTime>(row, idx).map(|v| JsonValue::String(v.to_string())))
    }
}
