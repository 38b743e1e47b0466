//! Property tests for the sanitizer and the schema differ.

use chrono::{TimeZone, Utc};
use db_toolkit::db::diff::{diff_schemas, export_schema_to_json, import_schema_from_json};
use db_toolkit::db::sanitizer::{has_placeholders, validate_sql_string};
use db_toolkit::models::{
    ColumnSchema, DatabaseSchema, ForeignKey, ForeignKeyAction, IndexSchema, SemanticType,
    SqlValue, TableSchema, Vendor,
};
use proptest::collection::{btree_set, vec};
use proptest::option;
use proptest::prelude::*;
use proptest::sample::Index;

type ColumnDetails = (String, bool, Option<SqlValue>, SemanticType, Option<String>);
type ForeignKeyParts = (Index, Option<String>, String, String, ForeignKeyAction, ForeignKeyAction);

fn vendor() -> impl Strategy<Value = Vendor> {
    prop_oneof![
        Just(Vendor::PostgreSQL),
        Just(Vendor::MySQL),
        Just(Vendor::SQLite)
    ]
}

fn default_value() -> impl Strategy<Value = SqlValue> {
    prop_oneof![
        Just(SqlValue::Null),
        any::<bool>().prop_map(SqlValue::Bool),
        any::<i64>().prop_map(SqlValue::Int),
        (-1.0e12..1.0e12f64).prop_map(SqlValue::Float),
        Just(SqlValue::Float(0.1 + 0.2)),
        "[ -~]{0,12}".prop_map(SqlValue::String),
    ]
}

fn semantic_type() -> impl Strategy<Value = SemanticType> {
    prop_oneof![
        Just(SemanticType::Number),
        Just(SemanticType::String),
        Just(SemanticType::Boolean),
        Just(SemanticType::Bytes),
        Just(SemanticType::Json),
    ]
}

fn action() -> impl Strategy<Value = ForeignKeyAction> {
    prop_oneof![
        Just(ForeignKeyAction::NoAction),
        Just(ForeignKeyAction::Restrict),
        Just(ForeignKeyAction::Cascade),
        Just(ForeignKeyAction::SetNull),
        Just(ForeignKeyAction::SetDefault),
    ]
}

fn column_details() -> impl Strategy<Value = ColumnDetails> {
    (
        prop_oneof![
            Just("INTEGER".to_string()),
            Just("TEXT".to_string()),
            Just("numeric(10,2)".to_string()),
            Just("jsonb".to_string()),
        ],
        any::<bool>(),
        option::of(default_value()),
        semantic_type(),
        option::of("[a-z ]{1,20}"),
    )
}

fn foreign_key() -> impl Strategy<Value = ForeignKeyParts> {
    (
        any::<Index>(),
        option::of("fk_[a-z]{1,6}"),
        "[a-z]{1,8}",
        "[a-z]{1,8}",
        action(),
        action(),
    )
}

fn index() -> impl Strategy<Value = (String, Vec<Index>, bool, bool)> {
    ("idx_[a-z]{1,6}", vec(any::<Index>(), 1..3), any::<bool>(), any::<bool>())
}

fn table() -> impl Strategy<Value = TableSchema> {
    btree_set("[a-z][a-z0-9_]{0,10}", 1..6)
        .prop_flat_map(|names| {
            let count = names.len();
            (
                "[a-z][a-z0-9_]{0,10}",
                option::of("[a-z]{1,6}"),
                Just(names),
                vec(column_details(), count),
                1..=count,
                vec(foreign_key(), 0..3),
                vec(index(), 0..3),
            )
        })
        .prop_map(|(name, namespace, names, details, pk_len, fks, indexes)| {
            let mut columns: Vec<ColumnSchema> = names
                .into_iter()
                .zip(details)
                .map(|(column, (ty, nullable, default, semantic, note))| {
                    let mut col = ColumnSchema::new(column, ty, nullable);
                    col.default_value = default;
                    col.semantic_type = semantic;
                    col.type_note = note;
                    col
                })
                .collect();
            for col in columns.iter_mut().take(pk_len) {
                col.is_primary_key = true;
            }
            let primary_key: Vec<String> =
                columns.iter().take(pk_len).map(|c| c.name.clone()).collect();
            let foreign_keys = fks
                .into_iter()
                .map(|(at, fk_name, referenced_table, referenced_column, on_delete, on_update)| {
                    ForeignKey {
                        name: fk_name,
                        column: at.get(&columns).name.clone(),
                        referenced_table,
                        referenced_column,
                        on_delete,
                        on_update,
                    }
                })
                .collect();
            let indexes = indexes
                .into_iter()
                .map(|(index_name, at, unique, primary)| IndexSchema {
                    name: index_name,
                    columns: at.iter().map(|i| i.get(&columns).name.clone()).collect(),
                    unique,
                    primary,
                })
                .collect();
            TableSchema::new(name, namespace, columns, primary_key, foreign_keys, indexes).unwrap()
        })
}

fn schema() -> impl Strategy<Value = DatabaseSchema> {
    (vendor(), vec(table(), 0..5), 0..2_000_000_000i64).prop_map(
        |(vendor, mut tables, seconds)| {
            tables.sort_by(|a, b| a.name.cmp(&b.name));
            tables.dedup_by(|a, b| a.name == b.name);
            let generated_at = Utc.timestamp_opt(seconds, 0).unwrap();
            DatabaseSchema::new(vendor, generated_at, tables)
        },
    )
}

proptest! {
    #[test]
    fn keywords_inside_literals_are_ignored(text in "[^'\\x00]{0,40}") {
        let sql = format!("SELECT 'drop {}' AS note", text);
        prop_assert!(validate_sql_string(&sql).is_ok());
    }

    #[test]
    fn keywords_inside_line_comments_are_ignored(text in "[^\\n\\x00]{0,40}") {
        let sql = format!("SELECT 1 -- truncate {}", text);
        prop_assert!(validate_sql_string(&sql).is_ok());
        prop_assert!(!has_placeholders(&sql));
    }

    #[test]
    fn keywords_after_a_literal_are_detected(text in "[^'\\x00]{0,40}") {
        let sql = format!("SELECT '{}'; DROP TABLE t", text);
        prop_assert!(validate_sql_string(&sql).is_err());
    }

    #[test]
    fn schema_is_identical_to_itself(schema in schema()) {
        let diff = diff_schemas(&schema, &schema);
        prop_assert!(diff.identical);
        prop_assert!(diff.tables.is_empty());
    }

    #[test]
    fn export_then_import_preserves_schema(schema in schema()) {
        let json = export_schema_to_json(&schema).unwrap();
        prop_assert_eq!(&json, &export_schema_to_json(&schema).unwrap());
        let imported = import_schema_from_json(&json).unwrap();
        prop_assert_eq!(&imported, &schema);
        prop_assert_eq!(&export_schema_to_json(&imported).unwrap(), &json);
        prop_assert!(diff_schemas(&schema, &imported).identical);
    }
}
