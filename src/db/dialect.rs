//! Vendor dialects.
//!
//! Everything that differs between PostgreSQL, MySQL and SQLite sits behind
//! the [`Dialect`] trait:
//! - identifier quoting and placeholder syntax
//! - LIMIT/OFFSET and row-lock clauses
//! - the type dictionary used by the type mapper
//! - the introspection SQL used by the schema inspector
//!
//! The set of vendors is closed; [`Vendor::dialect`] selects the implementation.

use crate::models::{LockMode, SemanticType, SqlValue, Vendor};

/// Table reference passed to introspection queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

/// Introspection statements for one vendor.
///
/// Every statement returns text columns under the same aliases on all vendors:
/// - `tables`: `table_schema`, `table_name`
/// - `columns`: `column_name`, `data_type`, `is_nullable` (`YES`/`NO`), `column_default`
/// - `primary_key`: `column_name` in key order
/// - `foreign_keys`: `constraint_name`, `column_name`, `referenced_table`,
///   `referenced_column`, `on_delete`, `on_update`
/// - `indexes`: `index_name`, `column_name`, `is_unique`, `is_primary` in column order
pub struct IntrospectionSql {
    pub tables: &'static str,
    pub columns: &'static str,
    pub primary_key: &'static str,
    pub foreign_keys: &'static str,
    pub indexes: &'static str,
}

pub trait Dialect: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Character wrapped around each identifier segment.
    fn quote_char(&self) -> char;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// LIMIT value emitted when only OFFSET is supplied.
    fn offset_only_limit(&self) -> Option<&'static str>;

    /// Row-lock clause, or `None` when the vendor has no row locks.
    fn lock_clause(&self, mode: LockMode) -> Option<&'static str>;

    /// Look up a normalized type name in the vendor dictionary.
    fn semantic_type(&self, type_name: &str) -> Option<SemanticType>;

    fn introspection(&self) -> &'static IntrospectionSql;

    /// Parameters bound to the per-table introspection statements.
    fn table_params(&self, table: &TableRef) -> Vec<SqlValue> {
        vec![SqlValue::String(table.name.clone())]
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

pub struct Postgres;

const POSTGRES_SQL: IntrospectionSql = IntrospectionSql {
    tables: r#"
        SELECT n.nspname::text AS table_schema, c.relname::text AS table_name
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND n.nspname NOT LIKE 'pg_toast%'
        ORDER BY n.nspname, c.relname
    "#,
    columns: r#"
        SELECT a.attname::text AS column_name,
               format_type(a.atttypid, a.atttypmod) AS data_type,
               CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS is_nullable,
               pg_get_expr(d.adbin, d.adrelid) AS column_default
        FROM pg_attribute a
        JOIN pg_class t ON t.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1 AND t.relname = $2
          AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY a.attnum
    "#,
    primary_key: r#"
        SELECT a.attname::text AS column_name
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN LATERAL unnest(ix.indkey::smallint[]) WITH ORDINALITY AS k(attnum, ord) ON true
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE ix.indisprimary AND n.nspname = $1 AND t.relname = $2
        ORDER BY k.ord
    "#,
    foreign_keys: r#"
        SELECT con.conname::text AS constraint_name,
               a.attname::text AS column_name,
               rt.relname::text AS referenced_table,
               ra.attname::text AS referenced_column,
               CASE con.confdeltype
                   WHEN 'c' THEN 'CASCADE' WHEN 'n' THEN 'SET NULL'
                   WHEN 'd' THEN 'SET DEFAULT' WHEN 'r' THEN 'RESTRICT'
                   ELSE 'NO ACTION' END AS on_delete,
               CASE con.confupdtype
                   WHEN 'c' THEN 'CASCADE' WHEN 'n' THEN 'SET NULL'
                   WHEN 'd' THEN 'SET DEFAULT' WHEN 'r' THEN 'RESTRICT'
                   ELSE 'NO ACTION' END AS on_update
        FROM pg_constraint con
        JOIN pg_class t ON t.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_class rt ON rt.oid = con.confrelid
        JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, ref_attnum) ON true
        JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
        WHERE con.contype = 'f' AND n.nspname = $1 AND t.relname = $2
        ORDER BY con.conname, a.attname
    "#,
    indexes: r#"
        SELECT i.relname::text AS index_name,
               a.attname::text AS column_name,
               CASE WHEN ix.indisunique THEN 'YES' ELSE 'NO' END AS is_unique,
               CASE WHEN ix.indisprimary THEN 'YES' ELSE 'NO' END AS is_primary
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN LATERAL unnest(ix.indkey::smallint[]) WITH ORDINALITY AS k(attnum, ord) ON true
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1 AND t.relname = $2
        ORDER BY i.relname, k.ord
    "#,
};

impl Dialect for Postgres {
    fn vendor(&self) -> Vendor {
        Vendor::PostgreSQL
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn offset_only_limit(&self) -> Option<&'static str> {
        None
    }

    fn lock_clause(&self, mode: LockMode) -> Option<&'static str> {
        Some(match mode {
            LockMode::ForUpdate => "FOR UPDATE",
            LockMode::ForShare => "FOR SHARE",
        })
    }

    fn semantic_type(&self, type_name: &str) -> Option<SemanticType> {
        use SemanticType::*;
        Some(match type_name {
            "smallint" | "integer" | "int" | "int2" | "int4" | "real" | "float4"
            | "double precision" | "float8" | "float" | "smallserial" | "serial" | "serial2"
            | "serial4" | "oid" => Number,
            // Beyond the safe-integer range of JSON consumers
            "bigint" | "int8" | "bigserial" | "serial8" | "numeric" | "decimal" | "money" => {
                String
            }
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "name" | "citext" | "uuid" | "date" | "time" | "timetz" | "timestamp"
            | "timestamptz" | "interval" | "inet" | "cidr" | "macaddr" | "macaddr8" | "xml"
            | "tsvector" => String,
            "boolean" | "bool" => Boolean,
            "bytea" => Bytes,
            "json" | "jsonb" => Json,
            _ => return None,
        })
    }

    fn introspection(&self) -> &'static IntrospectionSql {
        &POSTGRES_SQL
    }

    fn table_params(&self, table: &TableRef) -> Vec<SqlValue> {
        vec![
            SqlValue::String(table.schema.clone().unwrap_or_else(|| "public".to_string())),
            SqlValue::String(table.name.clone()),
        ]
    }
}

// ============================================================================
// MySQL
// ============================================================================

pub struct MySql;

// information_schema columns may come back as VARBINARY, so every text column
// is converted explicitly.
const MYSQL_SQL: IntrospectionSql = IntrospectionSql {
    tables: r#"
        SELECT CONVERT(table_schema USING utf8mb4) AS table_schema,
               CONVERT(table_name USING utf8mb4) AS table_name
        FROM information_schema.tables
        WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#,
    columns: r#"
        SELECT CONVERT(column_name USING utf8mb4) AS column_name,
               CONVERT(column_type USING utf8mb4) AS data_type,
               CONVERT(is_nullable USING utf8mb4) AS is_nullable,
               CONVERT(column_default USING utf8mb4) AS column_default
        FROM information_schema.columns
        WHERE table_schema = DATABASE() AND table_name = ?
        ORDER BY ordinal_position
    "#,
    primary_key: r#"
        SELECT CONVERT(column_name USING utf8mb4) AS column_name
        FROM information_schema.key_column_usage
        WHERE table_schema = DATABASE() AND table_name = ? AND constraint_name = 'PRIMARY'
        ORDER BY ordinal_position
    "#,
    foreign_keys: r#"
        SELECT CONVERT(k.constraint_name USING utf8mb4) AS constraint_name,
               CONVERT(k.column_name USING utf8mb4) AS column_name,
               CONVERT(k.referenced_table_name USING utf8mb4) AS referenced_table,
               CONVERT(k.referenced_column_name USING utf8mb4) AS referenced_column,
               CONVERT(r.delete_rule USING utf8mb4) AS on_delete,
               CONVERT(r.update_rule USING utf8mb4) AS on_update
        FROM information_schema.key_column_usage k
        JOIN information_schema.referential_constraints r
          ON r.constraint_schema = k.constraint_schema
         AND r.constraint_name = k.constraint_name
         AND r.table_name = k.table_name
        WHERE k.table_schema = DATABASE() AND k.table_name = ?
          AND k.referenced_table_name IS NOT NULL
        ORDER BY k.constraint_name, k.ordinal_position
    "#,
    indexes: r#"
        SELECT CONVERT(index_name USING utf8mb4) AS index_name,
               CONVERT(column_name USING utf8mb4) AS column_name,
               CASE WHEN non_unique = 0 THEN 'YES' ELSE 'NO' END AS is_unique,
               CASE WHEN index_name = 'PRIMARY' THEN 'YES' ELSE 'NO' END AS is_primary
        FROM information_schema.statistics
        WHERE table_schema = DATABASE() AND table_name = ?
        ORDER BY index_name, seq_in_index
    "#,
};

impl Dialect for MySql {
    fn vendor(&self) -> Vendor {
        Vendor::MySQL
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn offset_only_limit(&self) -> Option<&'static str> {
        Some("18446744073709551615")
    }

    fn lock_clause(&self, mode: LockMode) -> Option<&'static str> {
        Some(match mode {
            LockMode::ForUpdate => "FOR UPDATE",
            // Accepted by MySQL 5.7+, 8.x and MariaDB alike
            LockMode::ForShare => "LOCK IN SHARE MODE",
        })
    }

    fn semantic_type(&self, type_name: &str) -> Option<SemanticType> {
        use SemanticType::*;
        Some(match type_name {
            "tinyint(1)" | "bit(1)" | "bool" | "boolean" => Boolean,
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "float" | "double"
            | "double precision" | "real" | "year" => Number,
            "bigint" | "decimal" | "numeric" | "dec" | "fixed" => String,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" | "date" | "datetime" | "timestamp" | "time" => String,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit" => {
                Bytes
            }
            "json" => Json,
            _ => return None,
        })
    }

    fn introspection(&self) -> &'static IntrospectionSql {
        &MYSQL_SQL
    }
}

// ============================================================================
// SQLite
// ============================================================================

pub struct Sqlite;

const SQLITE_SQL: IntrospectionSql = IntrospectionSql {
    tables: r#"
        SELECT NULL AS table_schema, name AS table_name
        FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#,
    columns: r#"
        SELECT name AS column_name,
               type AS data_type,
               CASE WHEN "notnull" = 0 AND pk = 0 THEN 'YES' ELSE 'NO' END AS is_nullable,
               dflt_value AS column_default
        FROM pragma_table_info(?)
        ORDER BY cid
    "#,
    primary_key: r#"
        SELECT name AS column_name
        FROM pragma_table_info(?)
        WHERE pk > 0
        ORDER BY pk
    "#,
    foreign_keys: r#"
        SELECT NULL AS constraint_name,
               f."from" AS column_name,
               f."table" AS referenced_table,
               COALESCE(
                   f."to",
                   (SELECT p.name FROM pragma_table_info(f."table") p WHERE p.pk = f.seq + 1)
               ) AS referenced_column,
               f.on_delete AS on_delete,
               f.on_update AS on_update
        FROM pragma_foreign_key_list(?) f
        ORDER BY f.id, f.seq
    "#,
    indexes: r#"
        SELECT il.name AS index_name,
               ii.name AS column_name,
               CASE WHEN il."unique" = 1 THEN 'YES' ELSE 'NO' END AS is_unique,
               CASE WHEN il.origin = 'pk' THEN 'YES' ELSE 'NO' END AS is_primary
        FROM pragma_index_list(?) il, pragma_index_info(il.name) ii
        ORDER BY il.name, ii.seqno
    "#,
};

impl Dialect for Sqlite {
    fn vendor(&self) -> Vendor {
        Vendor::SQLite
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn offset_only_limit(&self) -> Option<&'static str> {
        Some("-1")
    }

    fn lock_clause(&self, _mode: LockMode) -> Option<&'static str> {
        None
    }

    fn semantic_type(&self, type_name: &str) -> Option<SemanticType> {
        use SemanticType::*;
        Some(match type_name {
            "integer" | "int" | "tinyint" | "smallint" | "mediumint" | "real" | "double"
            | "double precision" | "float" => Number,
            // SQLite stores booleans as 0/1 integers
            "boolean" | "bool" => Number,
            "bigint" | "int8" | "unsigned big int" | "numeric" | "decimal" => String,
            "text" | "varchar" | "char" | "character" | "nchar" | "nvarchar"
            | "varying character" | "native character" | "clob" | "date" | "datetime"
            | "timestamp" | "time" | "uuid" => String,
            "blob" => Bytes,
            "json" => Json,
            _ => return None,
        })
    }

    fn introspection(&self) -> &'static IntrospectionSql {
        &SQLITE_SQL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Postgres.placeholder(3), "$3");
        assert_eq!(MySql.placeholder(3), "?");
        assert_eq!(Sqlite.placeholder(1), "?");
    }

    #[test]
    fn test_offset_only_sentinels() {
        assert_eq!(Postgres.offset_only_limit(), None);
        assert_eq!(MySql.offset_only_limit(), Some("18446744073709551615"));
        assert_eq!(Sqlite.offset_only_limit(), Some("-1"));
    }

    #[test]
    fn test_lock_support() {
        assert_eq!(Postgres.lock_clause(LockMode::ForShare), Some("FOR SHARE"));
        assert_eq!(MySql.lock_clause(LockMode::ForUpdate), Some("FOR UPDATE"));
        assert_eq!(Sqlite.lock_clause(LockMode::ForUpdate), None);
    }

    #[test]
    fn test_vendor_dialect_round_trip() {
        for vendor in [Vendor::PostgreSQL, Vendor::MySQL, Vendor::SQLite] {
            assert_eq!(vendor.dialect().vendor(), vendor);
        }
    }

    #[test]
    fn test_table_params() {
        let table = TableRef {
            schema: Some("sales".into()),
            name: "orders".into(),
        };
        assert_eq!(
            Postgres.table_params(&table),
            vec![SqlValue::from("sales"), SqlValue::from("orders")]
        );
        assert_eq!(Sqlite.table_params(&table), vec![SqlValue::from("orders")]);
    }

    #[test]
    fn test_postgres_introspection_uses_numbered_placeholders() {
        let sql = Postgres.introspection();
        for stmt in [sql.columns, sql.primary_key, sql.foreign_keys, sql.indexes] {
            assert!(stmt.contains("$1") && stmt.contains("$2"));
        }
    }
}
