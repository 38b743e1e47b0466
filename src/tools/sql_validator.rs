//! Statement classification for raw SQL.
//!
//! `execute_sql` accepts exactly one statement and needs to know whether it
//! returns rows. Classification parses the statement with
//! [sqlparser](https://docs.rs/sqlparser/) using the vendor's dialect. When
//! the parser does not understand a statement (vendor extensions, named
//! placeholders) the leading keyword of the sanitizer's safety copy decides.

use crate::db::sanitizer::safety_copy;
use crate::error::{DbError, DbResult};
use crate::models::Vendor;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use tracing::debug;

/// How a raw statement is executed and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns rows (SELECT, SHOW, EXPLAIN, PRAGMA, ...)
    Read,
    /// INSERT or REPLACE; reports the generated key where the vendor has one
    Insert,
    /// Any other statement; reports only the affected-row count
    Write,
}

const TRANSACTION_CONTROL: &str =
    "Transaction control statements are not accepted; each call runs on its own connection";

fn parser_dialect(vendor: Vendor) -> Box<dyn Dialect> {
    match vendor {
        Vendor::PostgreSQL => Box::new(PostgreSqlDialect {}),
        Vendor::MySQL => Box::new(MySqlDialect {}),
        Vendor::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Classify a single raw statement.
///
/// Fails with `InvalidInput` for multiple statements and for transaction
/// control, which cannot span separate tool calls.
pub fn classify_sql(sql: &str, vendor: Vendor) -> DbResult<StatementKind> {
    match Parser::parse_sql(parser_dialect(vendor).as_ref(), sql) {
        Ok(statements) => match statements.as_slice() {
            [] => Err(DbError::EmptyQuery),
            [statement] => classify_statement(statement),
            many => Err(DbError::invalid_input(format!(
                "execute_sql runs exactly one statement, got {}",
                many.len()
            ))),
        },
        Err(e) => {
            debug!(error = %e, "Statement not parsed, classifying by leading keyword");
            classify_by_keyword(sql)
        }
    }
}

fn classify_statement(statement: &Statement) -> DbResult<StatementKind> {
    let kind = match statement {
        Statement::Query(_)
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. }
        | Statement::Pragma { .. } => StatementKind::Read,

        // EXPLAIN reports a plan whatever the inner statement is
        Statement::Explain { .. } => StatementKind::Read,

        Statement::Insert(_) => StatementKind::Insert,

        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => {
            return Err(DbError::invalid_input(TRANSACTION_CONTROL));
        }

        _ => StatementKind::Write,
    };
    Ok(kind)
}

fn classify_by_keyword(sql: &str) -> DbResult<StatementKind> {
    let copy = safety_copy(sql);
    let body = copy.trim().trim_end_matches(';');
    if body.contains(';') {
        return Err(DbError::invalid_input(
            "execute_sql runs exactly one statement",
        ));
    }
    let keyword = body
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let kind = match keyword.as_str() {
        "" => return Err(DbError::EmptyQuery),
        "select" | "with" | "show" | "explain" | "describe" | "desc" | "pragma" | "values" => {
            StatementKind::Read
        }
        "insert" | "replace" => StatementKind::Insert,
        "begin" | "start" | "commit" | "rollback" | "savepoint" | "release" | "end" => {
            return Err(DbError::invalid_input(TRANSACTION_CONTROL));
        }
        _ => StatementKind::Write,
    };
    Ok(kind)
}
