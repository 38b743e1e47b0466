//! Raw SQL safety checks.
//!
//! Checks run against a safety-analysis copy of the statement in which
//! comments become a single space and string literals become `''`. Keywords
//! and placeholders that only appear inside comments or literals are therefore
//! never seen.
//!
//! Blocked keywords: `CREATE`, `DROP`, `TRUNCATE`, `ALTER` (whole words, any
//! case). Other privileged statements such as `GRANT` or `VACUUM` pass through.

use crate::error::{DbError, DbResult};
use crate::models::SqlValue;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Block comments (an unterminated one runs to the end), line comments and
/// single-quoted literals with `''` escapes, matched left to right.
static COMMENT_OR_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)/\*.*?(?:\*/|\z)|--[^\n]*|'(?:[^']|'')*'").expect("valid masking pattern")
});

static DANGEROUS_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(create|drop|truncate|alter)\b").expect("valid keyword pattern")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\d+|\?|(?:^|[^:]):[A-Za-z_][A-Za-z0-9_]*").expect("valid placeholder pattern")
});

static LEADING_MUTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(insert|update|delete)\b").expect("valid mutation pattern")
});

/// Copy of `sql` with comments replaced by a space and literals by `''`.
pub fn safety_copy(sql: &str) -> Cow<'_, str> {
    COMMENT_OR_LITERAL.replace_all(sql, |caps: &regex::Captures<'_>| {
        if caps[0].starts_with('\'') {
            "''"
        } else {
            " "
        }
    })
}

/// Reject blank input, null bytes and schema-changing statements.
pub fn validate_sql_string(sql: &str) -> DbResult<()> {
    if sql.trim().is_empty() {
        return Err(DbError::EmptyQuery);
    }
    if sql.contains('\0') {
        return Err(DbError::NullByte);
    }
    let copy = safety_copy(sql);
    if let Some(m) = DANGEROUS_KEYWORD.find(&copy) {
        return Err(DbError::dangerous_operation(m.as_str().to_uppercase()));
    }
    Ok(())
}

/// Whether the statement references `$n`, `?` or `:name` placeholders.
pub fn has_placeholders(sql: &str) -> bool {
    PLACEHOLDER.is_match(&safety_copy(sql))
}

/// Require parameters for placeholder-bearing statements and for every
/// INSERT, UPDATE or DELETE.
///
/// Placeholders are looked for on the safety copy, so a `?`, `$1` or `:name`
/// inside a string literal or comment does not count.
pub fn enforce_parameterized_query_usage(sql: &str, params: &[SqlValue]) -> DbResult<()> {
    if !params.is_empty() {
        return Ok(());
    }
    let copy = safety_copy(sql);
    if PLACEHOLDER.is_match(&copy) {
        return Err(DbError::MissingParameters);
    }
    if let Some(caps) = LEADING_MUTATION.captures(&copy) {
        return Err(DbError::parameters_required(caps[1].to_uppercase()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_blank() {
        assert!(matches!(validate_sql_string(""), Err(DbError::EmptyQuery)));
        assert!(matches!(validate_sql_string(" \n\t"), Err(DbError::EmptyQuery)));
    }

    #[test]
    fn test_null_byte() {
        assert!(matches!(
            validate_sql_string("SELECT 1\0"),
            Err(DbError::NullByte)
        ));
    }

    #[test]
    fn test_dangerous_keywords_any_case() {
        for sql in [
            "DROP TABLE users",
            "drop table users",
            "SELECT 1; TRUNCATE users",
            "Create Table x (id int)",
            "ALTER TABLE users ADD c int",
        ] {
            assert!(
                matches!(validate_sql_string(sql), Err(DbError::DangerousOperation { .. })),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_keyword_is_named() {
        match validate_sql_string("select 1; drop table t") {
            Err(DbError::DangerousOperation { keyword }) => assert_eq!(keyword, "DROP"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_keywords_in_comments_and_literals_are_ignored() {
        for sql in [
            "SELECT 1 -- drop table users",
            "SELECT /* truncate */ 1",
            "SELECT 'drop table users' AS note",
            "SELECT 'it''s; drop' AS note",
            "SELECT drop_count, created_at FROM stats",
        ] {
            assert!(validate_sql_string(sql).is_ok(), "{sql}");
        }
    }

    #[test]
    fn test_keyword_after_literal_is_detected() {
        assert!(validate_sql_string("SELECT 'a' ; DROP TABLE t").is_err());
        assert!(validate_sql_string("SELECT 'a''b' FROM t; alter table t").is_err());
    }

    #[test]
    fn test_safety_copy_masks() {
        assert_eq!(
            safety_copy("SELECT 'x' /* c */ FROM t -- tail"),
            "SELECT ''   FROM t  "
        );
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(has_placeholders("SELECT * FROM t WHERE id = $1"));
        assert!(has_placeholders("SELECT * FROM t WHERE id = ?"));
        assert!(has_placeholders("SELECT * FROM t WHERE id = :id"));
        assert!(!has_placeholders("SELECT id::text FROM t"));
        assert!(!has_placeholders("SELECT '?' FROM t"));
        assert!(!has_placeholders("SELECT 1 -- why?"));
    }

    #[test]
    fn test_missing_parameters() {
        assert!(matches!(
            enforce_parameterized_query_usage("SELECT * FROM t WHERE id = $1", &[]),
            Err(DbError::MissingParameters)
        ));
        assert!(
            enforce_parameterized_query_usage(
                "SELECT * FROM t WHERE id = $1",
                &[SqlValue::Int(1)]
            )
            .is_ok()
        );
    }

    #[test]
    fn test_placeholders_in_literals_need_no_parameters() {
        assert!(enforce_parameterized_query_usage("SELECT '?' AS q", &[]).is_ok());
        assert!(enforce_parameterized_query_usage("SELECT ':name', '$1' FROM t", &[]).is_ok());
        assert!(enforce_parameterized_query_usage("SELECT 1 /* id = ? */", &[]).is_ok());
    }

    #[test]
    fn test_mutations_require_parameters() {
        for (sql, stmt) in [
            ("INSERT INTO t VALUES (1)", "INSERT"),
            ("  update t set a = 1", "UPDATE"),
            ("/* note */ DELETE FROM t", "DELETE"),
        ] {
            match enforce_parameterized_query_usage(sql, &[]) {
                Err(DbError::ParametersRequiredForMutation { statement }) => {
                    assert_eq!(statement, stmt)
                }
                other => panic!("{sql}: unexpected {other:?}"),
            }
        }
        assert!(enforce_parameterized_query_usage("SELECT 1", &[]).is_ok());
        assert!(enforce_parameterized_query_usage("SELECT updated_at FROM t", &[]).is_ok());
    }
}
