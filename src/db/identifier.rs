//! Identifier validation and quoting.
//!
//! Table and column names are never bound as parameters, so every name that
//! reaches generated SQL must first match a strict grammar: a letter or
//! underscore followed by letters, digits or underscores, optionally
//! qualified once (`schema.table` or `table.column`).

use crate::error::{DbError, DbResult};
use crate::models::Vendor;
use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern is valid")
});

/// Fail with `InvalidIdentifier` unless `name` matches the identifier grammar.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_identifier(name, "identifier is empty"));
    }
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DbError::invalid_identifier(
            name,
            "expected letters, digits and underscores, optionally qualified once with '.'",
        ))
    }
}

/// Validate `name` and wrap each dot-separated segment in the vendor's quotes.
pub fn quote_identifier(vendor: Vendor, name: &str) -> DbResult<String> {
    validate_identifier(name)?;
    let q = vendor.dialect().quote_char();
    Ok(name
        .split('.')
        .map(|segment| format!("{q}{segment}{q}"))
        .collect::<Vec<_>>()
        .join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_and_qualified() {
        for name in ["users", "_tmp", "User2", "public.users", "u.created_at"] {
            assert!(validate_identifier(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_injection_shapes() {
        for name in [
            "",
            "1users",
            "users;",
            "users--",
            "a.b.c",
            "users name",
            "\"users\"",
            "users`",
            "a.",
            ".a",
            "usérs",
        ] {
            assert!(
                matches!(validate_identifier(name), Err(DbError::InvalidIdentifier { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_quote_per_vendor() {
        assert_eq!(
            quote_identifier(Vendor::PostgreSQL, "public.users").unwrap(),
            "\"public\".\"users\""
        );
        assert_eq!(
            quote_identifier(Vendor::MySQL, "shop.orders").unwrap(),
            "`shop`.`orders`"
        );
        assert_eq!(quote_identifier(Vendor::SQLite, "items").unwrap(), "\"items\"");
    }

    #[test]
    fn test_quote_validates_first() {
        assert!(quote_identifier(Vendor::MySQL, "x`; DROP TABLE y").is_err());
    }
}
