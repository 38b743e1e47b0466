//! Parameter binding utilities for database queries.
//!
//! Binds [`SqlValue`] parameters of a [`BuiltQuery`] to vendor-specific sqlx
//! query objects, in order.

use crate::models::{BuiltQuery, SqlValue};

#[cfg(feature = "mysql")]
use sqlx::{MySql, mysql::MySqlArguments};
#[cfg(feature = "postgres")]
use sqlx::{Postgres, postgres::PgArguments};
#[cfg(feature = "sqlite")]
use sqlx::{Sqlite, sqlite::SqliteArguments};

/// Bind a parameter to a MySQL query.
#[cfg(feature = "mysql")]
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a PostgreSQL query.
#[cfg(feature = "postgres")]
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a SQLite query.
#[cfg(feature = "sqlite")]
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
    }
}

#[cfg(feature = "mysql")]
pub(crate) fn mysql_query(built: &BuiltQuery) -> sqlx::query::Query<'_, MySql, MySqlArguments> {
    built
        .params()
        .iter()
        .fold(sqlx::query(built.sql()), bind_mysql_param)
}

#[cfg(feature = "postgres")]
pub(crate) fn postgres_query(built: &BuiltQuery) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    built
        .params()
        .iter()
        .fold(sqlx::query(built.sql()), bind_postgres_param)
}

#[cfg(feature = "sqlite")]
pub(crate) fn sqlite_query(
    built: &BuiltQuery,
) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    built
        .params()
        .iter()
        .fold(sqlx::query(built.sql()), bind_sqlite_param)
}
