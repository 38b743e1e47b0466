//! DB Toolkit Library
//!
//! Safe SQL tooling for AI assistants working against PostgreSQL, MySQL and
//! SQLite: a validated query builder, a raw SQL sanitizer, schema inspection
//! with a TTL cache, and schema drift detection. Everything is exposed as
//! MCP (Model Context Protocol) tools through [`DbService`].

#[cfg(not(any(feature = "postgres", feature = "mysql", feature = "sqlite")))]
compile_error!("enable at least one vendor feature: postgres, mysql or sqlite");

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use mcp::DbService;
