//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Vendor dialects, identifier quoting and raw SQL sanitizing
//! - Structured query building with bound parameters
//! - Per-invocation connections and transactions
//! - Query execution
//! - Schema introspection, caching and drift detection
//! - Type mappings

pub mod builder;
pub mod cache;
pub mod connection;
pub mod dialect;
pub mod diff;
pub mod executor;
pub mod identifier;
pub mod params;
pub mod sanitizer;
pub mod schema;
pub mod types;

pub use cache::{Clock, ManualClock, SchemaCache, SchemaCacheKey, SystemClock};
pub use connection::{
    ConnectionManager, ConnectionState, JsonRow, QueryTarget, TransactionContext, WriteOutcome,
    with_connection, with_manager,
};
pub use diff::{SchemaDiff, diff_schemas, export_schema_to_json, import_schema_from_json};
pub use executor::QueryExecutor;
pub use schema::{InspectOptions, Inspection, SchemaInspector};
