//! Data models for the database toolkit.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionParameters, ConnectionTarget, Vendor};
pub use query::{
    BatchOptions, BuiltQuery, ConditionValue, DEFAULT_BATCH_SIZE, DeleteQuery, InsertQuery,
    LockMode, MAX_BATCH_SIZE, OptimisticLock, Operator, OrderBy, SelectQuery, SoftDelete,
    SortDirection, SqlValue, UpdateQuery, WhereCondition, validate_conditions,
};
pub use schema::{
    ColumnSchema, DatabaseSchema, ForeignKey, ForeignKeyAction, IndexSchema, SchemaSummary,
    SemanticType, TableSchema, parse_default_value,
};
