//! Error types for the database toolkit.
//!
//! Every failure the toolkit can surface is a [`DbError`] variant. Variants are
//! grouped into an [`ErrorCategory`] so tool boundaries can decide how much of
//! the message is safe to hand back to a caller:
//!
//! - `Validation`: malformed identifiers, conditions and payloads
//! - `Security`: rejected raw SQL
//! - `Configuration`: missing drivers and bad connection settings
//! - `Domain`: business-rule failures such as optimistic lock conflicts
//! - `Infrastructure`: driver, network and server failures

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Security,
    Configuration,
    Domain,
    Infrastructure,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Security => "security",
            Self::Configuration => "configuration",
            Self::Domain => "domain",
            Self::Infrastructure => "infrastructure",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Invalid condition: {}", .violations.join("; "))]
    InvalidCondition { violations: Vec<String> },

    #[error("Update payload for table '{table}' is empty")]
    EmptyUpdatePayload { table: String },

    #[error(
        "Refusing to {operation} every row of '{table}' without a WHERE clause. Set '{flag}' to true to proceed."
    )]
    FullTableMutation {
        operation: String,
        table: String,
        flag: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid schema snapshot: {}", .violations.join("; "))]
    SchemaImport { violations: Vec<String> },

    // ------------------------------------------------------------------
    // Security
    // ------------------------------------------------------------------
    #[error("SQL query must not be empty")]
    EmptyQuery,

    #[error("SQL query contains a null byte")]
    NullByte,

    #[error("Dangerous operation blocked: {keyword} statements are not allowed")]
    DangerousOperation { keyword: String },

    #[error("Query contains placeholders but no parameters were supplied")]
    MissingParameters,

    #[error("{statement} statements must be parameterized; supply at least one parameter")]
    ParametersRequiredForMutation { statement: String },

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    #[error(
        "The {vendor} driver is not compiled in. Rebuild with `cargo build --features {feature}`."
    )]
    MissingDriver {
        vendor: String,
        feature: &'static str,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ------------------------------------------------------------------
    // Domain
    // ------------------------------------------------------------------
    #[error(
        "Optimistic lock failed on '{table}': no row matched {column} = {expected}. The row was modified or removed concurrently."
    )]
    OptimisticLockFailed {
        table: String,
        column: String,
        expected: String,
    },

    #[error("Constraint violation ({kind}): {message}")]
    ConstraintViolation { kind: String, message: String },

    #[error("Connection is not open (state: {state})")]
    NotConnected { state: String },

    // ------------------------------------------------------------------
    // Infrastructure
    // ------------------------------------------------------------------
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Message returned in place of infrastructure error details.
pub const GENERIC_INFRASTRUCTURE_MESSAGE: &str =
    "The database operation failed. Details were recorded in the server log.";

impl DbError {
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_condition(violations: Vec<String>) -> Self {
        Self::InvalidCondition { violations }
    }

    pub fn empty_update_payload(table: impl Into<String>) -> Self {
        Self::EmptyUpdatePayload {
            table: table.into(),
        }
    }

    pub fn full_table_mutation(
        operation: impl Into<String>,
        table: impl Into<String>,
        flag: impl Into<String>,
    ) -> Self {
        Self::FullTableMutation {
            operation: operation.into(),
            table: table.into(),
            flag: flag.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn schema_import(violations: Vec<String>) -> Self {
        Self::SchemaImport { violations }
    }

    pub fn dangerous_operation(keyword: impl Into<String>) -> Self {
        Self::DangerousOperation {
            keyword: keyword.into(),
        }
    }

    pub fn parameters_required(statement: impl Into<String>) -> Self {
        Self::ParametersRequiredForMutation {
            statement: statement.into(),
        }
    }

    pub fn missing_driver(vendor: impl Into<String>, feature: &'static str) -> Self {
        Self::MissingDriver {
            vendor: vendor.into(),
            feature,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn optimistic_lock_failed(
        table: impl Into<String>,
        column: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::OptimisticLockFailed {
            table: table.into(),
            column: column.into(),
            expected: expected.into(),
        }
    }

    pub fn constraint_violation(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn not_connected(state: impl Into<String>) -> Self {
        Self::NotConnected {
            state: state.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidIdentifier { .. }
            | Self::InvalidCondition { .. }
            | Self::EmptyUpdatePayload { .. }
            | Self::FullTableMutation { .. }
            | Self::InvalidInput { .. }
            | Self::SchemaImport { .. } => ErrorCategory::Validation,
            Self::EmptyQuery
            | Self::NullByte
            | Self::DangerousOperation { .. }
            | Self::MissingParameters
            | Self::ParametersRequiredForMutation { .. } => ErrorCategory::Security,
            Self::MissingDriver { .. } | Self::Configuration { .. } => {
                ErrorCategory::Configuration
            }
            Self::OptimisticLockFailed { .. }
            | Self::ConstraintViolation { .. }
            | Self::NotConnected { .. } => ErrorCategory::Domain,
            Self::Connection { .. }
            | Self::Database { .. }
            | Self::Timeout { .. }
            | Self::Internal { .. } => ErrorCategory::Infrastructure,
        }
    }

    /// Stable machine-readable code, e.g. `INVALID_IDENTIFIER`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            Self::InvalidCondition { .. } => "INVALID_CONDITION",
            Self::EmptyUpdatePayload { .. } => "EMPTY_UPDATE_PAYLOAD",
            Self::FullTableMutation { .. } => "FULL_TABLE_MUTATION",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::SchemaImport { .. } => "INVALID_SCHEMA_SNAPSHOT",
            Self::EmptyQuery => "EMPTY_QUERY",
            Self::NullByte => "NULL_BYTE",
            Self::DangerousOperation { .. } => "DANGEROUS_OPERATION",
            Self::MissingParameters => "MISSING_PARAMETERS",
            Self::ParametersRequiredForMutation { .. } => "PARAMETERS_REQUIRED",
            Self::MissingDriver { .. } => "MISSING_DRIVER",
            Self::Configuration { .. } => "CONFIGURATION",
            Self::OptimisticLockFailed { .. } => "OPTIMISTIC_LOCK_FAILED",
            Self::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            Self::NotConnected { .. } => "NOT_CONNECTED",
            Self::Connection { .. } => "CONNECTION_FAILED",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to an untrusted caller.
    ///
    /// Infrastructure errors may embed server names, SQL fragments or
    /// credentials echoed back by drivers, so they collapse to a generic text.
    pub fn sanitized_message(&self) -> String {
        match self.category() {
            ErrorCategory::Infrastructure => GENERIC_INFRASTRUCTURE_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::MissingParameters => {
                Some("Pass values through 'params' and reference them with placeholders")
            }
            Self::ParametersRequiredForMutation { .. } => {
                Some("Use the insert/update/delete tools or bind values through 'params'")
            }
            Self::OptimisticLockFailed { .. } => {
                Some("Re-read the row to obtain its current version and retry")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::OptimisticLockFailed { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let kind = match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Some("unique"),
                    sqlx::error::ErrorKind::ForeignKeyViolation => Some("foreign_key"),
                    sqlx::error::ErrorKind::NotNullViolation => Some("not_null"),
                    sqlx::error::ErrorKind::CheckViolation => Some("check"),
                    _ => None,
                };
                match kind {
                    Some(kind) => DbError::constraint_violation(kind, db_err.message()),
                    None => DbError::database(
                        db_err.message(),
                        db_err.code().map(|c| c.to_string()),
                        "Check the SQL syntax and referenced objects",
                    ),
                }
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_invalid_condition_lists_all_violations() {
        let err = DbError::invalid_condition(vec!["a is bad".into(), "b is bad".into()]);
        assert_eq!(err.to_string(), "Invalid condition: a is bad; b is bad");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_missing_driver_names_vendor_and_feature() {
        let err = DbError::missing_driver("PostgreSQL", "postgres");
        let msg = err.to_string();
        assert!(msg.contains("PostgreSQL"));
        assert!(msg.contains("cargo build --features postgres"));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_categories() {
        assert_eq!(DbError::EmptyQuery.category(), ErrorCategory::Security);
        assert_eq!(
            DbError::dangerous_operation("DROP").category(),
            ErrorCategory::Security
        );
        assert_eq!(
            DbError::optimistic_lock_failed("t", "version", "3").category(),
            ErrorCategory::Domain
        );
        assert_eq!(
            DbError::internal("boom").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_infrastructure_messages_are_sanitized() {
        let err = DbError::connection("host db.internal:5432 refused password=hunter2", "retry");
        assert_eq!(err.sanitized_message(), GENERIC_INFRASTRUCTURE_MESSAGE);
        assert!(!err.sanitized_message().contains("hunter2"));
    }

    #[test]
    fn test_validation_messages_pass_through() {
        let err = DbError::invalid_identifier("users;--", "unexpected character");
        assert_eq!(err.sanitized_message(), err.to_string());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::EmptyQuery.is_retryable());
    }
}
