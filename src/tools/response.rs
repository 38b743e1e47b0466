//! Uniform tool response envelope.
//!
//! Successful calls serialize as `{"success": true, ...data}`; failures as
//! `{"success": false, "error": {code, category, message, suggestion?}}`.

use crate::error::{DbError, ErrorCategory};
use crate::models::BuiltQuery;
use schemars::JsonSchema;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorBody {
    /// Stable error code, e.g. `INVALID_IDENTIFIER`
    pub code: String,
    pub category: ErrorCategory,
    /// Caller-safe message; infrastructure details are withheld
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&DbError> for ToolErrorBody {
    fn from(err: &DbError) -> Self {
        Self {
            code: err.code().to_string(),
            category: err.category(),
            message: err.sanitized_message(),
            suggestion: err.suggestion().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorBody>,
}

/// A failed invocation together with the statement it was running, if any.
#[derive(Debug)]
pub struct ToolFailure {
    pub error: DbError,
    /// SQL template; parameter values are never kept
    pub sql: Option<String>,
    pub param_count: usize,
}

impl ToolFailure {
    /// Attach the statement that was executing when `error` occurred.
    pub fn at(error: DbError, query: &BuiltQuery) -> Self {
        Self {
            error,
            sql: Some(query.sql().to_string()),
            param_count: query.params().len(),
        }
    }
}

impl From<DbError> for ToolFailure {
    fn from(error: DbError) -> Self {
        Self {
            error,
            sql: None,
            param_count: 0,
        }
    }
}

pub type ToolResult<T> = Result<T, ToolFailure>;

impl<T> ToolResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(err: &DbError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolErrorBody::from(err)),
        }
    }

    /// Wrap a handler result, logging failures on the diagnostics target.
    pub fn from_result(tool: &str, result: ToolResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(failure) => {
                let err = &failure.error;
                error!(
                    target: "db_toolkit::diagnostics",
                    tool,
                    code = err.code(),
                    category = %err.category(),
                    sql = failure.sql.as_deref().unwrap_or(""),
                    param_count = failure.param_count,
                    error = %err,
                    "Tool invocation failed"
                );
                Self::failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqlValue;

    #[derive(Debug, Serialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Counted {
        row_count: u64,
    }

    #[test]
    fn test_success_flattens_data() {
        let json = serde_json::to_value(ToolResponse::ok(Counted { row_count: 3 })).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "rowCount": 3}));
    }

    #[test]
    fn test_failure_shape() {
        let err = DbError::invalid_identifier("a;b", "contains ';'");
        let json = serde_json::to_value(ToolResponse::<Counted>::failed(&err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "INVALID_IDENTIFIER");
        assert_eq!(json["error"]["category"], "validation");
        assert!(json.get("rowCount").is_none());
        assert!(json["error"].get("suggestion").is_none());
    }

    #[test]
    fn test_infrastructure_message_is_sanitized() {
        let err = DbError::database("relation \"secret_table\" does not exist", None, "check");
        let json = serde_json::to_value(ToolResponse::<Counted>::failed(&err)).unwrap();
        let message = json["error"]["message"].as_str().unwrap();
        assert!(!message.contains("secret_table"));
        assert_eq!(json["error"]["category"], "infrastructure");
    }

    #[test]
    fn test_failure_keeps_template_not_values() {
        let query = BuiltQuery::new(
            "SELECT * FROM t WHERE a = $1",
            vec![SqlValue::from("hunter2")],
        );
        let failure = ToolFailure::at(DbError::internal("boom"), &query);
        assert_eq!(failure.sql.as_deref(), Some("SELECT * FROM t WHERE a = $1"));
        assert_eq!(failure.param_count, 1);
        let response = ToolResponse::<Counted>::from_result("select", Err(failure));
        assert!(!response.success);
    }
}
