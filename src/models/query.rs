//! Query-related data models.
//!
//! Values, WHERE conditions and the structured request shapes the query
//! builder turns into a [`BuiltQuery`].

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of operations per batch chunk.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Largest accepted batch chunk.
pub const MAX_BATCH_SIZE: usize = 1000;

/// A scalar value bound as a query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Comparison operator of a [`WhereCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
        }
    }

    fn is_null_check(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// Right-hand side of a condition: one scalar or a list for `in`/`notIn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(SqlValue),
    List(Vec<SqlValue>),
}

/// A single `column <op> value` predicate. Conditions are AND-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WhereCondition {
    /// Column name, optionally qualified as table.column
    pub column: String,
    pub operator: Operator,
    /// Omit for isNull/isNotNull; an array for in/notIn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: Operator, value: Option<ConditionValue>) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(
            column,
            Operator::Eq,
            Some(ConditionValue::Scalar(value.into())),
        )
    }

    /// Check the operator/value pairing, returning every violation found.
    pub fn validate(&self) -> Vec<String> {
        let op = self.operator;
        let mut violations = Vec::new();

        if op.is_null_check() {
            if self.value.is_some() {
                violations.push(format!("operator '{}' does not take a value", op.name()));
            }
            return violations;
        }

        let Some(value) = &self.value else {
            violations.push(format!("operator '{}' requires a value", op.name()));
            return violations;
        };

        match (op, value) {
            (Operator::In | Operator::NotIn, ConditionValue::List(items)) => {
                if items.is_empty() {
                    violations.push(format!("operator '{}' requires a non-empty array", op.name()));
                }
                if items.iter().any(SqlValue::is_null) {
                    violations.push(format!(
                        "operator '{}' does not accept null entries; use isNull",
                        op.name()
                    ));
                }
            }
            (Operator::In | Operator::NotIn, ConditionValue::Scalar(_)) => {
                violations.push(format!("operator '{}' requires an array value", op.name()));
            }
            (_, ConditionValue::List(_)) => {
                violations.push(format!(
                    "operator '{}' requires a scalar value; use 'in' or 'notIn' for arrays",
                    op.name()
                ));
            }
            (_, ConditionValue::Scalar(SqlValue::Null)) => {
                violations.push(format!(
                    "operator '{}' does not accept null; use isNull or isNotNull",
                    op.name()
                ));
            }
            (Operator::Like, ConditionValue::Scalar(v)) => {
                if !matches!(v, SqlValue::String(_)) {
                    violations.push(format!(
                        "operator 'like' requires a string, got {}",
                        v.type_name()
                    ));
                }
            }
            (Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte, ConditionValue::Scalar(v)) => {
                if matches!(v, SqlValue::Bool(_)) {
                    violations.push(format!(
                        "operator '{}' requires a string or number, got bool",
                        op.name()
                    ));
                }
            }
            _ => {}
        }
        violations
    }
}

/// Validate a list of conditions, failing with every violation at once.
pub fn validate_conditions(conditions: &[WhereCondition]) -> DbResult<()> {
    let violations: Vec<String> = conditions
        .iter()
        .enumerate()
        .flat_map(|(i, cond)| {
            cond.validate()
                .into_iter()
                .map(move |v| format!("where[{}] ({}): {}", i, cond.column, v))
        })
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(DbError::invalid_condition(violations))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderBy {
    pub column: String,
    /// asc (default) or desc
    #[serde(default)]
    pub direction: SortDirection,
}

/// Row lock taken by a SELECT. Not available on SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LockMode {
    ForUpdate,
    ForShare,
}

/// SQL text plus its positional parameters.
///
/// Fields are private: once built the query cannot be altered.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    sql: String,
    params: Vec<SqlValue>,
}

impl BuiltQuery {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Parameter type names, safe to log in place of values.
    pub fn param_types(&self) -> Vec<&'static str> {
        self.params.iter().map(SqlValue::type_name).collect()
    }
}

// ============================================================================
// Structured requests
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectQuery {
    pub table: String,
    /// Columns to return. Omit for all columns.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<WhereCondition>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    /// forUpdate or forShare (PostgreSQL and MySQL only)
    #[serde(default)]
    pub lock: Option<LockMode>,
    /// Exclude soft-deleted rows by requiring this column to be NULL
    #[serde(default)]
    pub soft_delete_column: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertQuery {
    pub table: String,
    /// Rows to insert; every row must have the same columns
    pub rows: Vec<BTreeMap<String, SqlValue>>,
}

/// Compare-and-set guard on a version column.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticLock {
    pub column: String,
    /// Value the row must currently hold
    pub expected: SqlValue,
    /// Also set column = column + 1
    #[serde(default)]
    pub increment: bool,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuery {
    pub table: String,
    /// Column values to set
    pub data: BTreeMap<String, SqlValue>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<WhereCondition>,
    /// Permit an UPDATE with no WHERE clause
    #[serde(default)]
    pub allow_full_table_update: bool,
    #[serde(default)]
    pub optimistic_lock: Option<OptimisticLock>,
}

fn default_soft_delete_column() -> String {
    "deleted_at".to_string()
}

/// Mark rows deleted instead of removing them.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoftDelete {
    /// Default: deleted_at
    #[serde(default = "default_soft_delete_column")]
    pub column: String,
    /// Value to store. Default: CURRENT_TIMESTAMP
    #[serde(default)]
    pub value: Option<SqlValue>,
}

impl Default for SoftDelete {
    fn default() -> Self {
        Self {
            column: default_soft_delete_column(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    pub table: String,
    #[serde(default, rename = "where")]
    pub conditions: Vec<WhereCondition>,
    /// Permit a DELETE with no WHERE clause
    #[serde(default)]
    pub allow_full_table_delete: bool,
    #[serde(default)]
    pub soft_delete: Option<SoftDelete>,
}

/// Chunking and failure policy of a batch run.
#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    /// Operations per chunk. Default: 100, max: 1000
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Keep going after a failed operation. Default: false
    #[serde(default)]
    pub continue_on_error: bool,
}

impl BatchOptions {
    /// Resolve the chunk size, falling back to `default` when unset.
    pub fn effective_batch_size(&self, default: usize) -> DbResult<usize> {
        let size = self.batch_size.unwrap_or(default);
        if size == 0 || size > MAX_BATCH_SIZE {
            return Err(DbError::invalid_input(format!(
                "batchSize must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, size
            )));
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(json: &str) -> WhereCondition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_sql_value_untagged_deserialize() {
        let values: Vec<SqlValue> = serde_json::from_str(r#"[null, true, 7, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Bool(true),
                SqlValue::Int(7),
                SqlValue::Float(1.5),
                SqlValue::String("x".into()),
            ]
        );
    }

    #[test]
    fn test_operator_camel_case() {
        let c = cond(r#"{"column":"id","operator":"notIn","value":[1,2]}"#);
        assert_eq!(c.operator, Operator::NotIn);
        assert!(matches!(c.value, Some(ConditionValue::List(ref v)) if v.len() == 2));
    }

    #[test]
    fn test_null_check_rejects_value() {
        let c = cond(r#"{"column":"deleted_at","operator":"isNull","value":1}"#);
        assert_eq!(c.validate().len(), 1);
        let c = cond(r#"{"column":"deleted_at","operator":"isNull"}"#);
        assert!(c.validate().is_empty());
    }

    #[test]
    fn test_value_required() {
        let c = cond(r#"{"column":"id","operator":"eq"}"#);
        assert_eq!(c.validate(), vec!["operator 'eq' requires a value".to_string()]);
    }

    #[test]
    fn test_in_requires_non_empty_array() {
        assert!(!cond(r#"{"column":"id","operator":"in","value":[]}"#).validate().is_empty());
        assert!(!cond(r#"{"column":"id","operator":"in","value":3}"#).validate().is_empty());
        assert!(!cond(r#"{"column":"id","operator":"in","value":[1,null]}"#).validate().is_empty());
        assert!(cond(r#"{"column":"id","operator":"in","value":[1,2]}"#).validate().is_empty());
    }

    #[test]
    fn test_like_requires_string() {
        assert!(!cond(r#"{"column":"name","operator":"like","value":5}"#).validate().is_empty());
        assert!(cond(r#"{"column":"name","operator":"like","value":"a%"}"#).validate().is_empty());
    }

    #[test]
    fn test_comparison_rejects_bool_and_array() {
        assert!(!cond(r#"{"column":"age","operator":"gt","value":true}"#).validate().is_empty());
        assert!(!cond(r#"{"column":"age","operator":"eq","value":[1]}"#).validate().is_empty());
        assert!(cond(r#"{"column":"age","operator":"gte","value":"2024-01-01"}"#).validate().is_empty());
    }

    #[test]
    fn test_eq_rejects_null() {
        let c = WhereCondition::new("x", Operator::Eq, Some(ConditionValue::Scalar(SqlValue::Null)));
        assert_eq!(c.validate().len(), 1);
    }

    #[test]
    fn test_validate_conditions_collects_all() {
        let conditions = vec![
            cond(r#"{"column":"a","operator":"eq"}"#),
            cond(r#"{"column":"b","operator":"in","value":1}"#),
        ];
        let err = validate_conditions(&conditions).unwrap_err();
        match err {
            DbError::InvalidCondition { violations } => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].starts_with("where[0] (a)"));
                assert!(violations[1].starts_with("where[1] (b)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_select_query_where_field() {
        let q: SelectQuery = serde_json::from_str(
            r#"{"table":"users","where":[{"column":"id","operator":"eq","value":1}],"orderBy":[{"column":"id"}],"limit":5}"#,
        )
        .unwrap();
        assert_eq!(q.conditions.len(), 1);
        assert_eq!(q.order_by[0].direction, SortDirection::Asc);
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn test_soft_delete_default_column() {
        let sd: SoftDelete = serde_json::from_str("{}").unwrap();
        assert_eq!(sd.column, "deleted_at");
        assert!(sd.value.is_none());
    }

    #[test]
    fn test_batch_size_bounds() {
        let opts = BatchOptions::default();
        assert_eq!(opts.effective_batch_size(DEFAULT_BATCH_SIZE).unwrap(), 100);
        let opts = BatchOptions {
            batch_size: Some(0),
            continue_on_error: false,
        };
        assert!(opts.effective_batch_size(DEFAULT_BATCH_SIZE).is_err());
        let opts = BatchOptions {
            batch_size: Some(MAX_BATCH_SIZE + 1),
            continue_on_error: true,
        };
        assert!(opts.effective_batch_size(DEFAULT_BATCH_SIZE).is_err());
    }

    #[test]
    fn test_built_query_param_types() {
        let q = BuiltQuery::new("SELECT 1", vec![SqlValue::Int(1), SqlValue::from("a")]);
        assert_eq!(q.param_types(), vec!["int", "string"]);
        assert_eq!(q.sql(), "SELECT 1");
    }
}
