//! Structured request → parameterized SQL.
//!
//! Every table and column name goes through [`quote_identifier`] and every
//! value is bound as a positional parameter using the vendor's placeholder
//! style. The one exception is SQL `NULL`, which is written as the keyword
//! so no typed null has to be bound.

use crate::db::dialect::Dialect;
use crate::db::identifier::quote_identifier;
use crate::error::{DbError, DbResult};
use crate::models::{
    BuiltQuery, ConditionValue, DeleteQuery, InsertQuery, Operator, SelectQuery, SortDirection,
    SqlValue, UpdateQuery, Vendor, WhereCondition, validate_conditions,
};

/// Accumulates bound parameters while SQL text is assembled left to right.
struct SqlWriter {
    vendor: Vendor,
    dialect: &'static dyn Dialect,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            dialect: vendor.dialect(),
            params: Vec::new(),
        }
    }

    fn quote(&self, name: &str) -> DbResult<String> {
        quote_identifier(self.vendor, name)
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    /// Placeholder for `value`, or the `NULL` keyword.
    fn value(&mut self, value: &SqlValue) -> String {
        if value.is_null() {
            "NULL".to_string()
        } else {
            self.bind(value.clone())
        }
    }

    fn condition(&mut self, cond: &WhereCondition) -> DbResult<String> {
        let column = self.quote(&cond.column)?;
        let op = cond.operator;
        let sql = match (op, &cond.value) {
            (Operator::IsNull | Operator::IsNotNull, _) => format!("{} {}", column, op.as_sql()),
            (Operator::In | Operator::NotIn, Some(ConditionValue::List(items))) => {
                let placeholders: Vec<String> =
                    items.iter().map(|v| self.bind(v.clone())).collect();
                format!("{} {} ({})", column, op.as_sql(), placeholders.join(", "))
            }
            (_, Some(ConditionValue::Scalar(v))) => {
                let placeholder = self.bind(v.clone());
                format!("{} {} {}", column, op.as_sql(), placeholder)
            }
            // Unreachable after validate_conditions
            _ => {
                return Err(DbError::invalid_condition(vec![format!(
                    "{}: operator '{}' has an unusable value",
                    cond.column,
                    op.name()
                )]));
            }
        };
        Ok(sql)
    }

    /// ` WHERE a AND b`, or an empty string when there are no predicates.
    fn where_clause(&mut self, conditions: &[WhereCondition], extra: Vec<String>) -> DbResult<String> {
        let mut predicates = Vec::with_capacity(conditions.len() + extra.len());
        for cond in conditions {
            predicates.push(self.condition(cond)?);
        }
        predicates.extend(extra);
        if predicates.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", predicates.join(" AND ")))
        }
    }

    fn finish(self, sql: String) -> BuiltQuery {
        BuiltQuery::new(sql, self.params)
    }
}

fn bound_count(name: &str, value: u64) -> DbResult<SqlValue> {
    i64::try_from(value)
        .map(SqlValue::Int)
        .map_err(|_| DbError::invalid_input(format!("{} {} is out of range", name, value)))
}

impl SelectQuery {
    pub fn build(&self, vendor: Vendor) -> DbResult<BuiltQuery> {
        validate_conditions(&self.conditions)?;
        let mut w = SqlWriter::new(vendor);
        let table = w.quote(&self.table)?;

        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| w.quote(c))
                .collect::<DbResult<Vec<_>>>()?
                .join(", ")
        };

        let lock = match self.lock {
            Some(mode) => Some(w.dialect.lock_clause(mode).ok_or_else(|| {
                DbError::invalid_input(format!("Row locks are not supported on {}", vendor))
            })?),
            None => None,
        };

        let mut extra = Vec::new();
        if let Some(column) = &self.soft_delete_column {
            extra.push(format!("{} IS NULL", w.quote(column)?));
        }

        let mut sql = format!("SELECT {} FROM {}", projection, table);
        sql.push_str(&w.where_clause(&self.conditions, extra)?);

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|o| -> DbResult<String> {
                    let direction = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    Ok(format!("{} {}", w.quote(&o.column)?, direction))
                })
                .collect::<DbResult<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                let placeholder = w.bind(bound_count("limit", limit)?);
                sql.push_str(&format!(" LIMIT {}", placeholder));
                if let Some(offset) = offset {
                    let placeholder = w.bind(bound_count("offset", offset)?);
                    sql.push_str(&format!(" OFFSET {}", placeholder));
                }
            }
            (None, Some(offset)) => {
                if let Some(all_rows) = w.dialect.offset_only_limit() {
                    sql.push_str(&format!(" LIMIT {}", all_rows));
                }
                let placeholder = w.bind(bound_count("offset", offset)?);
                sql.push_str(&format!(" OFFSET {}", placeholder));
            }
            (None, None) => {}
        }

        if let Some(lock) = lock {
            sql.push(' ');
            sql.push_str(lock);
        }

        Ok(w.finish(sql))
    }
}

impl InsertQuery {
    /// One statement per row, in row order. All rows must share one column set.
    pub fn build(&self, vendor: Vendor) -> DbResult<Vec<BuiltQuery>> {
        let table = quote_identifier(vendor, &self.table)?;
        let Some(first) = self.rows.first() else {
            return Err(DbError::invalid_input(format!(
                "Insert into '{}' requires at least one row",
                self.table
            )));
        };
        if first.is_empty() {
            return Err(DbError::empty_update_payload(&self.table));
        }

        let columns: Vec<&String> = first.keys().collect();
        let mismatched: Vec<String> = self
            .rows
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, row)| !row.keys().eq(columns.iter().copied()))
            .map(|(i, row)| {
                format!(
                    "rows[{}] has columns [{}], expected [{}]",
                    i,
                    row.keys().cloned().collect::<Vec<_>>().join(", "),
                    columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
                )
            })
            .collect();
        if !mismatched.is_empty() {
            return Err(DbError::invalid_input(mismatched.join("; ")));
        }

        let quoted = columns
            .iter()
            .map(|c| quote_identifier(vendor, c))
            .collect::<DbResult<Vec<_>>>()?
            .join(", ");

        Ok(self
            .rows
            .iter()
            .map(|row| {
                let mut w = SqlWriter::new(vendor);
                let values: Vec<String> = row.values().map(|v| w.value(v)).collect();
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    quoted,
                    values.join(", ")
                );
                w.finish(sql)
            })
            .collect())
    }
}

impl UpdateQuery {
    pub fn build(&self, vendor: Vendor) -> DbResult<BuiltQuery> {
        let mut w = SqlWriter::new(vendor);
        let table = w.quote(&self.table)?;
        if self.data.is_empty() {
            return Err(DbError::empty_update_payload(&self.table));
        }
        validate_conditions(&self.conditions)?;
        if self.conditions.is_empty() && !self.allow_full_table_update && self.optimistic_lock.is_none()
        {
            return Err(DbError::full_table_mutation(
                "update",
                &self.table,
                "allowFullTableUpdate",
            ));
        }

        let mut assignments = Vec::with_capacity(self.data.len() + 1);
        for (column, value) in &self.data {
            let quoted = w.quote(column)?;
            assignments.push(format!("{} = {}", quoted, w.value(value)));
        }

        let mut extra = Vec::new();
        if let Some(lock) = &self.optimistic_lock {
            let column = w.quote(&lock.column)?;
            if lock.expected.is_null() {
                return Err(DbError::invalid_input(
                    "optimisticLock.expected must not be null",
                ));
            }
            if lock.increment {
                if self.data.contains_key(&lock.column) {
                    return Err(DbError::invalid_input(format!(
                        "Column '{}' is both in data and incremented by optimisticLock",
                        lock.column
                    )));
                }
                assignments.push(format!("{} = {} + 1", column, column));
            }
            // Bound after the WHERE conditions so placeholder order matches text order
            extra.push((column, lock.expected.clone()));
        }

        let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
        let mut predicates = Vec::with_capacity(self.conditions.len() + extra.len());
        for cond in &self.conditions {
            predicates.push(w.condition(cond)?);
        }
        for (column, expected) in extra {
            let placeholder = w.bind(expected);
            predicates.push(format!("{} = {}", column, placeholder));
        }
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        Ok(w.finish(sql))
    }
}

impl DeleteQuery {
    /// Whether this delete is emitted as an UPDATE of the soft-delete column.
    pub fn soft_deleted(&self) -> bool {
        self.soft_delete.is_some()
    }

    pub fn build(&self, vendor: Vendor) -> DbResult<BuiltQuery> {
        let mut w = SqlWriter::new(vendor);
        let table = w.quote(&self.table)?;
        validate_conditions(&self.conditions)?;
        if self.conditions.is_empty() && !self.allow_full_table_delete {
            return Err(DbError::full_table_mutation(
                "delete",
                &self.table,
                "allowFullTableDelete",
            ));
        }

        let mut sql = match &self.soft_delete {
            Some(soft) => {
                let column = w.quote(&soft.column)?;
                let value = match &soft.value {
                    Some(v) => w.value(v),
                    None => "CURRENT_TIMESTAMP".to_string(),
                };
                format!("UPDATE {} SET {} = {}", table, column, value)
            }
            None => format!("DELETE FROM {}", table),
        };
        sql.push_str(&w.where_clause(&self.conditions, Vec::new())?);
        Ok(w.finish(sql))
    }
}
