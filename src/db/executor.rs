//! Query execution engine.
//!
//! Runs built statements against any [`QueryTarget`] (an open connection or
//! a transaction) and normalizes the outcome:
//! - row-returning statements become an ordered list of JSON row maps
//! - writes become an affected-row count plus the vendor's last insert id
//!
//! Every execution is timed. Batches run strictly one operation after another.

use crate::db::connection::{ConnectionManager, JsonRow, QueryTarget, WriteOutcome};
use crate::error::{DbError, DbResult, ErrorCategory};
use crate::models::{
    BatchOptions, BuiltQuery, DEFAULT_BATCH_SIZE, DeleteQuery, InsertQuery, SelectQuery,
    UpdateQuery, Vendor,
};
use schemars::JsonSchema;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// A batch whose chunk size and operations have been checked.
pub struct PreparedBatch {
    plans: Vec<DbResult<PlannedWrite>>,
    batch_size: usize,
    continue_on_error: bool,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Rows returned by a SELECT or a raw query.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RowsResult {
    pub rows: Vec<JsonRow>,
    pub row_count: usize,
    /// Elapsed milliseconds
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

/// Outcome of an INSERT, UPDATE or DELETE.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub row_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    /// True when a delete was performed as a soft delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_deleted: Option<bool>,
    /// Elapsed milliseconds
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&DbError> for BatchItemError {
    fn from(err: &DbError) -> Self {
        Self {
            code: err.code().to_string(),
            category: err.category(),
            message: err.sanitized_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// Position of the operation in the request
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub completed: bool,
    pub total_row_count: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
    /// Elapsed milliseconds
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

/// Expected value an optimistic-lock UPDATE must have matched.
#[derive(Debug, Clone)]
struct LockExpectation {
    table: String,
    column: String,
    expected: String,
}

/// A validated UPDATE or DELETE, ready to run.
#[derive(Debug, Clone)]
pub struct PlannedWrite {
    query: BuiltQuery,
    lock: Option<LockExpectation>,
    soft_deleted: Option<bool>,
}

impl PlannedWrite {
    pub fn update(query: &UpdateQuery, vendor: Vendor) -> DbResult<Self> {
        Ok(Self {
            query: query.build(vendor)?,
            lock: query.optimistic_lock.as_ref().map(|lock| LockExpectation {
                table: query.table.clone(),
                column: lock.column.clone(),
                expected: lock.expected.to_string(),
            }),
            soft_deleted: None,
        })
    }

    pub fn delete(query: &DeleteQuery, vendor: Vendor) -> DbResult<Self> {
        Ok(Self {
            query: query.build(vendor)?,
            lock: None,
            soft_deleted: Some(query.soft_deleted()),
        })
    }

    pub fn query(&self) -> &BuiltQuery {
        &self.query
    }
}

/// Plan every operation of a batch. Invalid operations keep their error in
/// place so indices line up with the request.
pub fn plan_batch<Q>(
    operations: &[Q],
    vendor: Vendor,
    plan: impl Fn(&Q, Vendor) -> DbResult<PlannedWrite>,
) -> Vec<DbResult<PlannedWrite>> {
    operations.iter().map(|op| plan(op, vendor)).collect()
}

/// Milliseconds since `start`, saturating at `u64::MAX`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Query executor that handles statement execution and result shaping.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_batch_size: usize,
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Use `batch_size` for batches that do not set their own.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            default_batch_size: batch_size,
        }
    }

    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    /// Run a row-returning statement.
    pub async fn fetch<T: QueryTarget>(
        &self,
        target: &mut T,
        query: &BuiltQuery,
    ) -> DbResult<RowsResult> {
        let start = Instant::now();
        debug!(
            vendor = %target.vendor(),
            sql = %query.sql(),
            param_types = ?query.param_types(),
            "Executing query"
        );
        let rows = target.fetch(query).await?;
        Ok(RowsResult {
            row_count: rows.len(),
            rows,
            execution_time_ms: elapsed_ms(start),
        })
    }

    /// Run a statement that does not return rows.
    pub async fn execute<T: QueryTarget>(
        &self,
        target: &mut T,
        query: &BuiltQuery,
    ) -> DbResult<WriteResult> {
        let start = Instant::now();
        debug!(
            vendor = %target.vendor(),
            sql = %query.sql(),
            param_types = ?query.param_types(),
            "Executing write operation"
        );
        let outcome = target.execute(query).await?;
        Ok(WriteResult {
            row_count: outcome.rows_affected,
            last_insert_id: None,
            soft_deleted: None,
            execution_time_ms: elapsed_ms(start),
        })
    }

    pub async fn select<T: QueryTarget>(
        &self,
        target: &mut T,
        query: &SelectQuery,
    ) -> DbResult<RowsResult> {
        let built = query.build(target.vendor())?;
        self.fetch(target, &built).await
    }

    /// Insert every row. More than one row runs inside a single transaction.
    pub async fn insert(
        &self,
        conn: &mut ConnectionManager,
        query: &InsertQuery,
    ) -> DbResult<WriteResult> {
        let statements = query.build(conn.vendor())?;
        self.insert_statements(conn, statements).await
    }

    /// Run statements already produced by [`InsertQuery::build`].
    pub async fn insert_statements(
        &self,
        conn: &mut ConnectionManager,
        statements: Vec<BuiltQuery>,
    ) -> DbResult<WriteResult> {
        let start = Instant::now();
        let outcome = if statements.len() == 1 {
            conn.execute(&statements[0]).await?
        } else {
            debug!(statements = statements.len(), "Inserting rows in one transaction");
            conn.transaction(move |tx| {
                Box::pin(async move {
                    let mut total = WriteOutcome::default();
                    for statement in &statements {
                        let outcome = tx.execute(statement).await?;
                        total.rows_affected += outcome.rows_affected;
                        total.last_insert_id = outcome.last_insert_id.or(total.last_insert_id);
                    }
                    Ok(total)
                })
            })
            .await?
        };
        Ok(WriteResult {
            row_count: outcome.rows_affected,
            last_insert_id: outcome.last_insert_id,
            soft_deleted: None,
            execution_time_ms: elapsed_ms(start),
        })
    }

    pub async fn update<T: QueryTarget>(
        &self,
        target: &mut T,
        query: &UpdateQuery,
    ) -> DbResult<WriteResult> {
        let planned = PlannedWrite::update(query, target.vendor())?;
        self.execute_planned(target, &planned).await
    }

    pub async fn delete<T: QueryTarget>(
        &self,
        target: &mut T,
        query: &DeleteQuery,
    ) -> DbResult<WriteResult> {
        let planned = PlannedWrite::delete(query, target.vendor())?;
        self.execute_planned(target, &planned).await
    }

    /// Run a planned UPDATE or DELETE.
    ///
    /// An optimistic-lock UPDATE that affects no rows fails with
    /// `OptimisticLockFailed`.
    pub async fn execute_planned<T: QueryTarget>(
        &self,
        target: &mut T,
        planned: &PlannedWrite,
    ) -> DbResult<WriteResult> {
        let mut result = self.execute(target, &planned.query).await?;
        if let Some(lock) = &planned.lock {
            if result.row_count == 0 {
                return Err(DbError::optimistic_lock_failed(
                    &lock.table,
                    &lock.column,
                    &lock.expected,
                ));
            }
        }
        result.soft_deleted = planned.soft_deleted;
        Ok(result)
    }

    /// Check a batch before anything runs.
    ///
    /// The chunk size must be in range. Without `continueOnError` the first
    /// invalid operation fails the whole batch.
    pub fn prepare_batch(
        &self,
        mut plans: Vec<DbResult<PlannedWrite>>,
        options: &BatchOptions,
    ) -> DbResult<PreparedBatch> {
        let batch_size = options.effective_batch_size(self.default_batch_size)?;
        if !options.continue_on_error {
            if let Some(index) = plans.iter().position(Result::is_err) {
                if let Err(e) = plans.swap_remove(index) {
                    return Err(e);
                }
            }
        }
        Ok(PreparedBatch {
            plans,
            batch_size,
            continue_on_error: options.continue_on_error,
        })
    }

    /// Run planned operations one after another.
    ///
    /// Without `continueOnError` the first execution failure stops the batch
    /// and is returned. With it, every outcome is recorded and the batch
    /// completes.
    pub async fn run_batch<T: QueryTarget>(
        &self,
        target: &mut T,
        plans: Vec<DbResult<PlannedWrite>>,
        options: BatchOptions,
    ) -> DbResult<BatchResult> {
        let batch = self.prepare_batch(plans, &options)?;
        self.run_prepared(target, batch).await
    }

    pub async fn run_prepared<T: QueryTarget>(
        &self,
        target: &mut T,
        batch: PreparedBatch,
    ) -> DbResult<BatchResult> {
        let PreparedBatch {
            plans,
            batch_size,
            continue_on_error,
        } = batch;
        let start = Instant::now();

        let total = plans.len();
        let mut results = Vec::with_capacity(total);
        let mut total_row_count = 0u64;
        let mut succeeded = 0usize;

        for (index, plan) in plans.into_iter().enumerate() {
            if index % batch_size == 0 {
                debug!(
                    chunk = index / batch_size,
                    from = index,
                    to = (index + batch_size).min(total),
                    "Running batch chunk"
                );
                if index > 0 {
                    tokio::task::yield_now().await;
                }
            }

            let outcome = match plan {
                Ok(planned) => self.execute_planned(target, &planned).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(result) => {
                    total_row_count += result.row_count;
                    succeeded += 1;
                    results.push(BatchItemResult {
                        index,
                        success: true,
                        row_count: Some(result.row_count),
                        error: None,
                    });
                }
                Err(e) if continue_on_error => {
                    warn!(
                        target: "db_toolkit::diagnostics",
                        index,
                        code = e.code(),
                        error = %e,
                        "Batch operation failed, continuing"
                    );
                    results.push(BatchItemResult {
                        index,
                        success: false,
                        row_count: None,
                        error: Some(BatchItemError::from(&e)),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(BatchResult {
            completed: true,
            total_row_count,
            succeeded,
            failed: total - succeeded,
            results,
            execution_time_ms: elapsed_ms(start),
        })
    }
}
