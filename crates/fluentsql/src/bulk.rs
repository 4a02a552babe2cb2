//! Multi-row INSERT batching under a byte budget.
//!
//! [`BulkInsert`] renders every row as a literal `VALUES` tuple, measures the
//! longest tuple and packs `max(1, budget / longest)` tuples into each
//! statement. Statements run in order on one connection; any failure rolls
//! back everything not yet committed.
//!
//! # Example
//! ```ignore
//! use fluentsql::prelude::*;
//!
//! let report = BulkInsert::new("events", ["kind", "payload"])
//!     .rows(events.iter().map(|e| vec![SqlValue::from(e.kind), SqlValue::from(&e.payload)]))
//!     .byte_budget(256 * 1024)
//!     .step_commit(true)
//!     .execute(&manager)
//!     .await?;
//! ```

use crate::client::Executor;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::pool::{ConnectionManager, rollback_quietly, settle};
use crate::value::SqlValue;

/// Default statement size budget: 1 MiB.
pub const DEFAULT_BYTE_BUDGET: usize = 1024 * 1024;

/// With step commit on, the transaction is committed after this many statements.
pub const STEP_COMMIT_INTERVAL: usize = 10;

/// Outcome of a successful [`BulkInsert::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkReport {
    /// INSERT statements executed.
    pub statements: usize,
    /// Rows submitted.
    pub rows: usize,
    /// Rows the server reported as inserted.
    pub affected: u64,
}

/// Batched multi-row INSERT into one table.
#[derive(Debug, Clone)]
pub struct BulkInsert {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    byte_budget: usize,
    step_commit: bool,
    dialect: Dialect,
}

impl BulkInsert {
    pub fn new<C: Into<String>>(table: impl Into<String>, columns: impl IntoIterator<Item = C>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            byte_budget: DEFAULT_BYTE_BUDGET,
            step_commit: false,
            dialect: Dialect::default(),
        }
    }

    /// Append one row; values follow the column order.
    pub fn row<V: Into<SqlValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.push_row(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<SqlValue>>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn push_row(&mut self, values: Vec<SqlValue>) {
        self.rows.push(values);
    }

    /// Upper bound, in bytes of rendered tuples, for one statement.
    pub fn byte_budget(mut self, bytes: usize) -> Self {
        self.byte_budget = bytes;
        self
    }

    /// Commit after every [`STEP_COMMIT_INTERVAL`] statements instead of once at the end.
    pub fn step_commit(mut self, enabled: bool) -> Self {
        self.step_commit = enabled;
        self
    }

    /// Dialect used by [`plan`](Self::plan).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the INSERT statements in the builder's own dialect.
    pub fn plan(&self) -> DbResult<Vec<String>> {
        self.plan_for(self.dialect)
    }

    /// Render the INSERT statements for `dialect`, rows kept in submission order.
    pub fn plan_for(&self, dialect: Dialect) -> DbResult<Vec<String>> {
        if self.columns.is_empty() {
            return Err(DbError::validation("bulk insert needs at least one column"));
        }
        let tuples = self.tuples(dialect)?;
        let Some(longest) = tuples.iter().map(String::len).max() else {
            return Ok(Vec::new());
        };
        let per_statement = rows_per_statement(self.byte_budget, longest);

        let head = format!("INSERT INTO {} ({}) VALUES ", self.table, self.columns.join(", "));
        Ok(tuples
            .chunks(per_statement)
            .map(|chunk| {
                let mut sql = String::with_capacity(head.len() + chunk.iter().map(|t| t.len() + 1).sum::<usize>());
                sql.push_str(&head);
                sql.push_str(&chunk.join(","));
                sql
            })
            .collect())
    }

    fn tuples(&self, dialect: Dialect) -> DbResult<Vec<String>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                if row.len() != self.columns.len() {
                    return Err(DbError::validation(format!(
                        "row {idx} has {} values, expected {}",
                        row.len(),
                        self.columns.len()
                    )));
                }
                let values: Vec<String> = row.iter().map(|v| dialect.literal(v)).collect();
                Ok(format!("({})", values.join(", ")))
            })
            .collect()
    }

    /// Execute the planned statements on one connection of `manager`.
    ///
    /// Any failure rolls back the open transaction and returns
    /// `DbError::BatchFailed` carrying the failing statement. With step commit,
    /// statements committed before the failure stay committed.
    pub async fn execute(&self, manager: &ConnectionManager) -> DbResult<BulkReport> {
        let statements = self.plan_for(manager.dialect())?;
        if statements.is_empty() {
            return Ok(BulkReport {
                rows: self.rows.len(),
                ..BulkReport::default()
            });
        }
        let mut conn = manager.acquire().await?;
        self.run_statements(&mut conn, &statements).await
    }

    /// Run planned statements in order inside transactions on `conn`.
    pub(crate) async fn run_statements<E: Executor>(
        &self,
        conn: &mut E,
        statements: &[String],
    ) -> DbResult<BulkReport> {
        let mut report = BulkReport {
            statements: statements.len(),
            rows: self.rows.len(),
            affected: 0,
        };
        conn.begin().await?;

        let mut counts = vec![-1_i64; statements.len()];
        for (index, sql) in statements.iter().enumerate() {
            match conn.execute(sql, &[]).await {
                Ok(affected) => {
                    report.affected += affected;
                    counts[index] = i64::try_from(affected).unwrap_or(i64::MAX);
                }
                Err(source) => {
                    tracing::warn!(
                        table = %self.table,
                        index,
                        error = %source,
                        "bulk insert failed; rolling back"
                    );
                    rollback_quietly(conn).await;
                    return Err(DbError::BatchFailed {
                        index,
                        sql: sql.clone(),
                        counts,
                        source: Box::new(source),
                    });
                }
            }

            let done = index + 1;
            if self.step_commit && done % STEP_COMMIT_INTERVAL == 0 && done < statements.len() {
                settle(conn, Ok(())).await?;
                conn.begin().await?;
                tracing::debug!(table = %self.table, committed = done, "bulk insert step commit");
            }
        }

        settle(conn, Ok(report)).await
    }
}

/// Tuples per statement for a byte budget and the longest tuple length.
pub(crate) fn rows_per_statement(budget: usize, longest: usize) -> usize {
    (budget / longest.max(1)).max(1)
}
