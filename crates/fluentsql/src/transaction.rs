//! Transactions: a pinned-connection [`DbTrx`] and the all-or-nothing
//! statement batch [`DbTrxUpdate`].
//!
//! For ergonomic commit/rollback handling, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! use fluentsql::prelude::*;
//!
//! # async fn demo(manager: &ConnectionManager) -> DbResult<()> {
//! fluentsql::transaction!(manager, tx, {
//!     tx.run(&update("accounts").set("balance", 90).eq("id", 1)).await?;
//!     tx.run(&update("accounts").set("balance", 110).eq("id", 2)).await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use crate::client::{Connection, Executor};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::monitor::QueryType;
use crate::pool::{ConnectionManager, rollback_quietly, settle};
use crate::qb::{CreateQb, MutationQb, SqlQb};
use crate::record::RecordSet;
use crate::value::SqlValue;
use tokio::task::JoinHandle;

/// Runs the given block inside a [`DbTrx`].
///
/// - Begins a transaction via `$manager.begin().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `fluentsql::DbResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($manager:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($manager).begin().await?;

        let __fluentsql_tx_body_result = async { $body }.await;
        match __fluentsql_tx_body_result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// A transaction pinned to one pooled connection.
///
/// Statements run through a `DbTrx` are never committed on their own. The
/// transaction ends with exactly one [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); both release the connection. A `DbTrx`
/// dropped without either is rolled back.
pub struct DbTrx {
    conn: Option<Connection>,
    dialect: Dialect,
}

impl DbTrx {
    pub(crate) async fn begin(manager: &ConnectionManager) -> DbResult<Self> {
        let mut conn = manager.acquire().await?;
        conn.begin().await?;
        Ok(Self {
            dialect: conn.dialect(),
            conn: Some(conn),
        })
    }

    fn conn(&mut self) -> DbResult<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::validation("transaction already finished"))
    }

    /// Commit and release the connection.
    ///
    /// A failed commit is rolled back before the error is returned.
    pub async fn commit(mut self) -> DbResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(DbError::validation("transaction already finished"));
        };
        settle(&mut conn, Ok(())).await
    }

    /// Roll back and release the connection.
    pub async fn rollback(mut self) -> DbResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(DbError::validation("transaction already finished"));
        };
        conn.rollback().await
    }

    /// Run a select builder inside the transaction.
    pub async fn fetch<Q: SqlQb>(&mut self, qb: &Q) -> DbResult<RecordSet> {
        qb.query(self).await
    }

    /// Run a mutation builder inside the transaction.
    pub async fn run<Q: MutationQb>(&mut self, qb: &Q) -> DbResult<u64> {
        qb.execute(self).await
    }

    /// Insert and return the generated id; visible to others only after commit.
    pub async fn insert(&mut self, qb: &CreateQb) -> DbResult<u64> {
        qb.insert_last_id(self).await
    }
}

impl Executor for DbTrx {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        self.conn()?.execute(sql, params).await
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<RecordSet> {
        self.conn()?.query(sql, params).await
    }

    async fn last_insert_id(&mut self) -> DbResult<u64> {
        self.conn()?.last_insert_id().await
    }

    async fn begin(&mut self) -> DbResult<()> {
        Err(DbError::validation("transaction already open"))
    }

    async fn commit(&mut self) -> DbResult<()> {
        Err(DbError::validation(
            "use DbTrx::commit to finish a transaction",
        ))
    }

    async fn rollback(&mut self) -> DbResult<()> {
        Err(DbError::validation(
            "use DbTrx::rollback to finish a transaction",
        ))
    }
}

impl Drop for DbTrx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        tracing::warn!("transaction dropped without commit or rollback; rolling back");
        // Without a runtime the connection's own drop closes it, which the
        // server treats as a rollback.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                rollback_quietly(&mut conn).await;
            });
        }
    }
}

impl std::fmt::Debug for DbTrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTrx")
            .field("dialect", &self.dialect)
            .field("finished", &self.conn.is_none())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BatchStatement {
    sql: String,
    params: Vec<SqlValue>,
}

/// A list of write statements executed as one unit of work.
///
/// `execute_with_result` runs them in order on one connection and commits
/// only if every statement succeeds.
#[derive(Debug, Clone)]
pub struct DbTrxUpdate {
    manager: ConnectionManager,
    statements: Vec<BatchStatement>,
}

impl DbTrxUpdate {
    pub(crate) fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            statements: Vec::new(),
        }
    }

    /// Append a literal statement.
    pub fn add_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.add_prepared(sql, Vec::new())
    }

    /// Append a statement with its parameters.
    pub fn add_prepared(&mut self, sql: impl Into<String>, params: Vec<SqlValue>) -> &mut Self {
        self.statements.push(BatchStatement {
            sql: sql.into(),
            params,
        });
        self
    }

    /// Append a mutation builder, rendered for the manager's dialect.
    pub fn add_builder<Q: MutationQb>(&mut self, qb: &Q) -> DbResult<&mut Self> {
        let (sql, params) = qb.build_prepared_for(self.manager.dialect())?.into_parts();
        Ok(self.add_prepared(sql, params.into_values()))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    fn reject_selects(&self) -> DbResult<()> {
        match self
            .statements
            .iter()
            .position(|s| QueryType::from_sql(&s.sql) == QueryType::Select)
        {
            Some(index) => Err(DbError::validation(format!(
                "statement {index} is a SELECT; only writes can run in a batch update"
            ))),
            None => Ok(()),
        }
    }

    /// Execute every statement in order and return per-statement affected rows.
    ///
    /// On the first failure the whole unit is rolled back and
    /// `DbError::BatchFailed` is returned; its `counts` hold the rows affected
    /// by the statements before the failing one and `-1` from there on.
    pub async fn execute_with_result(&self) -> DbResult<Vec<i64>> {
        self.reject_selects()?;
        if self.statements.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.acquire().await?;
        conn.begin().await?;

        let mut counts = vec![-1_i64; self.statements.len()];
        for (index, stmt) in self.statements.iter().enumerate() {
            match conn.execute(&stmt.sql, &stmt.params).await {
                Ok(affected) => counts[index] = i64::try_from(affected).unwrap_or(i64::MAX),
                Err(source) => {
                    tracing::warn!(index, error = %source, "batch update failed; rolling back");
                    rollback_quietly(&mut conn).await;
                    return Err(DbError::BatchFailed {
                        index,
                        sql: stmt.sql.clone(),
                        counts,
                        source: Box::new(source),
                    });
                }
            }
        }

        settle(&mut conn, Ok(counts)).await
    }

    /// [`execute_with_result`](Self::execute_with_result) on a spawned task.
    pub fn spawn_execute_with_result(self) -> JoinHandle<DbResult<Vec<i64>>> {
        tokio::spawn(async move { self.execute_with_result().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qb::{delete, update};

    fn manager() -> ConnectionManager {
        ConnectionManager::from_url("postgres://app@127.0.0.1:1/none").unwrap()
    }

    #[tokio::test]
    async fn batch_rejects_select_before_connecting() {
        let mut batch = manager().batch_update();
        batch
            .add_sql("UPDATE t SET a = 1")
            .add_sql("  select * from t");
        let err = batch.execute_with_result().await.unwrap_err();
        assert!(matches!(err, DbError::Validation(ref m) if m.contains("statement 1")));
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let batch = manager().batch_update();
        assert!(batch.is_empty());
        assert_eq!(batch.execute_with_result().await.unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn builders_render_for_manager_dialect() {
        let mut batch = manager().batch_update();
        batch
            .add_builder(&update("t").set("a", 1).eq("id", 7))
            .unwrap()
            .add_builder(&delete("t").eq("id", 8))
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.statements[0].sql, "UPDATE t SET a = $1 WHERE id = $2");
        assert_eq!(
            batch.statements[0].params,
            vec![SqlValue::Int(1), SqlValue::Int(7)]
        );
        assert_eq!(batch.statements[1].sql, "DELETE FROM t WHERE id = $1");
    }

    #[test]
    fn unsafe_builder_is_not_added() {
        let mut batch = manager().batch_update();
        let err = batch.add_builder(&delete("t")).unwrap_err();
        assert!(err.is_unsafe_statement());
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn closed_manager_refuses_transactions() {
        let manager = manager();
        manager.close().await.unwrap();
        let err = manager.begin().await.unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
    }
}
