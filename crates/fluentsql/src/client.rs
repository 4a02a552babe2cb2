//! Statement execution on one pinned connection.

use crate::binder::Binder;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::monitor::{QueryContext, QueryMonitor, QueryResult, truncate_sql_bytes};
#[cfg(feature = "mysql")]
use crate::mysql::MySqlConnection;
use crate::postgres::PgConnection;
use crate::record::{RecordRow, RecordSet};
use crate::value::SqlValue;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A trait that unifies pooled connections and transactions.
///
/// Builders execute against any `Executor`, so the same statement can run
/// on a plain [`Connection`] or inside a [`DbTrx`](crate::DbTrx).
/// Statements are never committed implicitly by an `Executor` itself.
pub trait Executor: Send {
    /// Dialect of the server behind this executor.
    fn dialect(&self) -> Dialect;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = DbResult<u64>> + Send;

    /// Execute a query and materialize every row.
    fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = DbResult<RecordSet>> + Send;

    /// Execute a query and return the **first** row.
    ///
    /// Returns `DbError::NotFound` if no rows are returned; extra rows are ignored.
    fn query_one(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = DbResult<RecordRow>> + Send {
        async move {
            self.query(sql, params)
                .await?
                .into_rows()
                .into_iter()
                .next()
                .ok_or_else(|| DbError::not_found("Expected 1 row, got 0"))
        }
    }

    /// Id generated by the most recent INSERT on this connection.
    fn last_insert_id(&mut self) -> impl Future<Output = DbResult<u64>> + Send;

    /// Disable auto-commit until the next `commit`/`rollback`.
    fn begin(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;
}

/// Execution settings shared by every connection a manager hands out.
pub(crate) struct ExecSettings {
    pub(crate) binder: Binder,
    pub(crate) debug: bool,
    pub(crate) statement_timeout: Option<Duration>,
    pub(crate) max_blob_bytes: usize,
    pub(crate) max_log_sql_len: usize,
    pub(crate) monitor: Arc<dyn QueryMonitor>,
}

pub(crate) enum Backend {
    Postgres(PgConnection),
    #[cfg(feature = "mysql")]
    MySql(MySqlConnection),
}

impl Backend {
    fn dialect(&self) -> Dialect {
        match self {
            Backend::Postgres(_) => Dialect::Postgres,
            #[cfg(feature = "mysql")]
            Backend::MySql(_) => Dialect::MySql,
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        match self {
            Backend::Postgres(c) => c.execute(sql, params).await,
            #[cfg(feature = "mysql")]
            Backend::MySql(c) => c.execute(sql, params).await,
        }
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue], max_blob: usize) -> DbResult<RecordSet> {
        match self {
            Backend::Postgres(c) => c.query(sql, params, max_blob).await,
            #[cfg(feature = "mysql")]
            Backend::MySql(c) => c.query(sql, params, max_blob).await,
        }
    }

    async fn batch(&mut self, sql: &str) -> DbResult<()> {
        match self {
            Backend::Postgres(c) => c.batch(sql).await,
            #[cfg(feature = "mysql")]
            Backend::MySql(c) => c.batch(sql).await,
        }
    }

    /// Abort the statement in flight after a timeout.
    ///
    /// PostgreSQL gets a cancel request; a MySQL connection is closed since
    /// its protocol state is unknown.
    fn cancel(&mut self) {
        match self {
            Backend::Postgres(c) => {
                if let Some(token) = c.cancel_token() {
                    tokio::spawn(async move {
                        if let Err(e) = token.cancel_query(tokio_postgres::NoTls).await {
                            tracing::warn!(error = %e, "cancel request failed");
                        }
                    });
                }
            }
            #[cfg(feature = "mysql")]
            Backend::MySql(c) => c.detach(),
        }
    }

    fn detach(&mut self) {
        match self {
            Backend::Postgres(c) => c.detach(),
            #[cfg(feature = "mysql")]
            Backend::MySql(c) => c.detach(),
        }
    }
}

/// A pooled connection checked out from a [`ConnectionManager`](crate::ConnectionManager).
///
/// Every statement goes through the binder, the optional statement timeout
/// and the configured monitor. The connection returns to the pool on drop;
/// a connection dropped inside an open transaction is closed instead.
pub struct Connection {
    backend: Backend,
    settings: Arc<ExecSettings>,
    in_transaction: bool,
}

impl Connection {
    pub(crate) fn new(backend: Backend, settings: Arc<ExecSettings>) -> Self {
        Self {
            backend,
            settings,
            in_transaction: false,
        }
    }

    /// Whether `begin` was called without a matching `commit`/`rollback`.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn report(&self, ctx: &QueryContext, elapsed: Duration, result: &QueryResult) {
        self.settings.monitor.on_query_complete(ctx, elapsed, result);
        if self.settings.debug {
            let sql = truncate_sql_bytes(&ctx.sql, self.settings.max_log_sql_len);
            tracing::debug!(
                target: "fluentsql.sql",
                sql = %sql,
                params = ctx.param_count,
                elapsed = ?elapsed,
                rows = result.size(),
                ok = !result.is_error(),
                "statement executed"
            );
        }
    }

    fn error_result(err: &DbError) -> QueryResult {
        match err {
            DbError::Timeout(d) => QueryResult::error(format!("timeout after {d:?}")),
            e => QueryResult::error(e.to_string()),
        }
    }

    async fn control(&mut self, sql: &'static str) -> DbResult<()> {
        let ctx = QueryContext::new(sql, 0, self.dialect().name());
        let start = Instant::now();
        let result = self.backend.batch(sql).await;
        let outcome = match &result {
            Ok(()) => QueryResult::Affected(0),
            Err(e) => Self::error_result(e),
        };
        self.report(&ctx, start.elapsed(), &outcome);
        result
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl Future<Output = DbResult<T>>,
) -> DbResult<T> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, future)
            .await
            .unwrap_or(Err(DbError::Timeout(timeout))),
        None => future.await,
    }
}

impl Executor for Connection {
    fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let settings = Arc::clone(&self.settings);
        let bound = settings.binder.bind(params)?;
        let ctx = QueryContext::new(sql, bound.len(), self.dialect().name());
        settings.monitor.on_query_start(&ctx);

        let start = Instant::now();
        let result = with_timeout(settings.statement_timeout, self.backend.execute(sql, &bound)).await;
        if matches!(result, Err(DbError::Timeout(_))) {
            self.backend.cancel();
        }
        let outcome = match &result {
            Ok(n) => QueryResult::Affected(*n),
            Err(e) => Self::error_result(e),
        };
        self.report(&ctx, start.elapsed(), &outcome);
        result
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<RecordSet> {
        let settings = Arc::clone(&self.settings);
        let bound = settings.binder.bind(params)?;
        let ctx = QueryContext::new(sql, bound.len(), self.dialect().name());
        settings.monitor.on_query_start(&ctx);

        let start = Instant::now();
        let result = with_timeout(settings.statement_timeout, self.backend.query(sql, &bound, settings.max_blob_bytes)).await;
        if matches!(result, Err(DbError::Timeout(_))) {
            self.backend.cancel();
        }
        let outcome = match &result {
            Ok(rs) => QueryResult::Rows(rs.size()),
            Err(e) => Self::error_result(e),
        };
        self.report(&ctx, start.elapsed(), &outcome);
        result
    }

    async fn last_insert_id(&mut self) -> DbResult<u64> {
        #[cfg(feature = "mysql")]
        {
            if let Backend::MySql(c) = &self.backend
                && let Some(id) = c.last_insert_id()
            {
                return Ok(id);
            }
        }
        let sql = self.dialect().last_insert_id_sql();
        let rs = self.query(sql, &[]).await?;
        let id = rs
            .first()
            .and_then(|row| row.value_at(0))
            .ok_or_else(|| DbError::not_found("no id generated on this connection"))?;
        match id {
            SqlValue::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_u64(d),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
        .ok_or_else(|| DbError::decode("last_insert_id", format!("unexpected id value {id}")))
    }

    async fn begin(&mut self) -> DbResult<()> {
        if self.in_transaction {
            return Err(DbError::validation("a transaction is already open on this connection"));
        }
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        let result = self.control("COMMIT").await;
        self.in_transaction = result.is_err() && self.in_transaction;
        result
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let result = self.control("ROLLBACK").await;
        self.in_transaction = false;
        if result.is_err() {
            self.backend.detach();
        }
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.in_transaction {
            tracing::warn!("connection released with an open transaction; closing it");
            self.backend.detach();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
