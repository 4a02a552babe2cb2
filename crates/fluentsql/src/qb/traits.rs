//! Trait definitions for query builders.

use crate::client::Executor;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::param::ParamList;
use crate::record::{RecordRow, RecordSet};

/// Base trait for all query builders.
///
/// Builders render in two modes: [`SqlQb::build`] inlines every value as an
/// escaped literal, [`SqlQb::build_prepared`] emits placeholders together
/// with the ordered parameter list they bind to.
pub trait SqlQb: Sync {
    /// Dialect the builder renders for when no connection is involved.
    fn default_dialect(&self) -> Dialect;

    /// Render literal SQL for `dialect`.
    fn build_for(&self, dialect: Dialect) -> DbResult<String>;

    /// Render placeholder SQL and its parameters for `dialect`.
    fn build_prepared_for(&self, dialect: Dialect) -> DbResult<BuiltQuery>;

    /// Render literal SQL in the builder's own dialect.
    fn build(&self) -> DbResult<String> {
        self.build_for(self.default_dialect())
    }

    /// Render placeholder SQL in the builder's own dialect.
    fn build_prepared(&self) -> DbResult<BuiltQuery> {
        self.build_prepared_for(self.default_dialect())
    }

    /// Execute on `conn` and materialize every row.
    fn query<E: Executor>(
        &self,
        conn: &mut E,
    ) -> impl std::future::Future<Output = DbResult<RecordSet>> + Send {
        async move {
            let built = self.build_prepared_for(conn.dialect())?;
            conn.query(&built.sql, built.params.values()).await
        }
    }

    /// Execute on `conn` and return the first row.
    ///
    /// Returns `DbError::NotFound` if no rows are returned.
    fn query_one<E: Executor>(
        &self,
        conn: &mut E,
    ) -> impl std::future::Future<Output = DbResult<RecordRow>> + Send {
        async move {
            self.query_opt(conn)
                .await?
                .ok_or_else(|| DbError::not_found("Expected 1 row, got 0"))
        }
    }

    /// Execute on `conn` and return the first row, if any.
    fn query_opt<E: Executor>(
        &self,
        conn: &mut E,
    ) -> impl std::future::Future<Output = DbResult<Option<RecordRow>>> + Send {
        async move {
            let rs = self.query(conn).await?;
            Ok(rs.into_rows().into_iter().next())
        }
    }
}

/// Trait for mutation builders (INSERT/UPDATE/DELETE).
pub trait MutationQb: SqlQb {
    /// Execute and return affected row count.
    ///
    /// The statement is not committed here; on a transactional connection the
    /// caller decides.
    fn execute<E: Executor>(
        &self,
        conn: &mut E,
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send {
        async move {
            let built = self.build_prepared_for(conn.dialect())?;
            conn.execute(&built.sql, built.params.values()).await
        }
    }
}

/// The result of building a prepared query.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: ParamList,
}

impl BuiltQuery {
    /// Create a new built query.
    pub fn new(sql: impl Into<String>, params: ParamList) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    pub fn into_parts(self) -> (String, ParamList) {
        (self.sql, self.params)
    }
}
