//! DELETE query builder.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::expr::{where_methods, ExprGroup};
use crate::qb::param::ParamList;
use crate::qb::traits::{BuiltQuery, MutationQb, SqlQb};

/// DELETE query builder.
///
/// A DELETE without WHERE conditions is never rendered: `build()` fails with
/// `DbError::UnsafeStatementRejected`.
#[derive(Clone, Debug)]
pub struct DeleteQb {
    table: String,
    where_group: ExprGroup,
    dialect: Dialect,
}

impl DeleteQb {
    /// Create a new DELETE query builder.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            where_group: ExprGroup::new(),
            dialect: Dialect::default(),
        }
    }

    /// Render for another dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Clear WHERE conditions.
    pub fn reset(&mut self) {
        self.where_group.clear();
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn check(&self) -> DbResult<()> {
        if self.where_group.is_empty() {
            return Err(DbError::UnsafeStatementRejected(format!(
                "DELETE FROM {} without WHERE",
                self.table
            )));
        }
        Ok(())
    }
}

where_methods!(DeleteQb, where_group);

impl SqlQb for DeleteQb {
    fn default_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_for(&self, dialect: Dialect) -> DbResult<String> {
        self.check()?;
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            self.table,
            self.where_group.render(dialect)?
        ))
    }

    fn build_prepared_for(&self, dialect: Dialect) -> DbResult<BuiltQuery> {
        self.check()?;
        let mut params = ParamList::new();
        let where_sql = self.where_group.render_prepared(dialect, &mut params)?;
        Ok(BuiltQuery::new(
            format!("DELETE FROM {} WHERE {}", self.table, where_sql),
            params,
        ))
    }
}

impl MutationQb for DeleteQb {}
