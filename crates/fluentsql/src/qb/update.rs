//! UPDATE query builder.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::expr::{where_methods, ExprGroup};
use crate::qb::param::ParamList;
use crate::qb::traits::{BuiltQuery, MutationQb, SqlQb};
use crate::value::SqlValue;

/// SET field value type.
#[derive(Clone, Debug, PartialEq)]
enum SetField {
    /// Bound value
    Value(SqlValue),
    /// Raw SQL expression
    Raw(String),
    /// `column = column + value`
    Increment(SqlValue),
}

/// UPDATE query builder.
///
/// `build()` refuses to render without a WHERE condition.
#[derive(Clone, Debug)]
pub struct UpdateQb {
    table: String,
    set_fields: Vec<(String, SetField)>,
    where_group: ExprGroup,
    dialect: Dialect,
}

impl UpdateQb {
    /// Create a new UPDATE query builder.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            set_fields: Vec::new(),
            where_group: ExprGroup::new(),
            dialect: Dialect::default(),
        }
    }

    /// Render for another dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn put(&mut self, column: &str, field: SetField) {
        match self.set_fields.iter_mut().find(|(c, _)| c == column) {
            Some(entry) => entry.1 = field,
            None => self.set_fields.push((column.to_string(), field)),
        }
    }

    /// Set a column value.
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.put(column, SetField::Value(value.into()));
        self
    }

    /// Set an optional column value (None => skip).
    pub fn set_opt<T: Into<SqlValue>>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a raw SQL expression.
    pub fn set_raw(mut self, column: &str, expr: &str) -> Self {
        self.put(column, SetField::Raw(expr.to_string()));
        self
    }

    /// SET column = column + by
    pub fn increment(mut self, column: &str, by: impl Into<SqlValue>) -> Self {
        self.put(column, SetField::Increment(by.into()));
        self
    }

    /// Replace every SET assignment.
    pub fn set_init<C, V>(mut self, pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        self.set_fields.clear();
        for (c, v) in pairs {
            let c: String = c.into();
            self.put(&c, SetField::Value(v.into()));
        }
        self
    }

    /// Clear SET assignments and WHERE conditions.
    pub fn reset(&mut self) {
        self.set_fields.clear();
        self.where_group.clear();
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn check(&self) -> DbResult<()> {
        if self.set_fields.is_empty() {
            return Err(DbError::validation(format!(
                "UPDATE {} has no SET assignments",
                self.table
            )));
        }
        if self.where_group.is_empty() {
            return Err(DbError::UnsafeStatementRejected(format!(
                "UPDATE {} without WHERE",
                self.table
            )));
        }
        Ok(())
    }

    fn render(&self, dialect: Dialect, mut params: Option<&mut ParamList>) -> DbResult<String> {
        self.check()?;
        let mut set_parts = Vec::with_capacity(self.set_fields.len());
        for (col, field) in &self.set_fields {
            let part = match (field, params.as_deref_mut()) {
                (SetField::Raw(expr), _) => format!("{col} = {expr}"),
                (SetField::Value(v), Some(p)) => {
                    format!("{col} = {}", dialect.placeholder(p.push(v.clone())))
                }
                (SetField::Value(v), None) => format!("{col} = {}", dialect.literal(v)),
                (SetField::Increment(v), Some(p)) => {
                    format!("{col} = {col} + {}", dialect.placeholder(p.push(v.clone())))
                }
                (SetField::Increment(v), None) => {
                    format!("{col} = {col} + {}", dialect.literal(v))
                }
            };
            set_parts.push(part);
        }

        let where_sql = match params {
            Some(p) => self.where_group.render_prepared(dialect, p)?,
            None => self.where_group.render(dialect)?,
        };
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            self.table,
            set_parts.join(", "),
            where_sql
        ))
    }
}

where_methods!(UpdateQb, where_group);

impl SqlQb for UpdateQb {
    fn default_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_for(&self, dialect: Dialect) -> DbResult<String> {
        self.render(dialect, None)
    }

    fn build_prepared_for(&self, dialect: Dialect) -> DbResult<BuiltQuery> {
        let mut params = ParamList::new();
        let sql = self.render(dialect, Some(&mut params))?;
        Ok(BuiltQuery::new(sql, params))
    }
}

impl MutationQb for UpdateQb {}
