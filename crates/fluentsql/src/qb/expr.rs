//! WHERE / HAVING accumulator.
//!
//! An [`ExprGroup`] is an ordered list of conditions, raw fragments and nested
//! groups. Rendering emits each entry's connective before every fragment
//! except the first, and parenthesises nested groups.

use crate::condition::{Condition, Connective, Op};
use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::qb::param::ParamList;
use crate::value::SqlValue;

/// One entry of an [`ExprGroup`].
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A rendered `column <op> value` condition.
    Cond(Condition),
    /// A parenthesised sub-group.
    Group(Connective, ExprGroup),
    /// A raw SQL fragment, emitted as-is.
    Raw(Connective, String),
}

impl Expr {
    fn connective(&self) -> Connective {
        match self {
            Expr::Cond(c) => c.connective(),
            Expr::Group(conn, _) | Expr::Raw(conn, _) => *conn,
        }
    }
}

/// Order-sensitive fragment accumulator.
///
/// # Example
/// ```ignore
/// use fluentsql::qb::ExprGroup;
/// use fluentsql::Op;
///
/// let group = ExprGroup::new()
///     .and("role", Op::Eq, "admin")
///     .or("role", Op::Eq, "owner");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExprGroup {
    exprs: Vec<Expr>,
}

impl ExprGroup {
    pub fn new() -> Self {
        Self { exprs: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// Append a condition.
    pub fn push(&mut self, condition: Condition) {
        self.exprs.push(Expr::Cond(condition));
    }

    /// Append a nested group; empty groups are ignored.
    pub fn push_group(&mut self, connective: Connective, group: ExprGroup) {
        if !group.is_empty() {
            self.exprs.push(Expr::Group(connective, group));
        }
    }

    /// Append a raw fragment.
    pub fn push_raw(&mut self, connective: Connective, sql: impl Into<String>) {
        self.exprs.push(Expr::Raw(connective, sql.into()));
    }

    /// Consuming form: `column <op> value` joined with AND.
    pub fn and(mut self, column: impl Into<String>, op: Op, value: impl Into<SqlValue>) -> Self {
        self.push(Condition::new(column, op, value));
        self
    }

    /// Consuming form: `column <op> value` joined with OR.
    pub fn or(mut self, column: impl Into<String>, op: Op, value: impl Into<SqlValue>) -> Self {
        self.push(Condition::new(column, op, value).or());
        self
    }

    pub fn clear(&mut self) {
        self.exprs.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.exprs.iter()
    }

    /// Render with values inlined as literals. Empty groups render as `""`.
    pub fn render(&self, dialect: Dialect) -> DbResult<String> {
        self.render_with(dialect, &mut None)
    }

    /// Render with placeholders, appending bound values to `params`.
    pub fn render_prepared(&self, dialect: Dialect, params: &mut ParamList) -> DbResult<String> {
        self.render_with(dialect, &mut Some(params))
    }

    fn render_with(
        &self,
        dialect: Dialect,
        params: &mut Option<&mut ParamList>,
    ) -> DbResult<String> {
        let mut sql = String::new();
        for (i, expr) in self.exprs.iter().enumerate() {
            if i > 0 {
                sql.push_str(expr.connective().token());
            }
            match expr {
                Expr::Cond(c) => {
                    let fragment = match params.as_deref_mut() {
                        Some(p) => c.render_prepared(dialect, p)?,
                        None => c.render(dialect)?,
                    };
                    sql.push_str(&fragment);
                }
                Expr::Group(_, group) => {
                    sql.push('(');
                    sql.push_str(&group.render_with(dialect, params)?);
                    sql.push(')');
                }
                Expr::Raw(_, raw) => sql.push_str(raw),
            }
        }
        Ok(sql)
    }
}

/// Fluent WHERE methods shared by the Update/Delete/Retrieve builders.
///
/// Expands to inherent methods on `$ty` that push onto the `$field` group.
macro_rules! where_methods {
    ($ty:ty, $field:ident) => {
        impl $ty {
            /// Add WHERE: `column <op> value`, joined with AND.
            pub fn where_op(
                mut self,
                column: impl Into<String>,
                op: $crate::condition::Op,
                value: impl Into<$crate::value::SqlValue>,
            ) -> Self {
                self.$field
                    .push($crate::condition::Condition::new(column, op, value));
                self
            }

            /// Add WHERE: `column <op> value`, joined with OR.
            pub fn or_where(
                mut self,
                column: impl Into<String>,
                op: $crate::condition::Op,
                value: impl Into<$crate::value::SqlValue>,
            ) -> Self {
                self.$field
                    .push($crate::condition::Condition::new(column, op, value).or());
                self
            }

            /// Add a prepared [`Condition`](crate::Condition) with its own connective.
            pub fn condition(mut self, condition: $crate::condition::Condition) -> Self {
                self.$field.push(condition);
                self
            }

            /// Replace every WHERE condition with this one.
            pub fn where_init(
                mut self,
                column: impl Into<String>,
                op: $crate::condition::Op,
                value: impl Into<$crate::value::SqlValue>,
            ) -> Self {
                self.$field.clear();
                self.$field
                    .push($crate::condition::Condition::new(column, op, value));
                self
            }

            /// Add a parenthesised group of conditions.
            pub fn where_group(
                mut self,
                connective: $crate::condition::Connective,
                group: $crate::qb::expr::ExprGroup,
            ) -> Self {
                self.$field.push_group(connective, group);
                self
            }

            /// Add a raw WHERE fragment, joined with AND.
            pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
                self.$field
                    .push_raw($crate::condition::Connective::And, sql);
                self
            }

            /// Add WHERE: column = value
            pub fn eq(self, column: impl Into<String>, value: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Eq, value)
            }

            /// Add WHERE: column <> value
            pub fn ne(self, column: impl Into<String>, value: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Ne, value)
            }

            /// Add WHERE: column > value
            pub fn gt(self, column: impl Into<String>, value: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Gt, value)
            }

            /// Add WHERE: column >= value
            pub fn ge(self, column: impl Into<String>, value: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Ge, value)
            }

            /// Add WHERE: column < value
            pub fn lt(self, column: impl Into<String>, value: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Lt, value)
            }

            /// Add WHERE: column <= value
            pub fn le(self, column: impl Into<String>, value: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Le, value)
            }

            /// Add WHERE: column LIKE pattern
            pub fn like(self, column: impl Into<String>, pattern: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Lk, pattern)
            }

            /// Add WHERE: column NOT LIKE pattern
            pub fn not_like(self, column: impl Into<String>, pattern: impl Into<$crate::value::SqlValue>) -> Self {
                self.where_op(column, $crate::condition::Op::Nk, pattern)
            }

            /// Add WHERE: column IN (values...)
            pub fn in_values<T: Into<$crate::value::SqlValue>>(
                self,
                column: impl Into<String>,
                values: impl IntoIterator<Item = T>,
            ) -> Self {
                let list = $crate::value::SqlValue::List(values.into_iter().map(Into::into).collect());
                self.where_op(column, $crate::condition::Op::In, list)
            }

            /// Add WHERE: column NOT IN (values...)
            pub fn not_in_values<T: Into<$crate::value::SqlValue>>(
                self,
                column: impl Into<String>,
                values: impl IntoIterator<Item = T>,
            ) -> Self {
                let list = $crate::value::SqlValue::List(values.into_iter().map(Into::into).collect());
                self.where_op(column, $crate::condition::Op::Ni, list)
            }

            /// Add WHERE: column BETWEEN low AND high
            pub fn between(
                self,
                column: impl Into<String>,
                low: impl Into<$crate::value::SqlValue>,
                high: impl Into<$crate::value::SqlValue>,
            ) -> Self {
                let pair = $crate::value::SqlValue::List(vec![low.into(), high.into()]);
                self.where_op(column, $crate::condition::Op::Bt, pair)
            }

            /// Add WHERE: column IS NULL
            pub fn is_null(self, column: impl Into<String>) -> Self {
                self.where_op(column, $crate::condition::Op::IsNull, $crate::value::SqlValue::Null)
            }

            /// Add WHERE: column IS NOT NULL
            pub fn is_not_null(self, column: impl Into<String>) -> Self {
                self.where_op(column, $crate::condition::Op::IsNotNull, $crate::value::SqlValue::Null)
            }

            /// Whether any WHERE condition has been added.
            pub fn has_where(&self) -> bool {
                !self.$field.is_empty()
            }
        }
    };
}

pub(crate) use where_methods;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connective_precedes_all_but_first() {
        let group = ExprGroup::new()
            .and("a", Op::Eq, 1)
            .or("b", Op::Eq, 2)
            .and("c", Op::Eq, 3);
        assert_eq!(
            group.render(Dialect::MySql).unwrap(),
            "a = 1 OR b = 2 AND c = 3"
        );
    }

    #[test]
    fn leading_or_is_not_emitted() {
        let group = ExprGroup::new().or("a", Op::Eq, 1);
        assert_eq!(group.render(Dialect::MySql).unwrap(), "a = 1");
    }

    #[test]
    fn nested_groups_are_parenthesised() {
        let mut outer = ExprGroup::new().and("status", Op::Eq, "active");
        outer.push_group(
            Connective::And,
            ExprGroup::new()
                .and("role", Op::Eq, "admin")
                .or("role", Op::Eq, "owner"),
        );
        let mut params = ParamList::new();
        let sql = outer.render_prepared(Dialect::Postgres, &mut params).unwrap();
        assert_eq!(sql, "status = $1 AND (role = $2 OR role = $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_group_is_skipped() {
        let mut outer = ExprGroup::new();
        outer.push_group(Connective::Or, ExprGroup::new());
        assert!(outer.is_empty());
        assert_eq!(outer.render(Dialect::MySql).unwrap(), "");
    }

    #[test]
    fn invalid_condition_propagates() {
        let group = ExprGroup::new().and("n", Op::Lk, 5);
        assert!(group.render(Dialect::MySql).is_err());
    }
}
