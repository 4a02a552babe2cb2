//! Query condition types for dynamic WHERE/HAVING clauses.
//!
//! This module provides [`Op`] (the closed set of comparison operators),
//! [`Connective`] and the [`Condition`] primitive the builders accumulate.
//! The operator alone decides how the value is rendered:
//!
//! - comparisons (`eq`..`le`) quote text, leave numbers bare and wrap
//!   temporal values in the dialect's compact timestamp formatter;
//! - `lk`/`nk`/`bt` only accept text (or, for `bt`, a two-element list);
//! - `in`/`ni` accept a typed list or a pre-joined literal list;
//! - the `fn*` operators splice the value in verbatim, for SQL functions and
//!   subqueries.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::param::ParamList;
use crate::value::{SqlValue, ValueClass};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`Condition`].
///
/// # Example
/// ```ignore
/// use fluentsql::{Condition, Op};
///
/// Condition::new("age", Op::Ge, 18);
/// Condition::new("name", Op::Lk, "al%");
/// Condition::new("created", Op::Bt, "20240101000000,20241231235959");
/// Condition::new("id", Op::FnIn, "SELECT user_id FROM banned");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// column = value
    Eq,
    /// column <> value
    Ne,
    /// column > value
    Gt,
    /// column >= value
    Ge,
    /// column < value
    Lt,
    /// column <= value
    Le,
    /// column LIKE value
    Lk,
    /// column NOT LIKE value
    Nk,
    /// column IN (values)
    In,
    /// column NOT IN (values)
    Ni,
    /// column BETWEEN a AND b
    Bt,
    /// column IS NULL
    IsNull,
    /// column IS NOT NULL
    IsNotNull,
    /// column = raw
    FnEq,
    /// column <> raw
    FnNe,
    /// column > raw
    FnGt,
    /// column >= raw
    FnGe,
    /// column < raw
    FnLt,
    /// column IN (raw)
    FnIn,
    /// column NOT IN (raw)
    FnNi,
}

impl Op {
    /// Every operator, in declaration order.
    pub const ALL: [Op; 20] = [
        Op::Eq,
        Op::Ne,
        Op::Gt,
        Op::Ge,
        Op::Lt,
        Op::Le,
        Op::Lk,
        Op::Nk,
        Op::In,
        Op::Ni,
        Op::Bt,
        Op::IsNull,
        Op::IsNotNull,
        Op::FnEq,
        Op::FnNe,
        Op::FnGt,
        Op::FnGe,
        Op::FnLt,
        Op::FnIn,
        Op::FnNi,
    ];

    /// Short name (`eq`, `fnin`, `isnotnull`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Gt => "gt",
            Op::Ge => "ge",
            Op::Lt => "lt",
            Op::Le => "le",
            Op::Lk => "lk",
            Op::Nk => "nk",
            Op::In => "in",
            Op::Ni => "ni",
            Op::Bt => "bt",
            Op::IsNull => "isnull",
            Op::IsNotNull => "isnotnull",
            Op::FnEq => "fneq",
            Op::FnNe => "fnne",
            Op::FnGt => "fngt",
            Op::FnGe => "fnge",
            Op::FnLt => "fnlt",
            Op::FnIn => "fnin",
            Op::FnNi => "fnni",
        }
    }

    /// Whether the value is spliced in without quoting.
    pub fn is_raw(self) -> bool {
        matches!(
            self,
            Op::FnEq | Op::FnNe | Op::FnGt | Op::FnGe | Op::FnLt | Op::FnIn | Op::FnNi
        )
    }

    /// SQL token between column and value.
    fn symbol(self) -> &'static str {
        match self {
            Op::Eq | Op::FnEq => "=",
            Op::Ne | Op::FnNe => "<>",
            Op::Gt | Op::FnGt => ">",
            Op::Ge | Op::FnGe => ">=",
            Op::Lt | Op::FnLt => "<",
            Op::Le => "<=",
            Op::Lk => "LIKE",
            Op::Nk => "NOT LIKE",
            Op::In | Op::FnIn => "IN",
            Op::Ni | Op::FnNi => "NOT IN",
            Op::Bt => "BETWEEN",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Op {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Op::ALL
            .iter()
            .copied()
            .find(|op| op.name() == lower)
            .ok_or_else(|| DbError::validation(format!("unknown operator '{s}'")))
    }
}

/// Token joining a condition to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    #[default]
    And,
    Or,
}

impl Connective {
    /// The token including surrounding spaces.
    pub fn token(self) -> &'static str {
        match self {
            Connective::And => " AND ",
            Connective::Or => " OR ",
        }
    }
}

/// A single `column <op> value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    op: Op,
    value: SqlValue,
    connective: Connective,
}

impl Condition {
    /// Create a condition joined with AND.
    pub fn new(column: impl Into<String>, op: Op, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
            connective: Connective::And,
        }
    }

    /// Create a condition from an operator name such as `"ge"` or `"fnin"`.
    pub fn parse(
        column: impl Into<String>,
        op: &str,
        value: impl Into<SqlValue>,
    ) -> DbResult<Self> {
        Ok(Self::new(column, op.parse()?, value))
    }

    /// Join this condition with OR instead of AND.
    pub fn or(mut self) -> Self {
        self.connective = Connective::Or;
        self
    }

    /// Set the connective explicitly.
    pub fn with_connective(mut self, connective: Connective) -> Self {
        self.connective = connective;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    pub fn connective(&self) -> Connective {
        self.connective
    }

    /// Render this condition with every value inlined as a literal.
    pub fn render(&self, dialect: Dialect) -> DbResult<String> {
        self.render_inner(dialect, None)
    }

    /// Render this condition with placeholders, appending bound values to `params`.
    pub fn render_prepared(&self, dialect: Dialect, params: &mut ParamList) -> DbResult<String> {
        self.render_inner(dialect, Some(params))
    }

    fn render_inner(&self, dialect: Dialect, mut params: Option<&mut ParamList>) -> DbResult<String> {
        let col = self.column.trim();
        if col.is_empty() {
            return Err(DbError::invalid_condition("", "empty column name"));
        }
        let op = self.op;

        match op {
            Op::IsNull | Op::IsNotNull => return Ok(format!("{col} {}", op.symbol())),
            _ if self.value.is_null() => {
                let check = if op == Op::Eq || op == Op::FnEq {
                    "IS NULL"
                } else {
                    "IS NOT NULL"
                };
                return Ok(format!("{col} {check}"));
            }
            _ => {}
        }

        if op.is_raw() {
            let raw = self.value.to_raw_string();
            return Ok(match op {
                Op::FnIn | Op::FnNi => format!("{col} {} ({raw})", op.symbol()),
                _ => format!("{col} {} {raw}", op.symbol()),
            });
        }

        let class = self.value.class();
        match op {
            Op::Lk | Op::Nk | Op::Bt
                if matches!(class, ValueClass::Numeric | ValueClass::Temporal) =>
            {
                Err(DbError::invalid_condition(
                    col,
                    format!(
                        "operator '{}' does not accept a {} value",
                        op,
                        self.value.type_name()
                    ),
                ))
            }
            Op::Lk | Op::Nk => {
                if class == ValueClass::List {
                    return Err(DbError::invalid_condition(
                        col,
                        format!("operator '{op}' does not accept a list"),
                    ));
                }
                let rhs = bind_or_inline(dialect, &mut params, &self.value);
                Ok(format!("{col} {} {rhs}", op.symbol()))
            }
            Op::Bt => self.render_between(col, dialect, &mut params),
            Op::In | Op::Ni => self.render_in(col, dialect, &mut params),
            _ => {
                if class == ValueClass::List {
                    return Err(DbError::invalid_condition(
                        col,
                        format!("operator '{op}' does not accept a list"),
                    ));
                }
                if class == ValueClass::Temporal {
                    return Ok(match params.as_deref_mut() {
                        Some(p) => {
                            let idx = p.push(self.value.clone());
                            format!("{col} {} {}", op.symbol(), dialect.placeholder(idx))
                        }
                        None => {
                            let compact = self.value.compact_timestamp().unwrap_or_default();
                            format!(
                                "{} {} {}",
                                dialect.temporal_column(col),
                                op.symbol(),
                                dialect.quote(&compact)
                            )
                        }
                    });
                }
                let rhs = bind_or_inline(dialect, &mut params, &self.value);
                Ok(format!("{col} {} {rhs}", op.symbol()))
            }
        }
    }

    fn render_between(
        &self,
        col: &str,
        dialect: Dialect,
        params: &mut Option<&mut ParamList>,
    ) -> DbResult<String> {
        let bounds: Vec<SqlValue> = match &self.value {
            SqlValue::List(items) => items.clone(),
            other => other
                .to_raw_string()
                .split(',')
                .map(|part| SqlValue::Str(part.trim().to_string()))
                .collect(),
        };
        match bounds.as_slice() {
            [low] if !low.to_raw_string().is_empty() => {
                let low = bind_or_inline(dialect, params, low);
                Ok(format!("{col} >= {low}"))
            }
            [low, high] => {
                let low = bind_or_inline(dialect, params, low);
                let high = bind_or_inline(dialect, params, high);
                Ok(format!("{col} BETWEEN {low} AND {high}"))
            }
            _ => Err(DbError::invalid_condition(
                col,
                format!(
                    "BETWEEN expects one or two comma-separated bounds, got '{}'",
                    self.value
                ),
            )),
        }
    }

    fn render_in(
        &self,
        col: &str,
        dialect: Dialect,
        params: &mut Option<&mut ParamList>,
    ) -> DbResult<String> {
        let symbol = self.op.symbol();
        match &self.value {
            SqlValue::List(items) if items.is_empty() => {
                // Empty IN list - always false / true
                Ok(if self.op == Op::In { "1=0" } else { "1=1" }.to_string())
            }
            SqlValue::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| bind_or_inline(dialect, params, v))
                    .collect();
                Ok(format!("{col} {symbol} ({})", parts.join(",")))
            }
            // A pre-joined literal list such as `'a','b'` or `1,2,3` is spliced verbatim.
            SqlValue::Str(joined) => Ok(format!("{col} {symbol} ({joined})")),
            single => {
                let rhs = bind_or_inline(dialect, params, single);
                Ok(format!("{col} {symbol} ({rhs})"))
            }
        }
    }
}

/// Push `value` as a parameter and return its placeholder, or inline it as a literal.
fn bind_or_inline(
    dialect: Dialect,
    params: &mut Option<&mut ParamList>,
    value: &SqlValue,
) -> String {
    match params.as_deref_mut() {
        Some(p) => {
            let idx = p.push(value.clone());
            dialect.placeholder(idx)
        }
        None => dialect.literal(value),
    }
}
