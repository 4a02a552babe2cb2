//! SELECT query builder.

use crate::client::Executor;
use crate::condition::{Condition, Connective, Op};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::expr::{where_methods, ExprGroup};
use crate::qb::param::ParamList;
use crate::qb::traits::{BuiltQuery, SqlQb};
use crate::record::{RecordRow, RecordSet};
use crate::value::SqlValue;
use rust_decimal::prelude::ToPrimitive;

/// SELECT query builder with joins, grouping, ordering and paging.
///
/// Execution borrows the builder, so the same filter can drive a
/// [`RetrieveQb::count`] followed by a page fetch.
#[derive(Clone, Debug)]
pub struct RetrieveQb {
    /// Table or FROM expression
    from_expr: String,
    /// SELECT columns (default ["*"])
    select_cols: Vec<String>,
    distinct: bool,
    /// JOIN clauses
    join_clauses: Vec<String>,
    /// WHERE conditions
    where_group: ExprGroup,
    /// ORDER BY clauses
    order_clauses: Vec<String>,
    /// GROUP BY columns
    group_by: Vec<String>,
    /// HAVING conditions
    having_group: ExprGroup,
    limit: Option<u64>,
    offset: Option<u64>,
    dialect: Dialect,
}

impl RetrieveQb {
    /// Create a new SELECT query builder for a table (or aliased FROM expression).
    pub fn new(table: &str) -> Self {
        Self {
            from_expr: table.to_string(),
            select_cols: vec!["*".to_string()],
            distinct: false,
            join_clauses: Vec::new(),
            where_group: ExprGroup::new(),
            order_clauses: Vec::new(),
            group_by: Vec::new(),
            having_group: ExprGroup::new(),
            limit: None,
            offset: None,
            dialect: Dialect::default(),
        }
    }

    /// Render for another dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    // ==================== SELECT columns ====================

    /// Set SELECT columns (string form, supports complex expressions).
    pub fn select(mut self, cols: &str) -> Self {
        self.select_cols = vec![cols.to_string()];
        self
    }

    /// Set SELECT columns (array form).
    pub fn select_cols(mut self, cols: &[&str]) -> Self {
        self.select_cols = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Append one SELECT column.
    pub fn add_select(mut self, col: &str) -> Self {
        if self.select_cols.len() == 1 && self.select_cols[0] == "*" {
            self.select_cols[0] = col.to_string();
        } else {
            self.select_cols.push(col.to_string());
        }
        self
    }

    /// SELECT DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    /// Add INNER JOIN.
    pub fn inner_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("INNER JOIN {table} ON {on}"));
        self
    }

    /// Add LEFT OUTER JOIN.
    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("LEFT OUTER JOIN {table} ON {on}"));
        self
    }

    /// Add RIGHT OUTER JOIN.
    pub fn right_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("RIGHT OUTER JOIN {table} ON {on}"));
        self
    }

    // ==================== Ordering & Grouping ====================

    /// Add a raw ORDER BY clause.
    pub fn order_by(mut self, clause: &str) -> Self {
        self.order_clauses.push(clause.to_string());
        self
    }

    /// Add ORDER BY column ASC.
    pub fn order_by_asc(mut self, column: &str) -> Self {
        self.order_clauses.push(format!("{column} ASC"));
        self
    }

    /// Add ORDER BY column DESC.
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_clauses.push(format!("{column} DESC"));
        self
    }

    /// Replace every ORDER BY clause with this one.
    pub fn order_init(mut self, column: &str, descending: bool) -> Self {
        self.order_clauses.clear();
        if descending {
            self.order_by_desc(column)
        } else {
            self.order_by_asc(column)
        }
    }

    /// Add a GROUP BY column.
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    /// Add HAVING condition: `expr <op> value`, joined with AND.
    pub fn having(mut self, expr: &str, op: Op, value: impl Into<SqlValue>) -> Self {
        self.having_group.push(Condition::new(expr, op, value));
        self
    }

    /// Add a raw HAVING fragment, joined with AND.
    pub fn having_raw(mut self, sql: &str) -> Self {
        self.having_group.push_raw(Connective::And, sql);
        self
    }

    // ==================== Pagination ====================

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Pagination helper.
    ///
    /// `current` is 1-based; both arguments are clamped to >= 1.
    /// Yields `OFFSET = (current - 1) * size, LIMIT = size`; the offset
    /// saturates at `u64::MAX`.
    pub fn paging(mut self, current: u64, size: u64) -> Self {
        let p = current.max(1);
        let size = size.max(1);
        self.limit = Some(size);
        self.offset = Some((p - 1).saturating_mul(size));
        self
    }

    /// Clear all accumulated state except the table and dialect.
    pub fn reset(&mut self) {
        self.select_cols = vec!["*".to_string()];
        self.distinct = false;
        self.join_clauses.clear();
        self.where_group.clear();
        self.order_clauses.clear();
        self.group_by.clear();
        self.having_group.clear();
        self.limit = None;
        self.offset = None;
    }

    // ==================== Build helpers ====================

    /// FROM .. JOIN .. WHERE .. GROUP BY .. HAVING, shared by SELECT and COUNT.
    fn render_body(
        &self,
        dialect: Dialect,
        params: &mut Option<&mut ParamList>,
    ) -> DbResult<String> {
        let mut sql = format!(" FROM {}", self.from_expr);

        for join in &self.join_clauses {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.where_group.is_empty() {
            sql.push_str(" WHERE ");
            let where_sql = match params.as_deref_mut() {
                Some(p) => self.where_group.render_prepared(dialect, p)?,
                None => self.where_group.render(dialect)?,
            };
            sql.push_str(&where_sql);
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.having_group.is_empty() {
            sql.push_str(" HAVING ");
            let having_sql = match params.as_deref_mut() {
                Some(p) => self.having_group.render_prepared(dialect, p)?,
                None => self.having_group.render(dialect)?,
            };
            sql.push_str(&having_sql);
        }

        Ok(sql)
    }

    fn select_list(&self) -> String {
        let cols = self.select_cols.join(", ");
        if self.distinct {
            format!("DISTINCT {cols}")
        } else {
            cols
        }
    }

    fn render_select(
        &self,
        dialect: Dialect,
        params: &mut Option<&mut ParamList>,
    ) -> DbResult<String> {
        let mut sql = format!("SELECT {}", self.select_list());
        sql.push_str(&self.render_body(dialect, params)?);

        if !self.order_clauses.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_clauses.join(", "));
        }

        sql.push_str(&dialect.limit_offset(self.limit, self.offset));
        Ok(sql)
    }

    /// Grouped or DISTINCT queries are counted as a derived table that keeps
    /// the select list, so HAVING may reference select aliases.
    fn render_count(
        &self,
        dialect: Dialect,
        params: &mut Option<&mut ParamList>,
    ) -> DbResult<String> {
        let body = self.render_body(dialect, params)?;
        if !self.group_by.is_empty() || !self.having_group.is_empty() || self.distinct {
            Ok(format!("SELECT COUNT(*) FROM (SELECT {}{body}) AS t", self.select_list()))
        } else {
            Ok(format!("SELECT COUNT(*){body}"))
        }
    }

    /// Literal COUNT SQL for `dialect`.
    pub fn build_count_for(&self, dialect: Dialect) -> DbResult<String> {
        self.render_count(dialect, &mut None)
    }

    /// Literal COUNT SQL in the builder's own dialect.
    pub fn build_count(&self) -> DbResult<String> {
        self.build_count_for(self.dialect)
    }

    /// Placeholder COUNT SQL for `dialect`.
    pub fn build_count_prepared_for(&self, dialect: Dialect) -> DbResult<BuiltQuery> {
        let mut params = ParamList::new();
        let sql = self.render_count(dialect, &mut Some(&mut params))?;
        Ok(BuiltQuery::new(sql, params))
    }

    // ==================== Execution ====================

    /// Execute and materialize every row.
    pub async fn fetch<E: Executor>(&self, conn: &mut E) -> DbResult<RecordSet> {
        self.query(conn).await
    }

    /// Execute and return the first row, or `DbError::NotFound`.
    pub async fn fetch_one<E: Executor>(&self, conn: &mut E) -> DbResult<RecordRow> {
        self.query_one(conn).await
    }

    /// Execute and return the first row, if any.
    pub async fn fetch_opt<E: Executor>(&self, conn: &mut E) -> DbResult<Option<RecordRow>> {
        self.query_opt(conn).await
    }

    /// Execute the COUNT form of this query.
    pub async fn count<E: Executor>(&self, conn: &mut E) -> DbResult<u64> {
        let built = self.build_count_prepared_for(conn.dialect())?;
        let rs = conn.query(&built.sql, built.params.values()).await?;
        let cell = rs.first().and_then(|row| row.value_at(0));
        match cell.and_then(SqlValue::as_i64) {
            Some(n) => Ok(u64::try_from(n).unwrap_or(0)),
            None => match cell {
                Some(SqlValue::Decimal(d)) => Ok(d.to_u64().unwrap_or(0)),
                _ => Err(DbError::decode("COUNT(*)", "count query returned no integer")),
            },
        }
    }

    /// Count, then fetch the current page; the total is set on the returned set.
    pub async fn fetch_paged<E: Executor>(&self, conn: &mut E) -> DbResult<RecordSet> {
        let total = self.count(conn).await?;
        let mut rs = self.fetch(conn).await?;
        rs.set_total(Some(total));
        Ok(rs)
    }
}

where_methods!(RetrieveQb, where_group);

impl SqlQb for RetrieveQb {
    fn default_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_for(&self, dialect: Dialect) -> DbResult<String> {
        self.render_select(dialect, &mut None)
    }

    fn build_prepared_for(&self, dialect: Dialect) -> DbResult<BuiltQuery> {
        let mut params = ParamList::new();
        let sql = self.render_select(dialect, &mut Some(&mut params))?;
        Ok(BuiltQuery::new(sql, params))
    }
}
