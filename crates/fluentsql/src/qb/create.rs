//! INSERT query builder.

use crate::client::Executor;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::param::{ColumnValues, ParamList};
use crate::qb::traits::{BuiltQuery, MutationQb, SqlQb};
use crate::value::SqlValue;

/// INSERT query builder.
///
/// Column order is insertion order; it defines the placeholder order of
/// [`SqlQb::build_prepared`].
#[derive(Clone, Debug)]
pub struct CreateQb {
    table: String,
    values: ColumnValues,
    dialect: Dialect,
}

impl CreateQb {
    /// Create a new INSERT query builder.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: ColumnValues::new(),
            dialect: Dialect::default(),
        }
    }

    /// Render for another dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set a column value. Setting the same column twice keeps its position.
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.values.set(column, value);
        self
    }

    /// Set an optional column value (None => skip).
    pub fn set_opt<T: Into<SqlValue>>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Append several column values.
    pub fn values<C, V>(mut self, pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        for (c, v) in pairs {
            self.values.set(c, v);
        }
        self
    }

    /// Replace every column value.
    pub fn values_init<C, V>(mut self, pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        self.values = pairs.into_iter().collect();
        self
    }

    /// Clear all columns, keeping the table and dialect.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_values(&self) -> &ColumnValues {
        &self.values
    }

    fn check(&self) -> DbResult<()> {
        if self.values.is_empty() {
            return Err(DbError::validation(format!(
                "INSERT INTO {} has no columns",
                self.table
            )));
        }
        Ok(())
    }

    fn column_list(&self) -> String {
        self.values.columns().collect::<Vec<_>>().join(", ")
    }

    /// Execute the insert and return the id generated for it.
    pub async fn insert_last_id<E: Executor>(&self, conn: &mut E) -> DbResult<u64> {
        self.execute(conn).await?;
        conn.last_insert_id().await
    }

    /// Execute the insert and return the value of `id_column` for the new row.
    ///
    /// PostgreSQL reads it through `RETURNING`; MySQL through the connection's
    /// last insert id.
    pub async fn execute_returning_id<E: Executor>(
        &self,
        conn: &mut E,
        id_column: &str,
    ) -> DbResult<SqlValue> {
        match conn.dialect() {
            Dialect::Postgres => {
                let built = self.build_prepared_for(Dialect::Postgres)?;
                let sql = format!("{} RETURNING {}", built.sql, id_column);
                let rs = conn.query(&sql, built.params.values()).await?;
                rs.first()
                    .and_then(|row| row.value_at(0).cloned())
                    .ok_or_else(|| DbError::not_found(format!("no id returned for {id_column}")))
            }
            Dialect::MySql => self.insert_last_id(conn).await.map(SqlValue::from),
        }
    }
}

impl SqlQb for CreateQb {
    fn default_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_for(&self, dialect: Dialect) -> DbResult<String> {
        self.check()?;
        let literals: Vec<String> = self.values.values().map(|v| dialect.literal(v)).collect();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.column_list(),
            literals.join(", ")
        ))
    }

    fn build_prepared_for(&self, dialect: Dialect) -> DbResult<BuiltQuery> {
        self.check()?;
        let mut params = ParamList::new();
        let placeholders: Vec<String> = self
            .values
            .values()
            .map(|v| dialect.placeholder(params.push(v.clone())))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.column_list(),
            placeholders.join(", ")
        );
        Ok(BuiltQuery::new(sql, params))
    }
}

impl MutationQb for CreateQb {}
