//! PostgreSQL backend: pool construction, statement execution and row
//! materialization on top of `tokio-postgres` and `deadpool-postgres`.

use crate::binder::pg_params;
use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::record::{ColumnKind, RecordSet, cap_blob};
use crate::value::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{
    Hook, HookError, Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime,
};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{CancelToken, Column, NoTls, Row};

/// Build the connection pool described by `config`.
///
/// Max-lifetime and idle-timeout eviction run as a pre-recycle hook: a
/// connection that is too old or has been idle too long is discarded instead
/// of being handed out.
pub(crate) fn build_pool(config: &DbConfig, password: Option<String>) -> DbResult<Pool> {
    let mut pg_config: tokio_postgres::Config = match &config.url {
        Some(url) => url
            .parse()
            .map_err(|e: tokio_postgres::Error| DbError::Configuration(e.to_string()))?,
        None => tokio_postgres::Config::new(),
    };
    if let Some(host) = &config.host {
        pg_config.host(host);
    }
    if let Some(port) = config.port {
        pg_config.port(port);
    }
    if let Some(database) = &config.database {
        pg_config.dbname(database);
    }
    if let Some(user) = &config.user {
        pg_config.user(user);
    }
    if let Some(password) = password {
        pg_config.password(password);
    }
    let connect_timeout = config.connection_timeout();
    if let Some(timeout) = connect_timeout {
        pg_config.connect_timeout(timeout);
    }

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    let mut builder = Pool::builder(mgr)
        .max_size(config.max_pool_size)
        .runtime(Runtime::Tokio1)
        .wait_timeout(connect_timeout)
        .create_timeout(connect_timeout);

    let max_lifetime = config.max_lifetime();
    let idle_timeout = config.idle_timeout();
    if max_lifetime.is_some() || idle_timeout.is_some() {
        builder = builder.pre_recycle(Hook::sync_fn(move |_client, metrics| {
            if let Some(reason) = eviction_reason(max_lifetime, idle_timeout, metrics.age(), metrics.last_used()) {
                return Err(HookError::Message(reason.into()));
            }
            Ok(())
        }));
    }

    builder
        .build()
        .map_err(|e| DbError::Configuration(format!("failed to build pool: {e}")))
}

/// Why a pooled connection with the given age and idle time must be discarded.
pub(crate) fn eviction_reason(
    max_lifetime: Option<Duration>,
    idle_timeout: Option<Duration>,
    age: Duration,
    idle: Duration,
) -> Option<&'static str> {
    if max_lifetime.is_some_and(|max| age >= max) {
        Some("connection exceeded max lifetime")
    } else if idle_timeout.is_some_and(|max| idle >= max) {
        Some("connection exceeded idle timeout")
    } else {
        None
    }
}

/// One pooled PostgreSQL connection.
pub(crate) struct PgConnection {
    client: Option<Object>,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn client(&self) -> DbResult<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Connection("connection already released".to_string()))
    }

    pub(crate) fn cancel_token(&self) -> Option<CancelToken> {
        self.client.as_ref().map(|c| c.cancel_token())
    }

    pub(crate) async fn batch(&mut self, sql: &str) -> DbResult<()> {
        self.client()?.batch_execute(sql).await?;
        Ok(())
    }

    pub(crate) async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let client = self.client()?;
        // Literal statements (bulk inserts, ad-hoc SQL) stay out of the statement cache.
        if params.is_empty() {
            return Ok(client.execute(sql, &[]).await?);
        }
        let stmt = client.prepare_cached(sql).await?;
        Ok(client.execute(&stmt, &pg_params(params)).await?)
    }

    pub(crate) async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        max_blob_bytes: usize,
    ) -> DbResult<RecordSet> {
        let client = self.client()?;
        let stmt = if params.is_empty() {
            client.prepare(sql).await?
        } else {
            client.prepare_cached(sql).await?
        };
        let rows = client.query(&stmt, &pg_params(params)).await?;
        materialize(stmt.columns(), &rows, max_blob_bytes)
    }

    /// Drop the physical connection instead of returning it to the pool.
    ///
    /// Used when a connection is released with a transaction still open.
    pub(crate) fn detach(&mut self) {
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
        }
    }
}

/// Coercion class for a PostgreSQL column type.
pub(crate) fn column_kind(ty: &Type) -> ColumnKind {
    match *ty {
        Type::BOOL => ColumnKind::Bool,
        Type::CHAR | Type::INT2 | Type::INT4 => ColumnKind::SmallInt,
        Type::INT8 | Type::OID => ColumnKind::BigInt,
        Type::FLOAT4 => ColumnKind::Float,
        Type::FLOAT8 => ColumnKind::Double,
        Type::NUMERIC => ColumnKind::Decimal,
        Type::BYTEA => ColumnKind::Binary,
        Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE | Type::TIME => ColumnKind::Temporal,
        Type::TEXT
        | Type::VARCHAR
        | Type::BPCHAR
        | Type::NAME
        | Type::UNKNOWN
        | Type::JSON
        | Type::JSONB => ColumnKind::Char,
        _ => ColumnKind::Unsupported(ty.name().to_string()),
    }
}

fn materialize(columns: &[Column], rows: &[Row], max_blob_bytes: usize) -> DbResult<RecordSet> {
    let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    let kinds: Vec<ColumnKind> = columns.iter().map(|c| column_kind(c.type_())).collect();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(columns.len());
        for (idx, (column, kind)) in columns.iter().zip(&kinds).enumerate() {
            cells.push(decode_cell(row, idx, column, kind, max_blob_bytes)?);
        }
        out.push(cells);
    }
    Ok(RecordSet::new(names, out))
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, column: &Column) -> DbResult<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| DbError::decode(column.name(), e.to_string()))
}

fn decode_cell(
    row: &Row,
    idx: usize,
    column: &Column,
    kind: &ColumnKind,
    max_blob_bytes: usize,
) -> DbResult<Option<SqlValue>> {
    let ty = column.type_();
    let value = match kind {
        ColumnKind::Bool => get::<bool>(row, idx, column)?.map(SqlValue::Bool),
        ColumnKind::SmallInt => match *ty {
            Type::CHAR => get::<i8>(row, idx, column)?.map(|v| SqlValue::Int(i32::from(v))),
            Type::INT2 => get::<i16>(row, idx, column)?.map(|v| SqlValue::Int(i32::from(v))),
            _ => get::<i32>(row, idx, column)?.map(SqlValue::Int),
        },
        ColumnKind::BigInt => match *ty {
            Type::OID => get::<u32>(row, idx, column)?.map(|v| SqlValue::Long(i64::from(v))),
            _ => get::<i64>(row, idx, column)?.map(SqlValue::Long),
        },
        ColumnKind::Float => get::<f32>(row, idx, column)?.map(SqlValue::Float),
        ColumnKind::Double => get::<f64>(row, idx, column)?.map(SqlValue::Double),
        ColumnKind::Decimal => get::<Decimal>(row, idx, column)?.map(SqlValue::Decimal),
        ColumnKind::Binary => get::<Vec<u8>>(row, idx, column)?
            .map(|bytes| SqlValue::Bytes(cap_blob(bytes, max_blob_bytes))),
        ColumnKind::Temporal => {
            let ts = match *ty {
                Type::TIMESTAMPTZ => {
                    get::<DateTime<Utc>>(row, idx, column)?.map(|v| v.naive_utc())
                }
                Type::DATE => get::<NaiveDate>(row, idx, column)?
                    .and_then(|d| SqlValue::Date(d).as_timestamp()),
                Type::TIME => get::<NaiveTime>(row, idx, column)?
                    .and_then(|t| SqlValue::Time(t).as_timestamp()),
                _ => get::<NaiveDateTime>(row, idx, column)?,
            };
            ts.map(SqlValue::Timestamp)
        }
        ColumnKind::Char => match *ty {
            Type::JSON | Type::JSONB => {
                get::<serde_json::Value>(row, idx, column)?.map(|v| SqlValue::Str(v.to_string()))
            }
            _ => get::<String>(row, idx, column)?.map(SqlValue::Str),
        },
        ColumnKind::Unsupported(name) => get::<String>(row, idx, column)
            .map_err(|_| {
                DbError::decode(column.name(), format!("unsupported column type {name}"))
            })?
            .map(SqlValue::Str),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_kinds() {
        assert_eq!(column_kind(&Type::INT4), ColumnKind::SmallInt);
        assert_eq!(column_kind(&Type::INT8), ColumnKind::BigInt);
        assert_eq!(column_kind(&Type::NUMERIC), ColumnKind::Decimal);
        assert_eq!(column_kind(&Type::DATE), ColumnKind::Temporal);
        assert_eq!(column_kind(&Type::VARCHAR), ColumnKind::Char);
        assert_eq!(column_kind(&Type::BYTEA), ColumnKind::Binary);
        assert_eq!(
            column_kind(&Type::UUID),
            ColumnKind::Unsupported("uuid".to_string())
        );
    }

    #[test]
    fn eviction() {
        let hour = Duration::from_secs(3600);
        let minute = Duration::from_secs(60);
        assert_eq!(eviction_reason(None, None, hour, hour), None);
        assert_eq!(
            eviction_reason(Some(hour), None, hour, Duration::ZERO),
            Some("connection exceeded max lifetime")
        );
        assert_eq!(
            eviction_reason(Some(hour), Some(minute), minute, minute * 2),
            Some("connection exceeded idle timeout")
        );
        assert_eq!(eviction_reason(Some(hour), Some(minute), minute, Duration::ZERO), None);
    }
}
