//! MySQL backend on top of `mysql_async` and its built-in pool.

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::record::{ColumnKind, RecordSet, cap_blob};
use crate::value::SqlValue;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Value};
use rust_decimal::Decimal;

/// Character set id MySQL reports for binary columns.
const BINARY_CHARSET: u16 = 63;

/// Build the `mysql_async` pool described by `config`.
pub(crate) fn build_pool(config: &DbConfig, password: Option<String>) -> DbResult<Pool> {
    let mut builder = match &config.url {
        Some(url) => OptsBuilder::from_opts(
            Opts::from_url(url)
                .map_err(|e| DbError::Configuration(format!("invalid MySQL url: {e}")))?,
        ),
        None => OptsBuilder::default(),
    };
    if let Some(host) = &config.host {
        builder = builder.ip_or_hostname(host.clone());
    }
    if let Some(port) = config.port {
        builder = builder.tcp_port(port);
    }
    if let Some(database) = &config.database {
        builder = builder.db_name(Some(database.clone()));
    }
    if let Some(user) = &config.user {
        builder = builder.user(Some(user.clone()));
    }
    if let Some(password) = password {
        builder = builder.pass(Some(password));
    }

    let constraints = PoolConstraints::new(config.min_pool_size, config.max_pool_size)
        .ok_or_else(|| DbError::config("min_pool_size must not exceed max_pool_size"))?;
    let mut pool_opts = PoolOpts::default()
        .with_constraints(constraints)
        .with_abs_conn_ttl(config.max_lifetime());
    if let Some(idle) = config.idle_timeout() {
        pool_opts = pool_opts.with_inactive_connection_ttl(idle);
    }

    Ok(Pool::new(builder.pool_opts(pool_opts)))
}

/// Convert a value to its `mysql_async` parameter form.
pub(crate) fn to_mysql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Str(s) | SqlValue::Other(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Int(v) => Value::Int(i64::from(*v)),
        SqlValue::Long(v) => Value::Int(*v),
        SqlValue::BigInt(v) => match (i64::try_from(*v), u64::try_from(*v)) {
            (Ok(v), _) => Value::Int(v),
            (_, Ok(v)) => Value::UInt(v),
            _ => Value::Bytes(v.to_string().into_bytes()),
        },
        SqlValue::Float(v) => Value::Float(*v),
        SqlValue::Double(v) => Value::Double(*v),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Timestamp(ts) => Value::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.nanosecond() / 1000,
        ),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Byte(v) => Value::Int(i64::from(*v)),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::List(_) => Value::Bytes(value.to_raw_string().into_bytes()),
    }
}

/// Coercion class for a MySQL result column.
pub(crate) fn column_kind(column_type: ColumnType, charset: u16) -> ColumnKind {
    use ColumnType::*;
    match column_type {
        MYSQL_TYPE_BIT => ColumnKind::Bool,
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG | MYSQL_TYPE_YEAR => {
            ColumnKind::SmallInt
        }
        MYSQL_TYPE_LONGLONG => ColumnKind::BigInt,
        MYSQL_TYPE_FLOAT => ColumnKind::Float,
        MYSQL_TYPE_DOUBLE => ColumnKind::Double,
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => ColumnKind::Decimal,
        MYSQL_TYPE_DATE
        | MYSQL_TYPE_NEWDATE
        | MYSQL_TYPE_DATETIME
        | MYSQL_TYPE_DATETIME2
        | MYSQL_TYPE_TIMESTAMP
        | MYSQL_TYPE_TIMESTAMP2
        | MYSQL_TYPE_TIME
        | MYSQL_TYPE_TIME2 => ColumnKind::Temporal,
        MYSQL_TYPE_TINY_BLOB
        | MYSQL_TYPE_MEDIUM_BLOB
        | MYSQL_TYPE_LONG_BLOB
        | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_STRING
        | MYSQL_TYPE_VAR_STRING
        | MYSQL_TYPE_VARCHAR
            if charset == BINARY_CHARSET =>
        {
            ColumnKind::Binary
        }
        MYSQL_TYPE_GEOMETRY => ColumnKind::Binary,
        MYSQL_TYPE_TINY_BLOB
        | MYSQL_TYPE_MEDIUM_BLOB
        | MYSQL_TYPE_LONG_BLOB
        | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_STRING
        | MYSQL_TYPE_VAR_STRING
        | MYSQL_TYPE_VARCHAR
        | MYSQL_TYPE_ENUM
        | MYSQL_TYPE_SET
        | MYSQL_TYPE_JSON
        | MYSQL_TYPE_NULL => ColumnKind::Char,
        other => ColumnKind::Unsupported(format!("{other:?}")),
    }
}

fn text(column: &str, bytes: Vec<u8>) -> DbResult<String> {
    String::from_utf8(bytes).map_err(|e| DbError::decode(column, e.to_string()))
}

fn parse<T>(column: &str, bytes: Vec<u8>) -> DbResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let s = text(column, bytes)?;
    s.trim()
        .parse()
        .map_err(|e: T::Err| DbError::decode(column, format!("cannot parse {s:?}: {e}")))
}

fn integer(value: i128) -> SqlValue {
    match i32::try_from(value) {
        Ok(v) => SqlValue::Int(v),
        Err(_) => big_integer(value),
    }
}

/// BIGINT stays 64-bit; only unsigned values above `i64::MAX` widen further.
fn big_integer(value: i128) -> SqlValue {
    match i64::try_from(value) {
        Ok(v) => SqlValue::Long(v),
        Err(_) => SqlValue::BigInt(value),
    }
}

fn temporal(column: &str, value: Value) -> DbResult<Option<NaiveDateTime>> {
    match value {
        // Zero dates ('0000-00-00') carry no instant.
        Value::Date(0, 0, 0, ..) => Ok(None),
        Value::Date(y, m, d, h, mi, s, us) => NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d))
            .and_then(|date| {
                date.and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
            })
            .map(Some)
            .ok_or_else(|| DbError::decode(column, "invalid date")),
        Value::Time(false, 0, h, mi, s, us) => NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
            .and_then(|t| SqlValue::Time(t).as_timestamp())
            .map(Some)
            .ok_or_else(|| DbError::decode(column, "invalid time")),
        Value::Time(..) => Err(DbError::decode(column, "time value outside a single day")),
        Value::Bytes(bytes) => {
            let s = text(column, bytes)?;
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d"]
                .iter()
                .find_map(|fmt| {
                    NaiveDateTime::parse_from_str(&s, fmt)
                        .ok()
                        .or_else(|| NaiveDate::parse_from_str(&s, fmt).ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
                })
                .map(Some)
                .ok_or_else(|| DbError::decode(column, format!("cannot parse {s:?} as a timestamp")))
        }
        other => Err(DbError::decode(column, format!("unexpected temporal value {other:?}"))),
    }
}

/// Coerce one MySQL cell according to its column kind.
pub(crate) fn decode_value(
    column: &str,
    kind: &ColumnKind,
    value: Value,
    max_blob_bytes: usize,
) -> DbResult<Option<SqlValue>> {
    if value == Value::NULL {
        return Ok(None);
    }
    let mismatch = |v: &Value| DbError::decode(column, format!("unexpected value {v:?} for {kind:?} column"));

    let out = match (kind, value) {
        (ColumnKind::Bool, Value::Bytes(bytes)) => SqlValue::Bool(bytes.iter().any(|b| *b != 0)),
        (ColumnKind::Bool, Value::Int(v)) => SqlValue::Bool(v != 0),
        (ColumnKind::Bool, Value::UInt(v)) => SqlValue::Bool(v != 0),

        (ColumnKind::SmallInt, Value::Int(v)) => integer(i128::from(v)),
        (ColumnKind::SmallInt, Value::UInt(v)) => integer(i128::from(v)),
        (ColumnKind::SmallInt, Value::Bytes(bytes)) => integer(parse::<i128>(column, bytes)?),
        (ColumnKind::BigInt, Value::Int(v)) => big_integer(i128::from(v)),
        (ColumnKind::BigInt, Value::UInt(v)) => big_integer(i128::from(v)),
        (ColumnKind::BigInt, Value::Bytes(bytes)) => big_integer(parse::<i128>(column, bytes)?),

        (ColumnKind::Float, Value::Float(v)) => SqlValue::Float(v),
        (ColumnKind::Float, Value::Double(v)) => SqlValue::Float(v as f32),
        (ColumnKind::Float, Value::Bytes(bytes)) => SqlValue::Float(parse(column, bytes)?),
        (ColumnKind::Double, Value::Double(v)) => SqlValue::Double(v),
        (ColumnKind::Double, Value::Float(v)) => SqlValue::Double(f64::from(v)),
        (ColumnKind::Double, Value::Bytes(bytes)) => SqlValue::Double(parse(column, bytes)?),

        (ColumnKind::Decimal, Value::Bytes(bytes)) => SqlValue::Decimal(parse::<Decimal>(column, bytes)?),
        (ColumnKind::Decimal, Value::Int(v)) => SqlValue::Decimal(Decimal::from(v)),

        (ColumnKind::Temporal, value) => match temporal(column, value)? {
            Some(ts) => SqlValue::Timestamp(ts),
            None => return Ok(None),
        },

        (ColumnKind::Binary, Value::Bytes(bytes)) => SqlValue::Bytes(cap_blob(bytes, max_blob_bytes)),

        (ColumnKind::Char | ColumnKind::Unsupported(_), Value::Bytes(bytes)) => SqlValue::Str(text(column, bytes)?),
        (ColumnKind::Char | ColumnKind::Unsupported(_), Value::Int(v)) => SqlValue::Str(v.to_string()),
        (ColumnKind::Char | ColumnKind::Unsupported(_), Value::UInt(v)) => SqlValue::Str(v.to_string()),

        (_, other) => return Err(mismatch(&other)),
    };
    Ok(Some(out))
}

fn materialize(
    columns: &[Column],
    rows: Vec<mysql_async::Row>,
    max_blob_bytes: usize,
) -> DbResult<RecordSet> {
    let names: Vec<String> = columns.iter().map(|c| c.name_str().into_owned()).collect();
    let kinds: Vec<ColumnKind> = columns
        .iter()
        .map(|c| column_kind(c.column_type(), c.character_set()))
        .collect();

    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        let mut cells = Vec::with_capacity(names.len());
        for (idx, (name, kind)) in names.iter().zip(&kinds).enumerate() {
            let value: Value = row.take(idx).unwrap_or(Value::NULL);
            cells.push(decode_value(name, kind, value, max_blob_bytes)?);
        }
        out.push(cells);
    }
    Ok(RecordSet::new(names, out))
}

/// One pooled MySQL connection.
pub(crate) struct MySqlConnection {
    conn: Option<Conn>,
}

impl MySqlConnection {
    pub(crate) fn new(conn: Conn) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&mut self) -> DbResult<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Connection("connection already released".to_string()))
    }

    pub(crate) async fn batch(&mut self, sql: &str) -> DbResult<()> {
        self.conn()?.query_drop(sql).await?;
        Ok(())
    }

    pub(crate) async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let conn = self.conn()?;
        // Literal statements (bulk inserts, ad-hoc SQL) stay out of the statement cache.
        if params.is_empty() {
            conn.query_drop(sql).await?;
        } else {
            let params: Vec<Value> = params.iter().map(to_mysql_value).collect();
            conn.exec_drop(sql, params).await?;
        }
        Ok(conn.affected_rows())
    }

    pub(crate) async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        max_blob_bytes: usize,
    ) -> DbResult<RecordSet> {
        let conn = self.conn()?;
        let (columns, rows): (Vec<Column>, Vec<mysql_async::Row>) = if params.is_empty() {
            let mut result = conn.query_iter(sql).await?;
            (result.columns_ref().to_vec(), result.collect().await?)
        } else {
            let params: Vec<Value> = params.iter().map(to_mysql_value).collect();
            let mut result = conn.exec_iter(sql, params).await?;
            (result.columns_ref().to_vec(), result.collect().await?)
        };
        materialize(&columns, rows, max_blob_bytes)
    }

    /// Id generated by the last INSERT on this connection, as reported in the OK packet.
    pub(crate) fn last_insert_id(&self) -> Option<u64> {
        self.conn.as_ref().and_then(|c| c.last_insert_id())
    }

    /// Close the physical connection instead of returning it to the pool.
    pub(crate) fn detach(&mut self) {
        if let Some(conn) = self.conn.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = conn.disconnect().await {
                            tracing::warn!(error = %e, "failed to close MySQL connection");
                        }
                    });
                }
                Err(_) => drop(conn),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_charset_selects_binary_kind() {
        assert_eq!(
            column_kind(ColumnType::MYSQL_TYPE_BLOB, BINARY_CHARSET),
            ColumnKind::Binary
        );
        assert_eq!(column_kind(ColumnType::MYSQL_TYPE_BLOB, 33), ColumnKind::Char);
        assert_eq!(
            column_kind(ColumnType::MYSQL_TYPE_NEWDECIMAL, 63),
            ColumnKind::Decimal
        );
    }

    #[test]
    fn decode_cells() {
        let max = 4;
        assert_eq!(
            decode_value("n", &ColumnKind::SmallInt, Value::Int(5), max).unwrap(),
            Some(SqlValue::Int(5))
        );
        assert_eq!(
            decode_value("id", &ColumnKind::BigInt, Value::Int(5), max).unwrap(),
            Some(SqlValue::Long(5))
        );
        assert_eq!(
            decode_value("id", &ColumnKind::BigInt, Value::Bytes(b"42".to_vec()), max).unwrap(),
            Some(SqlValue::Long(42))
        );
        assert_eq!(
            decode_value("n", &ColumnKind::SmallInt, Value::UInt(u64::from(u32::MAX)), max).unwrap(),
            Some(SqlValue::Long(i64::from(u32::MAX)))
        );
        assert_eq!(
            decode_value("n", &ColumnKind::BigInt, Value::UInt(u64::MAX), max).unwrap(),
            Some(SqlValue::BigInt(i128::from(u64::MAX)))
        );
        assert_eq!(
            decode_value("d", &ColumnKind::Decimal, Value::Bytes(b"12.50".to_vec()), max).unwrap(),
            Some(SqlValue::Decimal(Decimal::new(1250, 2)))
        );
        assert_eq!(
            decode_value("b", &ColumnKind::Binary, Value::Bytes(vec![1, 2, 3, 4, 5, 6]), max).unwrap(),
            Some(SqlValue::Bytes(vec![1, 2, 3, 4]))
        );
        assert_eq!(decode_value("x", &ColumnKind::Char, Value::NULL, max).unwrap(), None);
        assert!(decode_value("f", &ColumnKind::Float, Value::Bytes(b"abc".to_vec()), max).is_err());
    }

    #[test]
    fn decode_temporal_cells() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(
            decode_value("t", &ColumnKind::Temporal, Value::Date(2024, 1, 31, 12, 30, 0, 0), 0).unwrap(),
            Some(SqlValue::Timestamp(ts))
        );
        assert_eq!(
            decode_value("t", &ColumnKind::Temporal, Value::Date(0, 0, 0, 0, 0, 0, 0), 0).unwrap(),
            None
        );
        assert_eq!(
            decode_value(
                "t",
                &ColumnKind::Temporal,
                Value::Bytes(b"2024-01-31 12:30:00".to_vec()),
                0
            )
            .unwrap(),
            Some(SqlValue::Timestamp(ts))
        );
    }

    #[test]
    fn parameters_convert() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_micro_opt(1, 2, 3, 4)
            .unwrap();
        assert_eq!(
            to_mysql_value(&SqlValue::Timestamp(ts)),
            Value::Date(2024, 1, 31, 1, 2, 3, 4)
        );
        assert_eq!(to_mysql_value(&SqlValue::Bool(true)), Value::Int(1));
        assert_eq!(
            to_mysql_value(&SqlValue::Decimal(Decimal::new(15, 1))),
            Value::Bytes(b"1.5".to_vec())
        );
        assert_eq!(
            to_mysql_value(&SqlValue::BigInt(i128::from(u64::MAX))),
            Value::UInt(u64::MAX)
        );
    }
}
