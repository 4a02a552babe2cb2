//! Parameter binding.
//!
//! [`Binder`] validates a parameter list before it reaches a driver and
//! applies the injection filter to text values. The PostgreSQL backend binds
//! [`SqlValue`] directly through its [`ToSql`] implementation, which adapts
//! each variant to the parameter type the server inferred for its
//! placeholder.

use crate::dialect::escape_injection;
use crate::error::{DbError, DbResult};
use crate::value::SqlValue;
use bytes::{BufMut, BytesMut};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::borrow::Cow;
use std::error::Error;
use tokio_postgres::types::{IsNull, ToSql, Type};

/// Prepares ordered parameter lists for binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binder {
    injection_filter: bool,
}

impl Binder {
    pub fn new(injection_filter: bool) -> Self {
        Self { injection_filter }
    }

    pub fn injection_filter(&self) -> bool {
        self.injection_filter
    }

    /// Check `values` and return them in bind order.
    ///
    /// Lists are rejected: they have to be expanded into one placeholder per
    /// element by the builder. `Other` values are bound as text and logged.
    /// With the injection filter on, quotes and backslashes in text values
    /// are escaped before binding.
    pub fn bind<'a>(&self, values: &'a [SqlValue]) -> DbResult<Cow<'a, [SqlValue]>> {
        for (i, value) in values.iter().enumerate() {
            match value {
                SqlValue::List(_) => {
                    return Err(DbError::validation(format!(
                        "parameter {} is a list; expand it into one placeholder per element",
                        i + 1
                    )));
                }
                SqlValue::Other(text) => {
                    tracing::warn!(index = i + 1, value = %text, "binding unrecognized value as text");
                }
                _ => {}
            }
        }

        let needs_escape = self.injection_filter
            && values
                .iter()
                .any(|v| matches!(v, SqlValue::Str(s) if s.contains(['\'', '\\'])));
        if !needs_escape {
            return Ok(Cow::Borrowed(values));
        }

        Ok(Cow::Owned(
            values
                .iter()
                .map(|v| match v {
                    SqlValue::Str(s) => SqlValue::Str(escape_injection(s)),
                    other => other.clone(),
                })
                .collect(),
        ))
    }
}

/// Borrow each value as a `tokio_postgres` parameter.
pub(crate) fn pg_params(values: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

type BoxError = Box<dyn Error + Sync + Send>;

fn mismatch(value: &SqlValue, ty: &Type) -> BoxError {
    format!("cannot bind {} value to parameter of type {}", value.type_name(), ty).into()
}

fn is_text(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty)
}

fn bind_integer(value: &SqlValue, v: i128, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => i64::try_from(v)?.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from_i128_with_scale(v, 0)?.to_sql(ty, out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        Type::CHAR => i8::try_from(v)?.to_sql(ty, out),
        _ if is_text(ty) => v.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn bind_float(value: &SqlValue, v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ if is_text(ty) => value.to_raw_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn bind_decimal(value: &SqlValue, d: &Decimal, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::NUMERIC => d.to_sql(ty, out),
        Type::FLOAT4 | Type::FLOAT8 => {
            let v = d.to_f64().ok_or_else(|| mismatch(value, ty))?;
            bind_float(value, v, ty, out)
        }
        Type::INT2 | Type::INT4 | Type::INT8 if d.fract().is_zero() => {
            let v = d.to_i128().ok_or_else(|| mismatch(value, ty))?;
            bind_integer(value, v, ty, out)
        }
        _ if is_text(ty) => d.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn bind_text(value: &SqlValue, s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::JSONB => {
            out.put_u8(1);
            out.extend_from_slice(s.as_bytes());
            Ok(IsNull::No)
        }
        Type::JSON => {
            out.extend_from_slice(s.as_bytes());
            Ok(IsNull::No)
        }
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            let v: i128 = s.trim().parse()?;
            bind_integer(value, v, ty, out)
        }
        Type::FLOAT4 | Type::FLOAT8 => {
            let v: f64 = s.trim().parse()?;
            bind_float(value, v, ty, out)
        }
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::BOOL => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => true.to_sql(ty, out),
            "0" | "f" | "false" | "n" | "no" | "off" => false.to_sql(ty, out),
            _ => Err(mismatch(value, ty)),
        },
        _ if is_text(ty) => s.to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn bind_temporal(value: &SqlValue, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let ts = value.as_timestamp().ok_or_else(|| mismatch(value, ty))?;
    match *ty {
        Type::TIMESTAMP => ts.to_sql(ty, out),
        Type::TIMESTAMPTZ => Utc.from_utc_datetime(&ts).to_sql(ty, out),
        Type::DATE if !matches!(value, SqlValue::Time(_)) => ts.date().to_sql(ty, out),
        Type::TIME if !matches!(value, SqlValue::Date(_)) => ts.time().to_sql(ty, out),
        _ if is_text(ty) => value.to_raw_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Str(s) | SqlValue::Other(s) => bind_text(self, s, ty, out),
            SqlValue::Int(v) => bind_integer(self, i128::from(*v), ty, out),
            SqlValue::Long(v) => bind_integer(self, i128::from(*v), ty, out),
            SqlValue::BigInt(v) => bind_integer(self, *v, ty, out),
            SqlValue::Byte(v) => bind_integer(self, i128::from(*v), ty, out),
            SqlValue::Float(v) => bind_float(self, f64::from(*v), ty, out),
            SqlValue::Double(v) => bind_float(self, *v, ty, out),
            SqlValue::Decimal(d) => bind_decimal(self, d, ty, out),
            SqlValue::Timestamp(_) | SqlValue::Date(_) | SqlValue::Time(_) => {
                bind_temporal(self, ty, out)
            }
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => bind_integer(self, i128::from(*b), ty, out),
                _ if is_text(ty) => (if *b { "true" } else { "false" }).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::Bytes(bytes) => match *ty {
                Type::BYTEA => bytes.as_slice().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::List(_) => {
                Err("list values must be expanded into one placeholder per element".into())
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}
