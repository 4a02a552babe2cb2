//! Bindable values.
//!
//! [`SqlValue`] is the closed set of values the builders accept and the
//! materializer produces. The variant alone decides how a value is rendered
//! as a literal and how it is bound to a prepared statement.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::fmt;

/// Timestamp layout used for temporal comparisons (`20240131235959`).
pub(crate) const COMPACT_TIMESTAMP: &str = "%Y%m%d%H%M%S";

/// Layout used when a temporal value is written as a plain literal.
pub(crate) const LITERAL_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A value that can be rendered into SQL text or bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Character data
    Str(String),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Integer wider than 64 bits
    BigInt(i128),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Arbitrary-precision decimal
    Decimal(Decimal),
    /// Date and time without zone
    Timestamp(NaiveDateTime),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Boolean
    Bool(bool),
    /// Single signed byte
    Byte(i8),
    /// Binary data
    Bytes(Vec<u8>),
    /// A list of values, rendered as `(a, b, c)` for IN / NOT IN
    List(Vec<SqlValue>),
    /// Anything else; bound as its text form after a diagnostic log.
    Other(String),
}

/// How a value takes part in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Null,
    Numeric,
    Temporal,
    Text,
    List,
}

impl SqlValue {
    /// Wrap any value convertible into an [`SqlValue`].
    pub fn from_value<T: Into<SqlValue>>(value: T) -> Self {
        value.into()
    }

    /// Fallback variant for values outside the closed set.
    pub fn other(value: impl fmt::Display) -> Self {
        SqlValue::Other(value.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Rendering class of this value.
    pub fn class(&self) -> ValueClass {
        match self {
            SqlValue::Null => ValueClass::Null,
            SqlValue::Int(_)
            | SqlValue::Long(_)
            | SqlValue::BigInt(_)
            | SqlValue::Float(_)
            | SqlValue::Double(_)
            | SqlValue::Decimal(_)
            | SqlValue::Byte(_) => ValueClass::Numeric,
            SqlValue::Timestamp(_) | SqlValue::Date(_) | SqlValue::Time(_) => ValueClass::Temporal,
            SqlValue::List(_) => ValueClass::List,
            SqlValue::Str(_) | SqlValue::Bool(_) | SqlValue::Bytes(_) | SqlValue::Other(_) => {
                ValueClass::Text
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.class() == ValueClass::Numeric
    }

    pub fn is_temporal(&self) -> bool {
        self.class() == ValueClass::Temporal
    }

    /// Temporal value widened to a timestamp (dates at midnight, times on 1970-01-01).
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(ts) => Some(*ts),
            SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
            SqlValue::Time(t) => NaiveDate::from_ymd_opt(1970, 1, 1).map(|d| d.and_time(*t)),
            _ => None,
        }
    }

    /// Compact `yyyyMMddHHmmss` form of a temporal value.
    pub fn compact_timestamp(&self) -> Option<String> {
        self.as_timestamp()
            .map(|ts| ts.format(COMPACT_TIMESTAMP).to_string())
    }

    /// Unquoted text of the value, as used by raw (`fn*`) operators and text binds.
    pub fn to_raw_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Str(s) | SqlValue::Other(s) => s.clone(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Long(v) => v.to_string(),
            SqlValue::BigInt(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Double(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Timestamp(v) => v.format(LITERAL_TIMESTAMP).to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::Byte(v) => v.to_string(),
            SqlValue::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            SqlValue::List(items) => items
                .iter()
                .map(SqlValue::to_raw_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Str(_) => "string",
            SqlValue::Int(_) => "int",
            SqlValue::Long(_) => "long",
            SqlValue::BigInt(_) => "bigint",
            SqlValue::Float(_) => "float",
            SqlValue::Double(_) => "double",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Bool(_) => "bool",
            SqlValue::Byte(_) => "byte",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::List(_) => "list",
            SqlValue::Other(_) => "other",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of any integral variant that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(i64::from(*v)),
            SqlValue::Long(v) => Some(*v),
            SqlValue::BigInt(v) => i64::try_from(*v).ok(),
            SqlValue::Byte(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(f64::from(*v)),
            SqlValue::Double(v) => Some(*v),
            SqlValue::Decimal(d) => d.to_string().parse().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON view used by record exports.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            SqlValue::Null => J::Null,
            SqlValue::Bool(b) => J::Bool(*b),
            SqlValue::Int(v) => J::from(*v),
            SqlValue::Long(v) => J::from(*v),
            SqlValue::Byte(v) => J::from(*v),
            SqlValue::Float(v) => J::from(f64::from(*v)),
            SqlValue::Double(v) => J::from(*v),
            SqlValue::List(items) => J::Array(items.iter().map(SqlValue::to_json).collect()),
            other => J::String(other.to_raw_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw_string())
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    String => Str,
    i32 => Int,
    i64 => Long,
    i128 => BigInt,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    NaiveDateTime => Timestamp,
    NaiveDate => Date,
    NaiveTime => Time,
    bool => Bool,
    i8 => Byte,
    Vec<u8> => Bytes,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Str(v.to_string())
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Str(v.clone())
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int(i32::from(v))
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        SqlValue::Int(i32::from(v))
    }
}

impl From<u16> for SqlValue {
    fn from(v: u16) -> Self {
        SqlValue::Int(i32::from(v))
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Long(i64::from(v))
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => SqlValue::Long(v),
            Err(_) => SqlValue::BigInt(i128::from(v)),
        }
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::from(v as u64)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for SqlValue {
    fn from(v: chrono::DateTime<Tz>) -> Self {
        SqlValue::Timestamp(v.naive_utc())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for SqlValue
where
    T: NotBytes,
{
    fn from(v: Vec<T>) -> Self {
        SqlValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Marker keeping `Vec<u8>` mapped to [`SqlValue::Bytes`] rather than a list.
pub trait NotBytes {}

macro_rules! not_bytes {
    ($($ty:ty),* $(,)?) => { $( impl NotBytes for $ty {} )* };
}

not_bytes!(
    String, &str, i16, i32, i64, i128, u16, u32, u64, f32, f64, bool, i8, Decimal,
    NaiveDateTime, NaiveDate, NaiveTime, SqlValue
);

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => SqlValue::Null,
            J::Bool(b) => SqlValue::Bool(b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Long(i)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::Double(f)
                } else {
                    SqlValue::Other(n.to_string())
                }
            }
            J::String(s) => SqlValue::Str(s),
            other => SqlValue::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(SqlValue::from(1).class(), ValueClass::Numeric);
        assert_eq!(SqlValue::from(1.5f64).class(), ValueClass::Numeric);
        assert_eq!(SqlValue::from("x").class(), ValueClass::Text);
        assert_eq!(SqlValue::from(true).class(), ValueClass::Text);
        assert_eq!(SqlValue::Null.class(), ValueClass::Null);
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(SqlValue::from(d).class(), ValueClass::Temporal);
        assert_eq!(SqlValue::from(vec![1, 2]).class(), ValueClass::List);
    }

    #[test]
    fn option_maps_to_null() {
        let none: Option<i64> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3i64)), SqlValue::Long(3));
    }

    #[test]
    fn bytes_stay_bytes() {
        assert_eq!(SqlValue::from(vec![1u8, 2]), SqlValue::Bytes(vec![1, 2]));
    }

    #[test]
    fn u64_overflow_widens() {
        assert_eq!(SqlValue::from(u64::MAX), SqlValue::BigInt(u64::MAX as i128));
        assert_eq!(SqlValue::from(7u64), SqlValue::Long(7));
    }

    #[test]
    fn compact_timestamp_for_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            SqlValue::from(d).compact_timestamp().as_deref(),
            Some("20240131000000")
        );
        let ts = d.and_hms_opt(23, 59, 58).unwrap();
        assert_eq!(
            SqlValue::from(ts).compact_timestamp().as_deref(),
            Some("20240131235958")
        );
        assert_eq!(SqlValue::from(1).compact_timestamp(), None);
    }

    #[test]
    fn raw_string_of_list() {
        let v = SqlValue::from(vec![1, 2, 3]);
        assert_eq!(v.to_raw_string(), "1,2,3");
    }

    #[test]
    fn json_view() {
        assert_eq!(SqlValue::from(3).to_json(), serde_json::json!(3));
        assert_eq!(SqlValue::Null.to_json(), serde_json::Value::Null);
        assert_eq!(SqlValue::from("a").to_json(), serde_json::json!("a"));
    }
}
