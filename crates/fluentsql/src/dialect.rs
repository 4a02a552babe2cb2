//! SQL dialects.
//!
//! The builders render the same logical statement differently per server:
//! placeholder tokens, string escaping, the temporal comparison wrapper and
//! LIMIT/OFFSET syntax all live here.

use crate::value::SqlValue;
use serde::{Deserialize, Serialize};

/// SQL flavour used when rendering statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL / MariaDB: `?` placeholders, backslash escapes, `LIMIT offset,count`.
    #[default]
    MySql,
    /// PostgreSQL: `$n` placeholders, doubled quotes, `LIMIT count OFFSET offset`.
    Postgres,
}

impl Dialect {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "MySQL",
            Dialect::Postgres => "PostgreSQL",
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// Escape the body of a single-quoted string literal.
    pub fn escape_string(self, value: &str) -> String {
        match self {
            Dialect::MySql => {
                let mut out = String::with_capacity(value.len() + 2);
                for c in value.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '\0' => out.push_str("\\0"),
                        c => out.push(c),
                    }
                }
                out
            }
            Dialect::Postgres => value.replace('\'', "''"),
        }
    }

    /// Single-quoted, escaped string literal.
    pub fn quote(self, value: &str) -> String {
        format!("'{}'", self.escape_string(value))
    }

    /// Column expression used when comparing against a compact `yyyyMMddHHmmss` literal.
    pub fn temporal_column(self, column: &str) -> String {
        match self {
            Dialect::MySql => format!("DATE_FORMAT({column},'%Y%m%d%H%i%s')"),
            Dialect::Postgres => format!("to_char({column},'YYYYMMDDHH24MISS')"),
        }
    }

    /// LIMIT/OFFSET tail, including the leading space. Empty when neither is set.
    pub fn limit_offset(self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (self, limit, offset) {
            (_, None, None) => String::new(),
            (Dialect::MySql, Some(limit), Some(offset)) => format!(" LIMIT {offset},{limit}"),
            (Dialect::MySql, Some(limit), None) => format!(" LIMIT {limit}"),
            // MySQL has no bare OFFSET; the documented idiom is the max row count.
            (Dialect::MySql, None, Some(offset)) => {
                format!(" LIMIT {offset},18446744073709551615")
            }
            (Dialect::Postgres, limit, offset) => {
                let mut out = String::new();
                if let Some(limit) = limit {
                    out.push_str(&format!(" LIMIT {limit}"));
                }
                if let Some(offset) = offset {
                    out.push_str(&format!(" OFFSET {offset}"));
                }
                out
            }
        }
    }

    pub fn boolean_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::MySql, true) => "1",
            (Dialect::MySql, false) => "0",
            (Dialect::Postgres, true) => "TRUE",
            (Dialect::Postgres, false) => "FALSE",
        }
    }

    /// Statement returning the id generated by the last insert on this connection.
    pub fn last_insert_id_sql(self) -> &'static str {
        match self {
            Dialect::MySql => "SELECT LAST_INSERT_ID()",
            Dialect::Postgres => "SELECT lastval()",
        }
    }

    /// Render a value as an inline SQL literal.
    ///
    /// Numbers are unquoted, temporal values and text are quoted and escaped,
    /// binary data is written as a hex literal and lists as `(a,b,c)`.
    pub fn literal(self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Int(_)
            | SqlValue::Long(_)
            | SqlValue::BigInt(_)
            | SqlValue::Decimal(_)
            | SqlValue::Byte(_) => value.to_raw_string(),
            SqlValue::Float(v) if v.is_finite() => value.to_raw_string(),
            SqlValue::Double(v) if v.is_finite() => value.to_raw_string(),
            SqlValue::Float(_) | SqlValue::Double(_) => self.quote(&value.to_raw_string()),
            SqlValue::Bool(b) => self.boolean_literal(*b).to_string(),
            SqlValue::Bytes(bytes) => self.hex_literal(bytes),
            SqlValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| self.literal(v)).collect();
                format!("({})", parts.join(","))
            }
            SqlValue::Str(_)
            | SqlValue::Other(_)
            | SqlValue::Timestamp(_)
            | SqlValue::Date(_)
            | SqlValue::Time(_) => self.quote(&value.to_raw_string()),
        }
    }

    fn hex_literal(self, bytes: &[u8]) -> String {
        let mut hex = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            hex.push_str(&format!("{b:02X}"));
        }
        match self {
            Dialect::MySql => format!("X'{hex}'"),
            Dialect::Postgres => format!("'\\x{hex}'::bytea"),
        }
    }
}

/// Escape quotes and backslashes in a string bound through the injection filter.
pub fn escape_injection(value: &str) -> String {
    Dialect::MySql.escape_string(value)
}
