//! Materialized result sets.
//!
//! A [`RecordSet`] is built eagerly: column names are read once from the
//! cursor metadata and every row is drained into memory with the coercion
//! table of [`ColumnKind`] applied. NULL cells are `None`.

use crate::error::{DbError, DbResult};
use crate::value::SqlValue;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Default cap for binary cells (1 MiB).
pub const DEFAULT_MAX_BLOB_BYTES: usize = 1024 * 1024;

/// Coercion class of a result column.
///
/// | kind        | produced variant          |
/// |-------------|---------------------------|
/// | `Char`      | `SqlValue::Str`           |
/// | `Binary`    | `SqlValue::Bytes` (capped)|
/// | `SmallInt`  | `SqlValue::Int`           |
/// | `BigInt`    | `SqlValue::Long`          |
/// | `Float`     | `SqlValue::Float`         |
/// | `Double`    | `SqlValue::Double`        |
/// | `Decimal`   | `SqlValue::Decimal`       |
/// | `Bool`      | `SqlValue::Bool`          |
/// | `Temporal`  | `SqlValue::Timestamp`     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Char,
    Binary,
    SmallInt,
    BigInt,
    Float,
    Double,
    Decimal,
    Bool,
    Temporal,
    /// A type outside the table; the backend decodes it as text if it can.
    Unsupported(String),
}

/// Truncate a binary cell to `max` bytes.
pub(crate) fn cap_blob(mut bytes: Vec<u8>, max: usize) -> Vec<u8> {
    if bytes.len() > max {
        tracing::debug!(len = bytes.len(), max, "truncating binary cell");
        bytes.truncate(max);
    }
    bytes
}

/// Trait for converting a materialized row into a Rust struct.
///
/// # Example
///
/// ```ignore
/// use fluentsql::{DbResult, FromRecord, RecordRow};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRecord for User {
///     fn from_record(row: &RecordRow) -> DbResult<Self> {
///         Ok(User {
///             id: row.require_i64("id")?,
///             name: row.require_str("name")?.to_string(),
///         })
///     }
/// }
/// ```
pub trait FromRecord: Sized {
    fn from_record(row: &RecordRow) -> DbResult<Self>;
}

/// One materialized row: an ordered column-name → nullable value map.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    columns: Arc<[String]>,
    values: Vec<Option<SqlValue>>,
}

impl RecordRow {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Option<SqlValue>>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index_of(&self, column: &str) -> DbResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DbError::decode(column, "no such column"))
    }

    /// Cell by position; `None` for SQL NULL or an out-of-range index.
    pub fn value_at(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Cell by column name; `Ok(None)` for SQL NULL.
    pub fn get(&self, column: &str) -> DbResult<Option<&SqlValue>> {
        let idx = self.index_of(column)?;
        Ok(self.values.get(idx).and_then(Option::as_ref))
    }

    /// Whether the named cell is SQL NULL (a missing column counts as NULL).
    pub fn is_null(&self, column: &str) -> bool {
        !matches!(self.get(column), Ok(Some(_)))
    }

    fn typed<'a, T>(
        &'a self,
        column: &str,
        expected: &str,
        f: impl FnOnce(&'a SqlValue) -> Option<T>,
    ) -> DbResult<Option<T>> {
        match self.get(column)? {
            None => Ok(None),
            Some(v) => f(v).map(Some).ok_or_else(|| {
                DbError::decode(column, format!("expected {expected}, got {}", v.type_name()))
            }),
        }
    }

    pub fn get_str(&self, column: &str) -> DbResult<Option<&str>> {
        self.typed(column, "string", |v| match v {
            SqlValue::Str(s) | SqlValue::Other(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn get_i32(&self, column: &str) -> DbResult<Option<i32>> {
        self.typed(column, "int", |v| v.as_i64().and_then(|n| i32::try_from(n).ok()))
    }

    pub fn get_i64(&self, column: &str) -> DbResult<Option<i64>> {
        self.typed(column, "integer", SqlValue::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> DbResult<Option<f64>> {
        self.typed(column, "number", SqlValue::as_f64)
    }

    pub fn get_decimal(&self, column: &str) -> DbResult<Option<Decimal>> {
        self.typed(column, "decimal", |v| match v {
            SqlValue::Decimal(d) => Some(*d),
            other => other.as_i64().map(Decimal::from),
        })
    }

    /// Booleans, plus 0/1 integers as stored by MySQL `TINYINT(1)`.
    pub fn get_bool(&self, column: &str) -> DbResult<Option<bool>> {
        self.typed(column, "bool", |v| match v {
            SqlValue::Bool(b) => Some(*b),
            other => other.as_i64().map(|n| n != 0),
        })
    }

    pub fn get_timestamp(&self, column: &str) -> DbResult<Option<NaiveDateTime>> {
        self.typed(column, "timestamp", SqlValue::as_timestamp)
    }

    pub fn get_bytes(&self, column: &str) -> DbResult<Option<&[u8]>> {
        self.typed(column, "bytes", |v| match v {
            SqlValue::Bytes(b) => Some(b.as_slice()),
            SqlValue::Str(s) => Some(s.as_bytes()),
            _ => None,
        })
    }

    /// Like [`RecordRow::get_str`] but NULL is an error.
    pub fn require_str(&self, column: &str) -> DbResult<&str> {
        self.get_str(column)?
            .ok_or_else(|| DbError::decode(column, "unexpected NULL"))
    }

    /// Like [`RecordRow::get_i64`] but NULL is an error.
    pub fn require_i64(&self, column: &str) -> DbResult<i64> {
        self.get_i64(column)?
            .ok_or_else(|| DbError::decode(column, "unexpected NULL"))
    }

    /// Iterate `(column, cell)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&SqlValue>)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_ref))
    }

    /// JSON object view of the row.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(c, v)| {
                let json = v.map_or(serde_json::Value::Null, SqlValue::to_json);
                (c.to_string(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Eagerly materialized rows with a stateful cursor.
///
/// The cursor starts before the first row (`current_index() == -1`) and never
/// leaves `[-1, size())`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    columns: Arc<[String]>,
    rows: Vec<RecordRow>,
    cursor: isize,
    total: Option<u64>,
}

impl Default for RecordSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl RecordSet {
    /// Build a set from column names and row cells.
    ///
    /// Rows shorter than the column list are padded with NULL.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<SqlValue>>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut cells| {
                cells.resize(width, None);
                RecordRow::new(Arc::clone(&columns), cells)
            })
            .collect();
        Self {
            columns,
            rows,
            cursor: -1,
            total: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of materialized rows.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Advance the cursor. Returns `false`, without moving, past the last row.
    pub fn next(&mut self) -> bool {
        if self.cursor + 1 < self.rows.len() as isize {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Move the cursor back. Returns `false`, without moving, at the first row
    /// or before it.
    pub fn prev(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    /// Put the cursor back before the first row.
    pub fn reset(&mut self) {
        self.cursor = -1;
    }

    pub fn current_index(&self) -> isize {
        self.cursor
    }

    /// Row under the cursor.
    pub fn current(&self) -> Option<&RecordRow> {
        usize::try_from(self.cursor)
            .ok()
            .and_then(|i| self.rows.get(i))
    }

    pub fn get(&self, index: usize) -> Option<&RecordRow> {
        self.rows.get(index)
    }

    pub fn first(&self) -> Option<&RecordRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&RecordRow> {
        self.rows.last()
    }

    pub fn rows(&self) -> &[RecordRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RecordRow> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordRow> {
        self.rows.iter()
    }

    /// Total row count of the underlying query, independent of `size()`.
    ///
    /// Falls back to `size()` when no total has been set.
    pub fn total(&self) -> u64 {
        self.total.unwrap_or(self.rows.len() as u64)
    }

    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    /// Map every row through [`FromRecord`].
    pub fn map_rows<T: FromRecord>(&self) -> DbResult<Vec<T>> {
        self.rows.iter().map(T::from_record).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.rows.iter().map(RecordRow::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a RecordRow;
    type IntoIter = std::slice::Iter<'a, RecordRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> RecordSet {
        RecordSet::new(
            vec!["id".into(), "name".into(), "score".into()],
            vec![
                vec![Some(SqlValue::Long(1)), Some("a".into()), None],
                vec![Some(SqlValue::Long(2)), Some("b".into()), Some(SqlValue::Double(1.5))],
                vec![Some(SqlValue::Long(3)), None, Some(SqlValue::Double(2.0))],
            ],
        )
    }

    #[test]
    fn empty_set() {
        let mut rs = RecordSet::empty();
        assert_eq!(rs.size(), 0);
        assert!(rs.is_empty());
        assert!(!rs.next());
        assert_eq!(rs.current_index(), -1);
        assert!(rs.current().is_none());
        assert!(rs.first().is_none());
    }

    #[test]
    fn cursor_stays_in_range() {
        let mut rs = sample();
        assert!(!rs.prev());
        assert_eq!(rs.current_index(), -1);
        assert!(rs.next());
        assert!(rs.next());
        assert!(rs.next());
        assert_eq!(rs.current_index(), 2);
        for _ in 0..3 {
            assert!(!rs.next());
            assert_eq!(rs.current_index(), 2);
        }
        assert!(rs.prev());
        assert!(rs.prev());
        assert!(!rs.prev());
        assert_eq!(rs.current_index(), 0);
        rs.reset();
        assert_eq!(rs.current_index(), -1);
    }

    #[test]
    fn current_row_follows_cursor() {
        let mut rs = sample();
        rs.next();
        rs.next();
        let row = rs.current().unwrap();
        assert_eq!(row.get_i64("id").unwrap(), Some(2));
        assert_eq!(row.get_str("name").unwrap(), Some("b"));
    }

    #[test]
    fn null_cells_are_none() {
        let rs = sample();
        let row = rs.first().unwrap();
        assert!(row.is_null("score"));
        assert_eq!(row.get_f64("score").unwrap(), None);
        assert!(row.get("missing").is_err());
    }

    #[test]
    fn typed_getter_mismatch_is_decode_error() {
        let rs = sample();
        let err = rs.first().unwrap().get_timestamp("name").unwrap_err();
        assert!(matches!(err, DbError::Decode { .. }));
    }

    #[test]
    fn total_is_independent_of_size() {
        let mut rs = sample();
        assert_eq!(rs.total(), 3);
        rs.set_total(Some(120));
        assert_eq!(rs.total(), 120);
        assert_eq!(rs.size(), 3);
    }

    #[test]
    fn json_export() {
        let rs = sample();
        assert_eq!(
            rs.get(1).unwrap().to_json(),
            serde_json::json!({"id": 2, "name": "b", "score": 1.5})
        );
        assert_eq!(rs.to_json().as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn bool_and_timestamp_getters() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let rs = RecordSet::new(
            vec!["flag".into(), "at".into()],
            vec![vec![Some(SqlValue::Int(1)), Some(SqlValue::Timestamp(ts))]],
        );
        let row = rs.first().unwrap();
        assert_eq!(row.get_bool("flag").unwrap(), Some(true));
        assert_eq!(row.get_timestamp("at").unwrap(), Some(ts));
    }

    #[test]
    fn blob_cap_truncates() {
        assert_eq!(cap_blob(vec![1, 2, 3, 4], 2), vec![1, 2]);
        assert_eq!(cap_blob(vec![1], 2), vec![1]);
    }

    struct Named {
        id: i64,
        name: Option<String>,
    }

    impl FromRecord for Named {
        fn from_record(row: &RecordRow) -> DbResult<Self> {
            Ok(Named {
                id: row.require_i64("id")?,
                name: row.get_str("name")?.map(str::to_string),
            })
        }
    }

    #[test]
    fn map_rows_through_from_record() {
        let named: Vec<Named> = sample().map_rows().unwrap();
        assert_eq!(named.len(), 3);
        assert_eq!(named[2].id, 3);
        assert!(named[2].name.is_none());
    }
}
