//! Ordered parameter storage for prepared statements.

use crate::value::SqlValue;

/// Ordered values bound 1:1 to the placeholders a builder emitted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamList {
    params: Vec<SqlValue>,
}

impl ParamList {
    /// Create a new empty parameter list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter and return its 1-based index.
    pub fn push(&mut self, value: impl Into<SqlValue>) -> usize {
        self.params.push(value.into());
        self.params.len()
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameter at a 0-based position.
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.params.get(index)
    }

    /// All parameters in binding order.
    pub fn values(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.params
    }

    /// Extend this list with another list's parameters.
    pub fn extend(&mut self, other: &ParamList) {
        self.params.extend(other.params.iter().cloned());
    }

    /// Clear all parameters.
    pub fn clear(&mut self) {
        self.params.clear();
    }
}

impl From<Vec<SqlValue>> for ParamList {
    fn from(params: Vec<SqlValue>) -> Self {
        Self { params }
    }
}

impl FromIterator<SqlValue> for ParamList {
    fn from_iter<I: IntoIterator<Item = SqlValue>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Insertion-ordered column → value record.
///
/// Setting a column that is already present replaces its value in place, so
/// the column order (and therefore the placeholder order) is that of first
/// insertion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnValues {
    entries: Vec<(String, SqlValue)>,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column`, replacing an existing entry in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<C: Into<String>, V: Into<SqlValue>> FromIterator<(C, V)> for ColumnValues {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut out = ColumnValues::new();
        for (c, v) in iter {
            out.set(c, v);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_one_based_index() {
        let mut params = ParamList::new();
        assert_eq!(params.push(1), 1);
        assert_eq!(params.push("x"), 2);
        assert_eq!(params.len(), 2);
        assert_eq!(params.values(), &[SqlValue::Int(1), SqlValue::from("x")]);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut cols = ColumnValues::new();
        cols.set("a", 1);
        cols.set("b", 2);
        cols.set("a", 3);
        assert_eq!(cols.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(cols.get("a"), Some(&SqlValue::Int(3)));
    }
}
