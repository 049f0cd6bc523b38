//! Row-major view of a single table row

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::value::Value;

/// One row keyed by column slug, in column order
///
/// Rows are derived on demand from a column store; they are never the
/// table's storage format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Create an empty row with room for `capacity` cells
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, slug: &str, value: impl Into<Value>) -> Self {
        self.insert(slug, value.into());
        self
    }

    /// Get the value for a slug
    pub fn get(&self, slug: &str) -> Option<&Value> {
        self.cells.iter().find(|(s, _)| s == slug).map(|(_, v)| v)
    }

    /// Get the value for a slug, or `Empty` when the row lacks it
    pub fn value(&self, slug: &str) -> Value {
        self.get(slug).cloned().unwrap_or(Value::Empty)
    }

    /// Insert or overwrite a cell; new slugs are appended
    pub fn insert(&mut self, slug: &str, value: Value) {
        if let Some(cell) = self.cells.iter_mut().find(|(s, _)| s == slug) {
            cell.1 = value;
        } else {
            self.cells.push((slug.to_string(), value));
        }
    }

    /// Append a cell whose slug the row does not hold yet
    pub(crate) fn push_unique(&mut self, slug: &str, value: Value) {
        debug_assert!(self.get(slug).is_none(), "duplicate slug {slug}");
        self.cells.push((slug.to_string(), value));
    }

    /// Remove a cell, returning its value
    pub fn remove(&mut self, slug: &str) -> Option<Value> {
        let position = self.cells.iter().position(|(s, _)| s == slug)?;
        Some(self.cells.remove(position).1)
    }

    /// Whether the row has a cell for this slug
    pub fn contains(&self, slug: &str) -> bool {
        self.cells.iter().any(|(s, _)| s == slug)
    }

    /// Slugs in row order
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(s, _)| s.as_str())
    }

    /// Values in row order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().map(|(_, v)| v)
    }

    /// Cells in row order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(s, v)| (s.as_str(), v))
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (slug, value) in iter {
            row.insert(&slug.into(), value.into());
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (slug, value) in &self.cells {
            map.serialize_entry(slug, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order_and_overwrites() {
        let mut row = Row::new().with("b", 1.0).with("a", "x");
        row.insert("b", Value::Number(2.0));

        assert_eq!(row.slugs().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(&Value::Number(2.0)));
        assert_eq!(row.value("missing"), Value::Empty);
    }

    #[test]
    fn test_serializes_as_object() {
        let row = Row::new().with("country", "France").with("pop", 67.0);
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"country":"France","pop":67.0}"#
        );
    }
}
