//! Runtime column: one materialized value sequence plus derived statistics

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::column_def::ColumnDef;
use crate::column_type::{ColumnType, ColumnTypeName};
use crate::row::Row;
use crate::value::Value;

/// Statistics derived once from a column's values
#[derive(Debug, Clone)]
struct ColumnStats {
    num_values: usize,
    num_invalid_cells: usize,
    min_value: Option<Value>,
    max_value: Option<Value>,
    uniq_values: Vec<Value>,
}

impl ColumnStats {
    fn compute(values: &[Value]) -> Self {
        let mut num_values = 0;
        let mut min_value: Option<&Value> = None;
        let mut max_value: Option<&Value> = None;
        let mut seen = HashSet::new();
        let mut uniq_values = Vec::new();

        for value in values {
            if !value.is_valid() {
                continue;
            }
            num_values += 1;
            if min_value.map_or(true, |min| value < min) {
                min_value = Some(value);
            }
            if max_value.map_or(true, |max| value > max) {
                max_value = Some(value);
            }
            if seen.insert(value) {
                uniq_values.push(value.clone());
            }
        }

        Self {
            num_values,
            num_invalid_cells: values.len() - num_values,
            min_value: min_value.cloned(),
            max_value: max_value.cloned(),
            uniq_values,
        }
    }
}

/// A named statistic usable by [`crate::CoreTable::reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnReduction {
    /// Smallest valid value
    Min,
    /// Largest valid value
    Max,
    /// Sum of valid numbers
    Sum,
    /// Mean of valid numbers
    Mean,
    /// Count of valid values
    NumValues,
    /// Count of absent or sentinel cells
    NumInvalidCells,
    /// Count of distinct valid values
    NumUniqs,
}

/// A column of a materialized table
///
/// Columns are owned by a single table version and never mutated; a
/// transformed table builds fresh columns.
#[derive(Clone)]
pub struct Column {
    def: ColumnDef,
    column_type: Arc<dyn ColumnType>,
    values: Arc<Vec<Value>>,
    stats: OnceCell<ColumnStats>,
    value_index: OnceCell<HashMap<Value, Vec<usize>>>,
}

impl Column {
    /// Bind a def and its resolved type to a value sequence
    pub fn new(def: ColumnDef, column_type: Arc<dyn ColumnType>, values: Arc<Vec<Value>>) -> Self {
        Self {
            def,
            column_type,
            values,
            stats: OnceCell::new(),
            value_index: OnceCell::new(),
        }
    }

    fn stats(&self) -> &ColumnStats {
        self.stats.get_or_init(|| ColumnStats::compute(&self.values))
    }

    /// Slug of the column
    pub fn slug(&self) -> &str {
        &self.def.slug
    }

    /// Display name, falling back to the slug
    pub fn name(&self) -> &str {
        self.def.display_name()
    }

    /// The definition the column was built from
    pub fn def(&self) -> &ColumnDef {
        &self.def
    }

    /// Declared type name
    pub fn type_name(&self) -> &ColumnTypeName {
        &self.def.column_type
    }

    /// Resolved column type
    pub fn column_type(&self) -> &Arc<dyn ColumnType> {
        &self.column_type
    }

    /// Every cell, sentinels included
    pub fn all_values(&self) -> &[Value] {
        &self.values
    }

    /// Shared handle to every cell
    pub fn shared_values(&self) -> Arc<Vec<Value>> {
        self.values.clone()
    }

    /// Valid cells only, in row order
    pub fn valid_values(&self) -> Vec<Value> {
        self.values.iter().filter(|v| v.is_valid()).cloned().collect()
    }

    /// Row indices holding valid cells
    pub fn valid_row_indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_valid())
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column has no rows
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Count of valid cells
    pub fn num_values(&self) -> usize {
        self.stats().num_values
    }

    /// Count of absent or sentinel cells
    pub fn num_invalid_cells(&self) -> usize {
        self.stats().num_invalid_cells
    }

    /// Smallest valid value
    pub fn min_value(&self) -> Option<&Value> {
        self.stats().min_value.as_ref()
    }

    /// Largest valid value
    pub fn max_value(&self) -> Option<&Value> {
        self.stats().max_value.as_ref()
    }

    /// Distinct valid values in first-appearance order
    pub fn uniq_values(&self) -> &[Value] {
        &self.stats().uniq_values
    }

    /// Count of distinct valid values
    pub fn num_uniqs(&self) -> usize {
        self.stats().uniq_values.len()
    }

    /// True when every row holds the same valid value
    pub fn is_constant(&self) -> bool {
        self.num_uniqs() == 1 && self.num_invalid_cells() == 0
    }

    /// Sum of valid numbers
    pub fn sum(&self) -> f64 {
        self.values.iter().filter_map(Value::as_number).sum()
    }

    /// Mean of valid numbers, `None` when there are none
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        let numbers: Vec<f64> = self.values.iter().filter_map(Value::as_number).collect();
        if numbers.is_empty() {
            return None;
        }
        Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
    }

    /// Whether the column has this value anywhere
    pub fn contains(&self, value: &Value) -> bool {
        self.value_index().contains_key(value)
    }

    /// Map from each distinct value to the rows holding it
    pub fn value_index(&self) -> &HashMap<Value, Vec<usize>> {
        self.value_index.get_or_init(|| {
            let mut index: HashMap<Value, Vec<usize>> = HashMap::new();
            for (i, value) in self.values.iter().enumerate() {
                index.entry(value.clone()).or_default().push(i);
            }
            index
        })
    }

    /// Row indices where the cell equals `value`, ascending
    pub fn indices_where(&self, value: &Value) -> &[usize] {
        self.value_index().get(value).map_or(&[][..], Vec::as_slice)
    }

    /// Render a cell with the column type's formatter
    pub fn format_value(&self, value: &Value) -> String {
        self.column_type.format_value(value)
    }

    /// Render a cell for delimited export
    pub fn format_for_csv(&self, value: &Value) -> String {
        self.column_type.format_for_csv(value)
    }

    /// Whether the column type is numeric
    pub fn is_numeric(&self) -> bool {
        self.column_type.is_numeric()
    }

    /// Evaluate a named statistic as a cell value
    #[allow(clippy::cast_precision_loss)]
    pub fn reduce(&self, reduction: ColumnReduction) -> Value {
        match reduction {
            ColumnReduction::Min => self.min_value().cloned().unwrap_or_default(),
            ColumnReduction::Max => self.max_value().cloned().unwrap_or_default(),
            ColumnReduction::Sum => Value::Number(self.sum()),
            ColumnReduction::Mean => self.mean().into(),
            ColumnReduction::NumValues => Value::Number(self.num_values() as f64),
            ColumnReduction::NumInvalidCells => Value::Number(self.num_invalid_cells() as f64),
            ColumnReduction::NumUniqs => Value::Number(self.num_uniqs() as f64),
        }
    }

    /// Summary row used in diagnostics
    pub fn explain(&self) -> ColumnExplanation {
        ColumnExplanation {
            slug: self.slug().to_string(),
            column_type: self.type_name().to_string(),
            name: self.name().to_string(),
            num_values: self.num_values(),
            num_invalid_cells: self.num_invalid_cells(),
            color: self.def.color.clone(),
        }
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("slug", &self.def.slug)
            .field("type", &self.def.column_type)
            .field("rows", &self.values.len())
            .finish()
    }
}

/// Per-column diagnostic summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnExplanation {
    /// Column slug
    pub slug: String,
    /// Declared type
    #[serde(rename = "type")]
    pub column_type: String,
    /// Display name
    pub name: String,
    /// Valid cells
    pub num_values: usize,
    /// Absent or sentinel cells
    pub num_invalid_cells: usize,
    /// Color hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ColumnExplanation {
    /// Flatten into a row for printing
    pub fn to_row(&self) -> Row {
        Row::new()
            .with("slug", self.slug.as_str())
            .with("type", self.column_type.as_str())
            .with("name", self.name.as_str())
            .with("numValues", self.num_values)
            .with("numInvalidCells", self.num_invalid_cells)
            .with("color", self.color.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_type::ColumnTypeRegistry;
    use crate::value::ErrorValue;

    fn column(values: Vec<Value>) -> Column {
        let def = ColumnDef::new("v", ColumnTypeName::Numeric);
        let column_type = ColumnTypeRegistry::builtin().get(&def.column_type);
        Column::new(def, column_type, Arc::new(values))
    }

    #[test]
    fn test_stats_skip_sentinels() {
        let col = column(vec![
            Value::Number(3.0),
            Value::Invalid(ErrorValue::NaNButShouldBeNumber),
            Value::Number(1.0),
            Value::Empty,
            Value::Number(3.0),
        ]);
        assert_eq!(col.num_values(), 3);
        assert_eq!(col.num_invalid_cells(), 2);
        assert_eq!(col.min_value(), Some(&Value::Number(1.0)));
        assert_eq!(col.max_value(), Some(&Value::Number(3.0)));
        assert_eq!(col.uniq_values(), &[Value::Number(3.0), Value::Number(1.0)]);
        assert_eq!(col.sum(), 7.0);
        assert_eq!(col.valid_row_indices(), vec![0, 2, 4]);
        assert!(!col.is_constant());
    }

    #[test]
    fn test_constant_column() {
        assert!(column(vec![Value::Number(2.0), Value::Number(2.0)]).is_constant());
        assert!(!column(vec![Value::Number(2.0), Value::Empty]).is_constant());
        assert!(!column(Vec::new()).is_constant());
    }

    #[test]
    fn test_indices_where() {
        let col = column(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(1.0)]);
        assert_eq!(col.indices_where(&Value::Number(1.0)), &[0, 2]);
        assert!(col.indices_where(&Value::Number(5.0)).is_empty());
        assert!(col.contains(&Value::Number(2.0)));
    }

    #[test]
    fn test_reductions() {
        let col = column(vec![Value::Number(1.0), Value::Number(4.0), Value::Empty]);
        assert_eq!(col.reduce(ColumnReduction::Max), Value::Number(4.0));
        assert_eq!(col.reduce(ColumnReduction::Mean), Value::Number(2.5));
        assert_eq!(col.reduce(ColumnReduction::NumInvalidCells), Value::Number(1.0));
        assert_eq!(column(Vec::new()).reduce(ColumnReduction::Mean), Value::Empty);
    }
}
