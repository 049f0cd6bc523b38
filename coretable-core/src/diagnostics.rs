//! Lineage labels, diagnostic ids and pipeline explanations

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::row::Row;
use crate::value::Value;

/// How a table was derived from its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransformType {
    /// Root table built from raw input
    #[default]
    Load,
    /// Rows kept by a predicate or index set
    FilterRows,
    /// Columns kept or dropped
    FilterColumns,
    /// Rows reordered
    SortRows,
    /// Columns reordered
    SortColumns,
    /// Rows added
    AppendRows,
    /// Columns added
    AppendColumns,
    /// Cell values replaced
    UpdateRows,
    /// Column definitions changed
    UpdateColumnDefs,
    /// Column slugs changed
    RenameColumns,
    /// Tables stacked row-wise
    Concat,
    /// Rows and columns pivoted
    Transpose,
    /// Collapsed to one row
    Reduce,
    /// Complement of the parent's row filter
    InverseFilterRows,
    /// Complement of the parent's column filter
    InverseFilterColumns,
    /// Rows replaced wholesale from a grid
    Reload,
}

impl TransformType {
    /// Whether computed columns are evaluated for tables of this category
    ///
    /// Filters and sorts never change what a formula produces, so only the
    /// categories that introduce rows or columns evaluate generators.
    pub fn requires_compute(self) -> bool {
        matches!(
            self,
            TransformType::Load | TransformType::AppendRows | TransformType::AppendColumns | TransformType::UpdateRows
        )
    }
}

impl fmt::Display for TransformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Source of diagnostic ids for tables
///
/// Injected through [`crate::TableOptions`]; child tables share their
/// parent's generator.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Produce a fresh id
    fn next_id(&self) -> String;
}

/// Ids `1`, `2`, `3`, ... per generator instance
#[derive(Debug, Default)]
pub struct SequentialIds {
    last: AtomicU64,
}

impl SequentialIds {
    /// Start counting from one
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        (self.last.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// One line of a lineage dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExplanation {
    /// Human readable label, cut to 30 characters
    pub table_description: String,
    /// Transform category
    pub transform_category: TransformType,
    /// Diagnostic id
    pub id: String,
    /// Parent's diagnostic id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Number of columns
    pub num_columns: usize,
    /// Number of rows
    pub num_rows: usize,
    /// Microseconds spent constructing the table
    pub time_to_load_micros: u128,
    /// Columns parsed during materialization
    pub num_cols_to_parse: usize,
    /// Columns computed during materialization
    pub num_cols_to_compute: usize,
    /// Valid cells across all columns
    pub num_valid_cells: usize,
    /// Absent or sentinel cells across all columns
    pub num_invalid_cells: usize,
    /// Columns with at least one invalid cell
    pub num_columns_with_invalid_cells: usize,
}

impl TableExplanation {
    /// Flatten into a row for printing
    #[allow(clippy::cast_precision_loss)]
    pub fn to_row(&self) -> Row {
        Row::new()
            .with("tableDescription", self.table_description.as_str())
            .with("transformCategory", self.transform_category.to_string())
            .with("id", self.id.as_str())
            .with("parentId", self.parent_id.clone())
            .with("numColumns", self.num_columns)
            .with("numRows", self.num_rows)
            .with("timeToLoadMicros", Value::Number(self.time_to_load_micros as f64))
            .with("numColsToParse", self.num_cols_to_parse)
            .with("numColsToCompute", self.num_cols_to_compute)
            .with("numValidCells", self.num_valid_cells)
            .with("numInvalidCells", self.num_invalid_cells)
            .with("numColumnsWithInvalidCells", self.num_columns_with_invalid_cells)
    }
}
