//! Immutable, column-oriented tables with transformation lineage
//!
//! A [`CoreTable`] is built from delimited text, rows or a column store and
//! a list of [`ColumnDef`]s. Every transform (filter, sort, join, concat,
//! interpolation and so on) returns a new table that remembers its parent,
//! so a pipeline can be explained step by step. Column values are parsed
//! and computed lazily on first access and cached for the table's lifetime.
//!
//! Problems in the data never fail an operation. They show up as
//! [`ErrorValue`] sentinels in the affected cells. Only asking for a
//! column that does not exist is an error.

#![warn(missing_docs)]

pub mod column;
pub mod column_def;
pub mod column_store;
pub mod column_type;
pub mod delimited;
pub mod diagnostics;
pub mod error;
pub mod filter_mask;
pub mod interpolation;
pub mod join;
pub mod printers;
pub mod row;
pub mod table;
pub mod transform;
pub mod value;

// Re-export key types for convenience
pub use column::{Column, ColumnExplanation, ColumnReduction};
pub use column_def::{ColumnDef, ColumnGenerator, ColumnSlug};
pub use column_store::{ColumnStore, SortOrder};
pub use column_type::{ColumnType, ColumnTypeName, ColumnTypeRegistry};
pub use delimited::{DelimitedOptions, Matrix};
pub use diagnostics::{IdGenerator, RandomIds, SequentialIds, TableExplanation, TransformType};
pub use error::{Error, Result};
pub use filter_mask::FilterMask;
pub use interpolation::{Interpolation, LinearInterpolation, ToleranceInterpolation};
pub use join::Reduction;
pub use printers::AlignedTextTableOptions;
pub use row::Row;
pub use table::{CoreTable, RowConversion, TableInput, TableOptions};
pub use value::{ErrorValue, Time, Value};
