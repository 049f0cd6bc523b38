//! Transforms that combine or reshape whole tables

use std::collections::HashSet;
use std::fmt;

use crate::column::{Column, ColumnReduction};
use crate::column_def::{ColumnDef, ColumnSlug};
use crate::column_store::{concat_column_stores, row_key, ColumnStore};
use crate::column_type::ColumnTypeName;
use crate::diagnostics::TransformType;
use crate::error::{Error, Result};
use crate::filter_mask::FilterMask;
use crate::row::Row;
use crate::table::{dedupe_defs, CoreTable};
use crate::value::{ErrorValue, Value};

/// How [`CoreTable::reduce`] collapses one column
pub enum Reduction {
    /// A named column statistic
    Stat(ColumnReduction),
    /// A caller-supplied reducer
    Custom(Box<dyn Fn(&Column) -> Value + Send + Sync>),
}

impl Reduction {
    /// Wrap a reducer closure
    pub fn custom(reducer: impl Fn(&Column) -> Value + Send + Sync + 'static) -> Self {
        Reduction::Custom(Box::new(reducer))
    }

    fn apply(&self, column: &Column) -> Value {
        match self {
            Reduction::Stat(stat) => column.reduce(*stat),
            Reduction::Custom(reducer) => reducer(column),
        }
    }
}

impl From<ColumnReduction> for Reduction {
    fn from(stat: ColumnReduction) -> Self {
        Reduction::Stat(stat)
    }
}

impl fmt::Debug for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Stat(stat) => f.debug_tuple("Stat").field(stat).finish(),
            Reduction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Columns borrowed from a join source, one value per destination row
struct JoinedColumns {
    defs: Vec<ColumnDef>,
    unmatched_rows: Vec<usize>,
}

/// Look up every row of `destination` in `source` by the `by` key
///
/// Only the first matching source row is used. Key columns missing from
/// either table leave every row unmatched.
fn join_columns(destination: &CoreTable, source: &CoreTable, by: Option<&[&str]>) -> JoinedColumns {
    let by: Vec<ColumnSlug> = match by {
        Some(slugs) => slugs.iter().map(|slug| (*slug).to_string()).collect(),
        None => source
            .column_slugs()
            .iter()
            .filter(|slug| destination.has(slug))
            .cloned()
            .collect(),
    };
    let source_defs: Vec<&ColumnDef> = source
        .defs()
        .iter()
        .filter(|def| !destination.has(&def.slug))
        .collect();

    let source_index = source.key_index(&by);
    let key_columns_present = by.iter().all(|slug| destination.has(slug));
    let destination_store = destination.column_store();
    let source_store = source.column_store();

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(destination.num_rows()); source_defs.len()];
    let mut unmatched_rows = Vec::new();
    for row_index in 0..destination.num_rows() {
        let matched = if key_columns_present {
            source_index
                .get(&row_key(destination_store, &by, row_index))
                .and_then(|rows| rows.first().copied())
        } else {
            None
        };
        if matched.is_none() {
            unmatched_rows.push(row_index);
        }
        for (values, def) in columns.iter_mut().zip(&source_defs) {
            values.push(match matched {
                Some(source_row) => source_store.cell(&def.slug, source_row),
                None => Value::Invalid(ErrorValue::NoMatchingValueAfterJoin),
            });
        }
    }

    let defs = source_defs
        .into_iter()
        .zip(columns)
        .map(|(def, values)| ColumnDef {
            generator: None,
            values: Some(values),
            ..def.clone()
        })
        .collect();
    JoinedColumns { defs, unmatched_rows }
}

impl CoreTable {
    /// Stack `self` followed by `tables` row-wise
    ///
    /// The result has every slug of every table in first-appearance order.
    /// When several tables define the same slug the last def wins; rows
    /// from a table lacking a column hold
    /// [`ErrorValue::MissingValuePlaceholder`].
    pub fn concat(&self, tables: &[CoreTable], description: Option<&str>) -> CoreTable {
        self.stack(tables, description.unwrap_or("Combined tables"), TransformType::Concat)
    }

    pub(crate) fn stack(&self, tables: &[CoreTable], description: &str, category: TransformType) -> CoreTable {
        let all: Vec<&CoreTable> = std::iter::once(self).chain(tables).collect();
        let stores: Vec<&ColumnStore> = all.iter().map(|table| table.column_store()).collect();
        let defs = dedupe_defs(all.iter().flat_map(|table| table.defs().iter().cloned()).collect());
        self.derive(concat_column_stores(&stores, None), defs, description, category, None)
    }

    /// Add the columns of `right` that `self` lacks, matched on `by`
    ///
    /// `by` defaults to the slugs both tables share. Every row of `self` is
    /// kept; rows without a match get
    /// [`ErrorValue::NoMatchingValueAfterJoin`] in the new columns. When
    /// several rows of `right` match, the first one is used.
    pub fn left_join(&self, right: &CoreTable, by: Option<&[&str]>) -> CoreTable {
        self.append_columns(join_columns(self, right, by).defs)
    }

    /// `right.left_join(self)`
    pub fn right_join(&self, right: &CoreTable, by: Option<&[&str]>) -> CoreTable {
        right.left_join(self, by)
    }

    /// Left join that drops rows without a match
    pub fn inner_join(&self, right: &CoreTable, by: Option<&[&str]>) -> CoreTable {
        let joined = join_columns(self, right, by);
        self.append_columns(joined.defs).drop_rows_at(&joined.unmatched_rows, None)
    }

    /// Both one-sided joins stacked, with exact duplicate rows removed
    pub fn full_join(&self, right: &CoreTable, by: Option<&[&str]>) -> CoreTable {
        self.left_join(right, by)
            .concat(&[right.left_join(self, by)], None)
            .drop_duplicate_rows()
    }

    /// One filtered table per distinct value of `slug`, in first-appearance order
    pub fn group_by(&self, slug: &str) -> Result<Vec<CoreTable>> {
        let num_rows = self.num_rows();
        Ok(self
            .index_by(slug)?
            .into_iter()
            .map(|(value, rows)| {
                self.derive(
                    self.column_store().clone(),
                    self.defs().to_vec(),
                    format!("Rows for group {value}"),
                    TransformType::FilterRows,
                    Some(FilterMask::from_indices(num_rows, &rows, true)),
                )
            })
            .collect())
    }

    /// Collapse to a single row
    ///
    /// Starts from the last row and overwrites each listed column with its
    /// reduction. Columns not listed keep their last value.
    pub fn reduce(&self, reductions: &[(&str, Reduction)]) -> Result<CoreTable> {
        let mut row = self
            .last_row()
            .unwrap_or_else(|| self.column_slugs().iter().map(|slug| (slug.as_str(), Value::Empty)).collect());
        for (slug, reduction) in reductions {
            let column = self.get_column(slug)?;
            row.insert(slug, reduction.apply(column));
        }
        Ok(self.derive(vec![row], self.defs().to_vec(), "Reduced table", TransformType::Reduce, None))
    }

    /// Pivot so each row's `by` value becomes a column
    ///
    /// Every other column becomes one row whose `by` cell is the old slug.
    /// New columns are typed `column_type`; `by` becomes a text column.
    /// Fails when two rows of `by` (or a row and `by` itself) render to the
    /// same slug.
    pub fn transpose(&self, by: &str, column_type: ColumnTypeName) -> Result<CoreTable> {
        let header: Vec<ColumnSlug> = std::iter::once(by.to_string())
            .chain(self.get_column(by)?.all_values().iter().map(ToString::to_string))
            .collect();

        let mut seen = HashSet::new();
        if let Some(duplicate) = header.iter().find(|slug| !seen.insert(slug.as_str())) {
            return Err(Error::InvalidArgument(format!(
                "cannot transpose by '{by}': column '{duplicate}' would appear twice"
            )));
        }
        let defs: Vec<ColumnDef> = header
            .iter()
            .map(|slug| {
                if slug == by {
                    ColumnDef::new(slug, ColumnTypeName::String)
                } else {
                    ColumnDef::new(slug, column_type.clone())
                }
            })
            .collect();

        let rows: Vec<Row> = self
            .columns()
            .iter()
            .filter(|column| column.slug() != by)
            .map(|column| -> Row {
                let cells = std::iter::once(Value::from(column.slug())).chain(column.all_values().iter().cloned());
                header.iter().map(String::as_str).zip(cells).collect()
            })
            .collect();

        Ok(self.derive(rows, defs, "Transposed", TransformType::Transpose, None))
    }
}
