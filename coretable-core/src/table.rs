//! The immutable columnar table and its lazily materialized store
//!
//! A [`CoreTable`] records its raw input, its column defs and, for derived
//! tables, a link to its parent. The column store is assembled on first
//! access by layering:
//!
//! 1. a blank column per def,
//! 2. the normalized input,
//! 3. freshly parsed columns,
//! 4. computed columns,
//!
//! and finally applying the active [`FilterMask`]. Nothing is recomputed
//! after the first access.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::column::{Column, ColumnExplanation};
use crate::column_def::{well_known_slugs, ColumnDef, ColumnSlug};
use crate::column_store::{
    autodetect_column_defs, column_store_to_rows, make_row_from_column_store, row_key, rows_to_column_store,
    ColumnStore,
};
use crate::column_type::{ColumnTypeName, ColumnTypeRegistry};
use crate::delimited::{parse_delimited, standardize_slugs, trim_matrix, AutoTyper, DelimitedOptions, Matrix, RenamedSlug};
use crate::diagnostics::{IdGenerator, SequentialIds, TableExplanation, TransformType};
use crate::error::{Error, Result};
use crate::filter_mask::FilterMask;
use crate::printers::{self, AlignedTextTableOptions};
use crate::row::Row;
use crate::value::{ErrorValue, Value};

/// Raw input a table is built from
#[derive(Debug, Clone)]
pub enum TableInput {
    /// Delimited text; the delimiter is detected unless configured
    Delimited(String),
    /// Row mappings keyed by slug
    Rows(Vec<Row>),
    /// A prebuilt column store
    Columns(ColumnStore),
}

impl Default for TableInput {
    fn default() -> Self {
        TableInput::Rows(Vec::new())
    }
}

impl From<&str> for TableInput {
    fn from(text: &str) -> Self {
        TableInput::Delimited(text.to_string())
    }
}

impl From<String> for TableInput {
    fn from(text: String) -> Self {
        TableInput::Delimited(text)
    }
}

impl From<Vec<Row>> for TableInput {
    fn from(rows: Vec<Row>) -> Self {
        TableInput::Rows(rows)
    }
}

impl From<ColumnStore> for TableInput {
    fn from(store: ColumnStore) -> Self {
        TableInput::Columns(store)
    }
}

/// Conversion applied to every delimited row in place of auto-typing
pub type RowConversion = Arc<dyn Fn(Row) -> Row + Send + Sync>;

/// Construction options for a root table
///
/// Derived tables inherit everything but the description from their parent.
#[derive(Clone)]
pub struct TableOptions {
    /// Human readable label for the root table
    pub table_description: String,

    /// Replaces auto-typing of delimited input
    pub row_conversion: Option<RowConversion>,

    /// How delimited input is read
    pub delimited: DelimitedOptions,

    /// Column types available to defs
    pub registry: Arc<ColumnTypeRegistry>,

    /// Source of diagnostic ids
    pub id_generator: Arc<dyn IdGenerator>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            table_description: String::new(),
            row_conversion: None,
            delimited: DelimitedOptions::default(),
            registry: ColumnTypeRegistry::builtin(),
            id_generator: Arc::new(SequentialIds::new()),
        }
    }
}

impl fmt::Debug for TableOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOptions")
            .field("table_description", &self.table_description)
            .field("row_conversion", &self.row_conversion.as_ref().map(|_| ".."))
            .field("delimited", &self.delimited)
            .field("id_generator", &self.id_generator)
            .finish_non_exhaustive()
    }
}

struct TableInner {
    input: TableInput,
    defs: Vec<ColumnDef>,
    slugs: Vec<ColumnSlug>,
    def_index: HashMap<ColumnSlug, usize>,
    description: String,
    category: TransformType,
    parent: Option<CoreTable>,
    filter_mask: Option<FilterMask>,
    options: TableOptions,
    id: String,
    created_at: Instant,
    time_to_load: Duration,
    input_store: OnceCell<ColumnStore>,
    column_store: OnceCell<ColumnStore>,
    columns: OnceCell<Vec<Column>>,
    rows: OnceCell<Vec<Row>>,
}

/// Immutable, column-oriented table with lineage
///
/// Cloning is cheap and shares the underlying table. Every transformation
/// returns a new table whose parent is the receiver.
#[derive(Clone)]
pub struct CoreTable {
    inner: Arc<TableInner>,
}

/// Later defs replace earlier ones with the same slug, keeping the first position
pub(crate) fn dedupe_defs(defs: Vec<ColumnDef>) -> Vec<ColumnDef> {
    let mut positions: HashMap<ColumnSlug, usize> = HashMap::new();
    let mut deduped: Vec<ColumnDef> = Vec::with_capacity(defs.len());
    for def in defs {
        match positions.get(&def.slug) {
            Some(&position) => deduped[position] = def,
            None => {
                positions.insert(def.slug.clone(), deduped.len());
                deduped.push(def);
            }
        }
    }
    deduped
}

/// Normalize raw input into a column store
///
/// Delimited text is auto-typed (or run through the configured row
/// conversion) and its headers are standardized into slugs; the renamed
/// headers are returned so they can become display names.
fn normalize_input(
    input: &TableInput,
    defs: &[ColumnDef],
    options: &TableOptions,
) -> (ColumnStore, Vec<RenamedSlug>) {
    match input {
        TableInput::Columns(store) => (store.clone(), Vec::new()),
        TableInput::Rows(rows) => (rows_to_column_store(rows), Vec::new()),
        TableInput::Delimited(text) => {
            let rows = match parse_delimited(text, &options.delimited) {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(error = %err, "Could not read delimited input");
                    Vec::new()
                }
            };
            let rows: Vec<Row> = match &options.row_conversion {
                Some(convert) => rows.into_iter().map(|row| convert(row)).collect(),
                None => {
                    let numeric = defs
                        .iter()
                        .filter(|def| options.registry.is_numeric(&def.column_type))
                        .map(|def| def.slug.as_str());
                    let mut typer = AutoTyper::new(numeric);
                    rows.into_iter().map(|row| typer.convert(row)).collect()
                }
            };
            match standardize_slugs(&rows) {
                Some((renamed_rows, renames)) => (rows_to_column_store(&renamed_rows), renames),
                None => (rows_to_column_store(&rows), Vec::new()),
            }
        }
    }
}

impl CoreTable {
    /// Build a root table with default options
    pub fn new(input: impl Into<TableInput>, defs: Vec<ColumnDef>) -> Self {
        Self::with_options(input, defs, TableOptions::default())
    }

    /// Build a root table
    ///
    /// Slugs present in the input but missing from `defs` get a def
    /// guessed from their first non-empty value.
    pub fn with_options(input: impl Into<TableInput>, defs: Vec<ColumnDef>, options: TableOptions) -> Self {
        let description = options.table_description.clone();
        Self::build(input.into(), defs, options, description, TransformType::Load, None, None)
    }

    fn build(
        input: TableInput,
        defs: Vec<ColumnDef>,
        options: TableOptions,
        description: String,
        category: TransformType,
        parent: Option<CoreTable>,
        filter_mask: Option<FilterMask>,
    ) -> Self {
        let created_at = Instant::now();
        let mut defs = dedupe_defs(defs);
        let input_store = OnceCell::new();

        // A derived table always carries its full defs; only roots guess
        if parent.is_none() {
            let (store, renames) = normalize_input(&input, &defs, &options);
            let defined: HashSet<&str> = defs.iter().map(|def| def.slug.as_str()).collect();
            let detected: Vec<ColumnDef> = autodetect_column_defs(&store, &defined)
                .into_iter()
                .map(|def| match renames.iter().find(|renamed| renamed.slug == def.slug) {
                    Some(renamed) => def.with_name(&renamed.name),
                    None => def,
                })
                .collect();
            defs.extend(detected);
            let _ = input_store.set(store);
        }

        let slugs: Vec<ColumnSlug> = defs.iter().map(|def| def.slug.clone()).collect();
        let def_index = slugs.iter().enumerate().map(|(i, slug)| (slug.clone(), i)).collect();
        let id = options.id_generator.next_id();

        let inner = TableInner {
            input,
            defs,
            slugs,
            def_index,
            description,
            category,
            parent,
            filter_mask,
            options,
            id,
            created_at,
            time_to_load: created_at.elapsed(),
            input_store,
            column_store: OnceCell::new(),
            columns: OnceCell::new(),
            rows: OnceCell::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Build a child table of `self`
    pub(crate) fn derive(
        &self,
        input: impl Into<TableInput>,
        defs: Vec<ColumnDef>,
        description: impl Into<String>,
        category: TransformType,
        filter_mask: Option<FilterMask>,
    ) -> CoreTable {
        let description = description.into();
        let child = Self::build(
            input.into(),
            defs,
            self.inner.options.clone(),
            description,
            category,
            Some(self.clone()),
            filter_mask,
        );
        debug!(
            id = %child.id(),
            parent = %self.id(),
            category = %category,
            description = %child.table_description(),
            "Transformed table"
        );
        child
    }

    fn input_store(&self) -> &ColumnStore {
        self.inner
            .input_store
            .get_or_init(|| normalize_input(&self.inner.input, &self.inner.defs, &self.inner.options).0)
    }

    fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Computed defs this table introduces, regardless of category
    fn new_computed_defs(&self) -> Vec<&ColumnDef> {
        let parent_slugs: HashSet<&str> = self
            .inner
            .parent
            .as_ref()
            .map(|parent| parent.inner.slugs.iter().map(String::as_str).collect())
            .unwrap_or_default();
        self.inner
            .defs
            .iter()
            .filter(|def| def.is_computed() && !parent_slugs.contains(def.slug.as_str()))
            .collect()
    }

    fn cols_to_compute(&self) -> Vec<&ColumnDef> {
        if self.inner.category.requires_compute() {
            self.new_computed_defs()
        } else {
            Vec::new()
        }
    }

    fn cols_to_parse(&self) -> Vec<&ColumnDef> {
        let input = self.input_store();
        let computed: HashSet<&str> = self.cols_to_compute().iter().map(|def| def.slug.as_str()).collect();
        let registry = &self.inner.options.registry;
        let is_root = self.is_root();

        self.inner
            .defs
            .iter()
            .filter(|def| !computed.contains(def.slug.as_str()))
            .filter(|def| {
                if is_root {
                    return true;
                }
                // Derived tables only re-parse columns that still look raw
                match input.get(&def.slug) {
                    None => true,
                    Some(values) => values
                        .first()
                        .is_some_and(|first| registry.get(&def.column_type).needs_parsing(first)),
                }
            })
            .collect()
    }

    fn materialize(&self) -> ColumnStore {
        let started = Instant::now();
        let input = self.input_store();
        let registry = &self.inner.options.registry;
        let defs = &self.inner.defs;
        let to_parse = self.cols_to_parse();
        let to_compute = self.cols_to_compute();
        let num_input_rows = input.num_rows();

        let mut store = ColumnStore::new();
        for def in defs {
            store.insert(&def.slug, Vec::new());
        }
        for def in defs {
            if let Some(values) = input.get_shared(&def.slug) {
                store.insert_shared(&def.slug, values);
            }
        }

        let mut parsed = ColumnStore::new();
        for def in &to_parse {
            let column_type = registry.get(&def.column_type);
            let values = match input.get(&def.slug) {
                Some(raw) => raw.iter().map(|value| column_type.parse(value)).collect(),
                None => vec![column_type.blank_value(); num_input_rows],
            };
            parsed.insert(&def.slug, values);
        }
        store.overlay(&parsed);

        let computed_slugs: HashSet<&str> = to_compute.iter().map(|def| def.slug.as_str()).collect();
        if !to_compute.is_empty() {
            let mut source = input.clone();
            source.overlay(&parsed);
            let rows = column_store_to_rows(&source);
            for def in &to_compute {
                let values = match (&def.values, &def.generator) {
                    (Some(values), _) => values.clone(),
                    (None, Some(generator)) => rows
                        .iter()
                        .enumerate()
                        .map(|(index, row)| generator.call(row, index))
                        .collect(),
                    (None, None) => Vec::new(),
                };
                store.insert(&def.slug, values);
            }
        }

        let num_rows = if input.is_empty() {
            store.iter().map(|(_, values)| values.len()).max().unwrap_or(0)
        } else {
            num_input_rows
        };

        for def in defs {
            let Some(values) = store.get(&def.slug) else {
                continue;
            };
            if values.len() == num_rows {
                continue;
            }
            let filler = if computed_slugs.contains(def.slug.as_str()) {
                Value::Invalid(ErrorValue::MissingValuePlaceholder)
            } else {
                registry.get(&def.column_type).blank_value()
            };
            if values.len() > num_rows {
                warn!(slug = %def.slug, expected = num_rows, actual = values.len(), "Truncating overlong column");
            }
            let mut values = values.to_vec();
            values.resize(num_rows, filler);
            store.insert(&def.slug, values);
        }

        let store = match &self.inner.filter_mask {
            Some(mask) => mask.apply(&store),
            None => store,
        };

        trace!(
            id = %self.inner.id,
            rows = store.num_rows(),
            parsed = to_parse.len(),
            computed = to_compute.len(),
            elapsed_us = started.elapsed().as_micros(),
            "Materialized column store"
        );
        store
    }

    /// The materialized column store
    pub fn column_store(&self) -> &ColumnStore {
        self.inner.column_store.get_or_init(|| self.materialize())
    }

    /// Runtime columns in def order
    pub fn columns(&self) -> &[Column] {
        self.inner.columns.get_or_init(|| {
            let store = self.column_store();
            self.inner
                .defs
                .iter()
                .map(|def| {
                    Column::new(
                        def.clone(),
                        self.inner.options.registry.get(&def.column_type),
                        store.get_shared(&def.slug).unwrap_or_default(),
                    )
                })
                .collect()
        })
    }

    /// Column by slug
    pub fn get(&self, slug: &str) -> Option<&Column> {
        let &position = self.inner.def_index.get(slug)?;
        self.columns().get(position)
    }

    /// Column by slug, failing on an unknown slug
    pub fn get_column(&self, slug: &str) -> Result<&Column> {
        self.get(slug).ok_or_else(|| Error::UnknownColumn(slug.to_string()))
    }

    /// Columns by slug, failing on the first unknown slug
    pub fn get_columns(&self, slugs: &[&str]) -> Result<Vec<&Column>> {
        slugs.iter().map(|slug| self.get_column(slug)).collect()
    }

    /// Whether the table defines this slug
    pub fn has(&self, slug: &str) -> bool {
        self.inner.def_index.contains_key(slug)
    }

    /// Every value of a column
    pub fn get_values_for(&self, slug: &str) -> Result<&[Value]> {
        self.column_store()
            .get(slug)
            .ok_or_else(|| Error::UnknownColumn(slug.to_string()))
    }

    /// Values of a column at the given rows; rows past the end read as empty
    pub fn get_values_at_indices(&self, slug: &str, indices: &[usize]) -> Result<Vec<Value>> {
        let values = self.get_values_for(slug)?;
        Ok(indices
            .iter()
            .map(|&index| values.get(index).cloned().unwrap_or_default())
            .collect())
    }

    /// Values of the time column at the given rows
    pub fn get_times_at_indices(&self, indices: &[usize]) -> Result<Vec<Value>> {
        let time_column = self
            .time_column()
            .ok_or_else(|| Error::UnknownColumn(well_known_slugs::TIME.to_string()))?;
        self.get_values_at_indices(&time_column.def().slug, indices)
    }

    /// The time column: the first date column, else the first year column,
    /// else a column named `time`, `day` or `year`
    pub fn time_column(&self) -> Option<&Column> {
        let columns = self.columns();
        columns
            .iter()
            .find(|column| *column.type_name() == ColumnTypeName::Date)
            .or_else(|| columns.iter().find(|column| *column.type_name() == ColumnTypeName::Year))
            .or_else(|| {
                [well_known_slugs::TIME, well_known_slugs::DAY, well_known_slugs::YEAR]
                    .into_iter()
                    .find_map(|slug| self.get(slug))
            })
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.column_store().num_rows()
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.inner.slugs.len()
    }

    /// Column slugs in order
    pub fn column_slugs(&self) -> &[ColumnSlug] {
        &self.inner.slugs
    }

    /// Column display names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.inner.defs.iter().map(ColumnDef::display_name).collect()
    }

    /// Declared column types in order
    pub fn column_types(&self) -> Vec<&ColumnTypeName> {
        self.inner.defs.iter().map(|def| &def.column_type).collect()
    }

    /// Slugs whose type is numeric
    pub fn numeric_column_slugs(&self) -> Vec<&str> {
        self.inner
            .defs
            .iter()
            .filter(|def| self.inner.options.registry.is_numeric(&def.column_type))
            .map(|def| def.slug.as_str())
            .collect()
    }

    /// Column defs in order
    pub fn defs(&self) -> &[ColumnDef] {
        &self.inner.defs
    }

    /// Every row, derived once from the column store
    pub fn rows(&self) -> &[Row] {
        self.inner.rows.get_or_init(|| column_store_to_rows(self.column_store()))
    }

    /// Iterate rows without materializing them all
    pub fn iter_rows(&self) -> impl Iterator<Item = Row> + '_ {
        let store = self.column_store();
        (0..store.num_rows()).map(move |index| make_row_from_column_store(index, store))
    }

    /// First row, if any
    pub fn first_row(&self) -> Option<Row> {
        (self.num_rows() > 0).then(|| make_row_from_column_store(0, self.column_store()))
    }

    /// Last row, if any
    pub fn last_row(&self) -> Option<Row> {
        let num_rows = self.num_rows();
        (num_rows > 0).then(|| make_row_from_column_store(num_rows - 1, self.column_store()))
    }

    /// Rows at the given positions
    pub fn rows_at(&self, indices: &[usize]) -> Vec<Row> {
        let store = self.column_store();
        indices
            .iter()
            .map(|&index| make_row_from_column_store(index, store))
            .collect()
    }

    /// Rows in `[start, end)`, clamped to the table
    pub fn rows_from(&self, start: usize, end: usize) -> Vec<Row> {
        let end = end.min(self.num_rows());
        if start >= end {
            return Vec::new();
        }
        self.rows_at(&(start..end).collect::<Vec<_>>())
    }

    /// Row indices matching every `slug = value` pair of `query`
    ///
    /// An empty query matches every row.
    pub fn find_rows_indices(&self, query: &Row) -> Result<Vec<usize>> {
        let mut matches: Option<Vec<usize>> = None;
        for (slug, value) in query.iter() {
            let candidates = self.get_column(slug)?.indices_where(value);
            matches = Some(match matches {
                None => candidates.to_vec(),
                Some(current) => {
                    let candidates: HashSet<usize> = candidates.iter().copied().collect();
                    current.into_iter().filter(|index| candidates.contains(index)).collect()
                }
            });
        }
        Ok(matches.unwrap_or_else(|| (0..self.num_rows()).collect()))
    }

    /// Rows matching every `slug = value` pair of `query`
    pub fn find_rows(&self, query: &Row) -> Result<Vec<Row>> {
        Ok(self.rows_at(&self.find_rows_indices(query)?))
    }

    /// Position of the first row matching `row`
    pub fn index_of(&self, row: &Row) -> Result<Option<usize>> {
        Ok(self.find_rows_indices(row)?.first().copied())
    }

    /// Map from composite key over `slugs` to the rows holding it
    pub fn row_index(&self, slugs: &[&str]) -> Result<HashMap<Vec<Value>, Vec<usize>>> {
        for slug in slugs {
            self.get_column(slug)?;
        }
        let slugs: Vec<ColumnSlug> = slugs.iter().map(|slug| (*slug).to_string()).collect();
        Ok(self.key_index(&slugs))
    }

    /// Composite key index; empty when any key column is absent
    pub(crate) fn key_index(&self, slugs: &[ColumnSlug]) -> HashMap<Vec<Value>, Vec<usize>> {
        let store = self.column_store();
        let mut index: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
        if let Some(missing) = slugs.iter().find(|slug| !store.contains(slug)) {
            warn!(slug = %missing, "Key column missing, index is empty");
            return index;
        }
        for row_index in 0..store.num_rows() {
            index.entry(row_key(store, slugs, row_index)).or_default().push(row_index);
        }
        index
    }

    /// Map from each value of `index_slug` to the value of `value_slug` in the same row
    ///
    /// Only rows valid in both columns take part; later rows win.
    pub fn value_index(&self, index_slug: &str, value_slug: &str) -> Result<HashMap<Value, Value>> {
        let keys = self.get_column(index_slug)?.all_values();
        let values = self.get_column(value_slug)?.all_values();
        Ok(keys
            .iter()
            .zip(values)
            .filter(|(key, value)| key.is_valid() && value.is_valid())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    /// Distinct values of a column with their rows, in first-appearance order
    pub fn index_by(&self, slug: &str) -> Result<Vec<(Value, Vec<usize>)>> {
        let values = self.get_values_for(slug)?;
        let mut positions: HashMap<&Value, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<usize>)> = Vec::new();
        for (row_index, value) in values.iter().enumerate() {
            match positions.get(value) {
                Some(&group) => groups[group].1.push(row_index),
                None => {
                    positions.insert(value, groups.len());
                    groups.push((value.clone(), vec![row_index]));
                }
            }
        }
        Ok(groups)
    }

    /// Smallest minimum and largest maximum across several columns
    pub fn domain_for(&self, slugs: &[&str]) -> Result<(Option<Value>, Option<Value>)> {
        let columns = self.get_columns(slugs)?;
        let min = columns.iter().filter_map(|column| column.min_value()).min().cloned();
        let max = columns.iter().filter_map(|column| column.max_value()).max().cloned();
        Ok((min, max))
    }

    /// Body cells for `slugs`, row by row
    pub fn extract(&self, slugs: &[&str]) -> Result<Vec<Vec<Value>>> {
        let columns: Vec<&[Value]> = slugs
            .iter()
            .map(|slug| self.get_values_for(slug))
            .collect::<Result<_>>()?;
        Ok((0..self.num_rows())
            .map(|row| columns.iter().map(|values| values[row].clone()).collect())
            .collect())
    }

    fn body_cells(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        let store = self.column_store();
        (0..store.num_rows()).map(move |row| self.inner.slugs.iter().map(|slug| store.cell(slug, row)).collect())
    }

    /// Header of slugs followed by every row, with trailing blanks trimmed
    pub fn to_matrix(&self) -> Matrix {
        let mut matrix = Vec::with_capacity(self.num_rows() + 1);
        matrix.push(self.inner.slugs.iter().map(|slug| Value::from(slug.as_str())).collect());
        matrix.extend(self.body_cells());
        trim_matrix(&matrix)
    }

    /// Every body cell, row-major
    pub fn to_one_dimensional_array(&self) -> Vec<Value> {
        self.body_cells().flatten().collect()
    }

    /// Columns holding one distinct value across every row
    pub fn constant_columns(&self) -> Vec<&Column> {
        self.columns().iter().filter(|column| column.is_constant()).collect()
    }

    /// Later rows whose every cell repeats an earlier row
    pub fn duplicate_row_indices(&self) -> Vec<usize> {
        let store = self.column_store();
        let mut seen = HashSet::new();
        (0..store.num_rows())
            .filter(|&row| !seen.insert(row_key(store, &self.inner.slugs, row)))
            .collect()
    }

    /// Absent or sentinel cells across all columns
    pub fn num_invalid_cells(&self) -> usize {
        self.columns().iter().map(Column::num_invalid_cells).sum()
    }

    /// Valid cells across all columns
    pub fn num_valid_cells(&self) -> usize {
        self.columns().iter().map(Column::num_values).sum()
    }

    /// Columns with at least one absent or sentinel cell
    pub fn num_columns_with_invalid_cells(&self) -> usize {
        self.columns().iter().filter(|column| column.num_invalid_cells() > 0).count()
    }

    /// Diagnostic id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// How this table was derived
    pub fn table_description(&self) -> &str {
        &self.inner.description
    }

    /// Category of the transform that produced this table
    pub fn transform_category(&self) -> TransformType {
        self.inner.category
    }

    /// Raw input this table was built from
    pub fn input(&self) -> &TableInput {
        &self.inner.input
    }

    /// Options shared along the lineage
    pub fn options(&self) -> &TableOptions {
        &self.inner.options
    }

    /// Active row filter
    pub fn filter_mask(&self) -> Option<&FilterMask> {
        self.inner.filter_mask.as_ref()
    }

    /// Parent table, if derived
    pub fn parent(&self) -> Option<&CoreTable> {
        self.inner.parent.as_ref()
    }

    /// The table at the start of the lineage
    pub fn root_table(&self) -> &CoreTable {
        let mut table = self;
        while let Some(parent) = table.parent() {
            table = parent;
        }
        table
    }

    /// Lineage from the root to this table
    pub fn ancestors(&self) -> Vec<CoreTable> {
        let mut chain = vec![self.clone()];
        let mut table = self;
        while let Some(parent) = table.parent() {
            chain.push(parent.clone());
            table = parent;
        }
        chain.reverse();
        chain
    }

    /// Whether two handles point at the same table
    pub fn ptr_eq(&self, other: &CoreTable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Time between the parent finishing construction and this table starting
    pub fn between_time(&self) -> Duration {
        self.parent().map_or(Duration::ZERO, |parent| {
            self.inner
                .created_at
                .saturating_duration_since(parent.inner.created_at + parent.inner.time_to_load)
        })
    }

    /// Diagnostic summary of this table
    pub fn explanation(&self) -> TableExplanation {
        TableExplanation {
            table_description: self.inner.description.chars().take(30).collect(),
            transform_category: self.inner.category,
            id: self.inner.id.clone(),
            parent_id: self.parent().map(|parent| parent.id().to_string()),
            num_columns: self.num_columns(),
            num_rows: self.num_rows(),
            time_to_load_micros: self.inner.time_to_load.as_micros(),
            num_cols_to_parse: self.cols_to_parse().len(),
            num_cols_to_compute: self.cols_to_compute().len(),
            num_valid_cells: self.num_valid_cells(),
            num_invalid_cells: self.num_invalid_cells(),
            num_columns_with_invalid_cells: self.num_columns_with_invalid_cells(),
        }
    }

    /// Diagnostic summary of every table in the lineage, root first
    pub fn explain_pipeline(&self) -> Vec<TableExplanation> {
        self.ancestors().iter().map(CoreTable::explanation).collect()
    }

    /// Diagnostic summary of every column
    pub fn explain_columns(&self) -> Vec<ColumnExplanation> {
        self.columns().iter().map(Column::explain).collect()
    }

    /// Lineage, columns and the first `row_limit` rows as aligned text
    pub fn dump(&self, row_limit: usize) -> String {
        let options = AlignedTextTableOptions {
            max_characters_per_line: 200,
            ..AlignedTextTableOptions::default()
        };
        let pipeline: Vec<Row> = self.explain_pipeline().iter().map(TableExplanation::to_row).collect();
        let columns: Vec<Row> = self.explain_columns().iter().map(ColumnExplanation::to_row).collect();
        [
            printers::to_aligned_text_table(&row_slugs(&pipeline), &pipeline, &options),
            printers::to_aligned_text_table(&row_slugs(&columns), &columns, &options),
            printers::to_aligned_text_table(&self.inner.slugs, &self.rows_from(0, row_limit), &options),
        ]
        .join("\n\n")
    }

    /// Aligned plain text rendering
    pub fn to_aligned_text_table(&self, options: &AlignedTextTableOptions) -> String {
        printers::to_aligned_text_table(&self.inner.slugs, self.rows(), options)
    }

    /// Markdown rendering
    pub fn to_markdown_table(&self) -> String {
        printers::to_markdown_table(&self.inner.slugs, self.rows())
    }

    /// Delimited export with a slug header
    pub fn to_delimited(&self, delimiter: u8) -> Result<String> {
        printers::to_delimited(delimiter, &self.inner.slugs, self.rows())
    }

    /// Delimited export of selected columns
    pub fn to_delimited_columns(&self, delimiter: u8, slugs: &[&str]) -> Result<String> {
        for slug in slugs {
            self.get_column(slug)?;
        }
        let slugs: Vec<ColumnSlug> = slugs.iter().map(|slug| (*slug).to_string()).collect();
        printers::to_delimited(delimiter, &slugs, self.rows())
    }

    /// Comma separated export with display names and type formatting
    pub fn to_csv_with_column_names(&self) -> Result<String> {
        let columns = self.columns();
        let header: Vec<String> = columns.iter().map(|column| column.name().to_string()).collect();
        let body = (0..self.num_rows()).map(|row| {
            columns
                .iter()
                .map(|column| column.format_for_csv(&column.all_values()[row]))
                .collect::<Vec<String>>()
        });
        printers::write_delimited(b',', std::iter::once(header).chain(body))
    }

    /// Defs keyed by slug
    pub fn def_to_object(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        self.inner
            .defs
            .iter()
            .map(|def| -> Result<(String, serde_json::Value)> { Ok((def.slug.clone(), serde_json::to_value(def)?)) })
            .collect()
    }

    /// `{"columns": {slug: def}, "rows": [...]}`
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "columns": self.def_to_object()?,
            "rows": serde_json::to_value(self.rows())?,
        }))
    }
}

fn row_slugs(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.slugs().map(str::to_string).collect())
        .unwrap_or_default()
}

impl fmt::Debug for CoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreTable")
            .field("id", &self.inner.id)
            .field("description", &self.inner.description)
            .field("category", &self.inner.category)
            .field("slugs", &self.inner.slugs)
            .finish_non_exhaustive()
    }
}

impl Default for CoreTable {
    fn default() -> Self {
        CoreTable::new(TableInput::default(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_type::ColumnType;
    use pretty_assertions::assert_eq;

    fn gdp_table() -> CoreTable {
        CoreTable::new(
            "country,year,gdp\nfr,2000,10\nfr,2001,\nde,2000,20",
            vec![ColumnDef::new("gdp", ColumnTypeName::Numeric)],
        )
    }

    #[test]
    fn test_delimited_root_autodetects_and_parses() {
        let table = gdp_table();
        assert_eq!(table.column_slugs(), &["gdp", "country", "year"]);
        assert_eq!(table.get("year").unwrap().type_name(), &ColumnTypeName::Year);
        assert_eq!(table.get("country").unwrap().type_name(), &ColumnTypeName::String);
        assert_eq!(
            table.get_values_for("gdp").unwrap(),
            &[
                Value::Number(10.0),
                Value::Invalid(ErrorValue::NaNButShouldBeNumber),
                Value::Number(20.0)
            ]
        );
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns_with_invalid_cells(), 1);
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let err = gdp_table().get_values_for("population").unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(slug) if slug == "population"));
    }

    #[test]
    fn test_missing_defined_columns_are_full_length() {
        let table = CoreTable::new(
            vec![Row::new().with("a", 1), Row::new().with("a", 2)],
            vec![ColumnDef::new("b", ColumnTypeName::Numeric)],
        );
        assert_eq!(
            table.get_values_for("b").unwrap(),
            &[
                Value::Invalid(ErrorValue::UndefinedButShouldBeNumber),
                Value::Invalid(ErrorValue::UndefinedButShouldBeNumber)
            ]
        );
        assert_eq!(table.column_slugs(), &["b", "a"]);
    }

    #[test]
    fn test_generators_see_parsed_rows() {
        let table = CoreTable::new(
            vec![Row::new().with("x", "2"), Row::new().with("x", "3")],
            vec![
                ColumnDef::new("x", ColumnTypeName::Numeric),
                ColumnDef::new("double", ColumnTypeName::Numeric).with_generator(|row, _| {
                    row.value("x").as_number().map_or(Value::Empty, |x| Value::Number(x * 2.0))
                }),
            ],
        );
        assert_eq!(table.get_values_for("double").unwrap(), &[Value::Number(4.0), Value::Number(6.0)]);
    }

    #[test]
    fn test_precomputed_values_are_padded() {
        let table = CoreTable::new(
            vec![Row::new().with("a", 1), Row::new().with("a", 2)],
            vec![ColumnDef::new("b", ColumnTypeName::Numeric).with_values(vec![Value::Number(9.0)])],
        );
        assert_eq!(
            table.get_values_for("b").unwrap(),
            &[Value::Number(9.0), Value::Invalid(ErrorValue::MissingValuePlaceholder)]
        );
    }

    #[test]
    fn test_custom_row_conversion_replaces_auto_typing() {
        let options = TableOptions {
            row_conversion: Some(Arc::new(|row: Row| {
                row.iter()
                    .map(|(slug, value)| (slug.to_uppercase(), value.clone()))
                    .collect()
            })),
            ..TableOptions::default()
        };
        let table = CoreTable::with_options("a,b\n1,2", Vec::new(), options);
        assert_eq!(table.column_slugs(), &["A", "B"]);
        assert_eq!(table.get("A").unwrap().type_name(), &ColumnTypeName::Numeric);
    }

    #[test]
    fn test_standardized_headers_keep_their_names() {
        let table = CoreTable::new("Country Name\tpop\nFrance\t67", Vec::new());
        assert_eq!(table.column_slugs(), &["Country-Name", "pop"]);
        assert_eq!(table.column_names(), vec!["Country Name", "pop"]);
    }

    #[test]
    fn test_column_store_input_and_registry() {
        #[derive(Debug)]
        struct Percent;
        impl ColumnType for Percent {
            fn name(&self) -> ColumnTypeName {
                ColumnTypeName::Custom("Percent".into())
            }
            fn parse(&self, raw: &Value) -> Value {
                match raw {
                    Value::Number(n) => Value::Number(n / 100.0),
                    other => other.clone(),
                }
            }
            fn needs_parsing(&self, _value: &Value) -> bool {
                false
            }
            fn is_numeric(&self) -> bool {
                true
            }
        }

        let mut registry = ColumnTypeRegistry::default();
        registry.register(Arc::new(Percent));
        let options = TableOptions {
            registry: Arc::new(registry),
            ..TableOptions::default()
        };
        let store = ColumnStore::new().with_column("share", vec![Value::Number(50.0)]);
        let table = CoreTable::with_options(
            store,
            vec![ColumnDef::new("share", ColumnTypeName::Custom("Percent".into()))],
            options,
        );
        assert_eq!(table.get_values_for("share").unwrap(), &[Value::Number(0.5)]);
        assert_eq!(table.numeric_column_slugs(), vec!["share"]);
    }

    #[test]
    fn test_queries() {
        let table = gdp_table();
        let query = Row::new().with("country", "fr");
        assert_eq!(table.find_rows_indices(&query).unwrap(), vec![0, 1]);
        assert_eq!(table.find_rows_indices(&Row::new()).unwrap(), vec![0, 1, 2]);
        assert_eq!(
            table.index_of(&Row::new().with("country", "de").with("year", 2000)).unwrap(),
            Some(2)
        );
        assert_eq!(table.time_column().map(Column::slug), Some("year"));
        assert_eq!(
            table.get_times_at_indices(&[2, 9]).unwrap(),
            vec![Value::Number(2000.0), Value::Empty]
        );
        assert_eq!(
            table.domain_for(&["gdp"]).unwrap(),
            (Some(Value::Number(10.0)), Some(Value::Number(20.0)))
        );
        let by_country = table.index_by("country").unwrap();
        assert_eq!(by_country[0], (Value::from("fr"), vec![0, 1]));
        assert_eq!(by_country[1], (Value::from("de"), vec![2]));
        assert_eq!(
            table.value_index("country", "gdp").unwrap().get(&Value::from("fr")),
            Some(&Value::Number(10.0))
        );
        assert!(table.row_index(&["missing"]).is_err());
    }

    #[test]
    fn test_rows_and_exports() {
        let table = CoreTable::new(
            vec![Row::new().with("a", 1).with("b", "x"), Row::new().with("a", 2).with("b", "y, z")],
            Vec::new(),
        );
        assert_eq!(table.first_row(), Some(Row::new().with("a", 1).with("b", "x")));
        assert_eq!(table.last_row().unwrap().value("a"), Value::Number(2.0));
        assert_eq!(table.rows_from(1, 10).len(), 1);
        assert!(table.rows_from(5, 10).is_empty());
        assert_eq!(table.iter_rows().count(), 2);
        assert_eq!(table.to_delimited(b',').unwrap(), "a,b\n1,x\n2,\"y, z\"");
        assert_eq!(table.to_csv_with_column_names().unwrap(), "a,b\n1,x\n2,\"y, z\"");
        assert_eq!(table.to_markdown_table(), "|a|b|\n|-|-|\n|1|x|\n|2|y, z|");
        assert_eq!(
            table.to_one_dimensional_array(),
            vec![Value::Number(1.0), Value::from("x"), Value::Number(2.0), Value::from("y, z")]
        );
        let json = table.to_json().unwrap();
        assert_eq!(json["columns"]["a"]["type"], "Numeric");
        assert_eq!(json["rows"][1]["b"], "y, z");
    }

    #[test]
    fn test_diagnostics() {
        let table = CoreTable::new(
            vec![
                Row::new().with("a", 1).with("k", "same"),
                Row::new().with("a", 1).with("k", "same"),
            ],
            Vec::new(),
        );
        assert_eq!(table.duplicate_row_indices(), vec![1]);
        assert_eq!(table.constant_columns().len(), 2);
        let explanation = table.explanation();
        assert_eq!(explanation.num_rows, 2);
        assert_eq!(explanation.num_cols_to_parse, 2);
        assert_eq!(explanation.transform_category, TransformType::Load);
        assert!(table.dump(5).contains("same"));
    }

    #[test]
    fn test_ids_come_from_the_injected_generator() {
        let options = TableOptions {
            id_generator: Arc::new(SequentialIds::new()),
            ..TableOptions::default()
        };
        let table = CoreTable::with_options(vec![Row::new().with("a", 1)], Vec::new(), options);
        assert_eq!(table.id(), "1");
        assert!(table.root_table().ptr_eq(&table));
        assert_eq!(table.ancestors().len(), 1);
    }
}
