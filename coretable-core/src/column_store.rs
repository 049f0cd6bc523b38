//! Column-oriented storage and the pure utilities that reshape it
//!
//! Every function here allocates a new store and leaves its inputs alone.
//! Columns are shared through `Arc` so overlaying or selecting columns
//! never copies cell data.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::column_def::{well_known_slugs, ColumnDef, ColumnSlug};
use crate::column_type::ColumnTypeName;
use crate::row::Row;
use crate::value::{ErrorValue, Value};

/// Ordered mapping from slug to a column of values
///
/// Insertion order is display order. All columns of a well-formed store
/// share one length; [`ColumnStore::num_rows`] reports the first column's.
#[derive(Debug, Clone, Default)]
pub struct ColumnStore {
    slugs: Vec<ColumnSlug>,
    columns: Vec<Arc<Vec<Value>>>,
    index: HashMap<ColumnSlug, usize>,
}

impl ColumnStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with_column(mut self, slug: &str, values: Vec<Value>) -> Self {
        self.insert(slug, values);
        self
    }

    /// Insert or replace a column; new slugs are appended
    pub fn insert(&mut self, slug: &str, values: Vec<Value>) {
        self.insert_shared(slug, Arc::new(values));
    }

    /// Insert or replace a column without copying it
    pub fn insert_shared(&mut self, slug: &str, values: Arc<Vec<Value>>) {
        if let Some(&position) = self.index.get(slug) {
            self.columns[position] = values;
        } else {
            self.index.insert(slug.to_string(), self.slugs.len());
            self.slugs.push(slug.to_string());
            self.columns.push(values);
        }
    }

    /// Remove a column, returning its values
    pub fn remove(&mut self, slug: &str) -> Option<Arc<Vec<Value>>> {
        let position = self.index.remove(slug)?;
        self.slugs.remove(position);
        let values = self.columns.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(values)
    }

    /// Values of a column
    pub fn get(&self, slug: &str) -> Option<&[Value]> {
        self.index.get(slug).map(|&i| self.columns[i].as_slice())
    }

    /// Shared handle to a column
    pub fn get_shared(&self, slug: &str) -> Option<Arc<Vec<Value>>> {
        self.index.get(slug).map(|&i| self.columns[i].clone())
    }

    /// Whether the store has a column for this slug
    pub fn contains(&self, slug: &str) -> bool {
        self.index.contains_key(slug)
    }

    /// Slugs in column order
    pub fn slugs(&self) -> &[ColumnSlug] {
        &self.slugs
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.slugs.len()
    }

    /// Number of rows, taken from the first column
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |column| column.len())
    }

    /// Whether the store has no columns
    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    /// Columns in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.slugs
            .iter()
            .zip(&self.columns)
            .map(|(slug, values)| (slug.as_str(), values.as_slice()))
    }

    /// Copy every column of `other` over this store
    ///
    /// Existing slugs keep their position; new ones are appended.
    pub fn overlay(&mut self, other: &ColumnStore) {
        for (slug, values) in other.slugs.iter().zip(&other.columns) {
            self.insert_shared(slug, values.clone());
        }
    }

    /// A store with only the given slugs, in the given order
    ///
    /// Slugs the store lacks are skipped.
    pub fn select(&self, slugs: &[ColumnSlug]) -> ColumnStore {
        let mut store = ColumnStore::new();
        for slug in slugs {
            if let Some(values) = self.get_shared(slug) {
                store.insert_shared(slug, values);
            }
        }
        store
    }

    /// Cell at a row, or `Empty` past the end of a short column
    pub fn cell(&self, slug: &str, row_index: usize) -> Value {
        self.get(slug)
            .and_then(|values| values.get(row_index))
            .cloned()
            .unwrap_or(Value::Empty)
    }
}

impl PartialEq for ColumnStore {
    fn eq(&self, other: &Self) -> bool {
        self.slugs == other.slugs
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.as_slice() == b.as_slice())
    }
}

impl FromIterator<(ColumnSlug, Vec<Value>)> for ColumnStore {
    fn from_iter<I: IntoIterator<Item = (ColumnSlug, Vec<Value>)>>(iter: I) -> Self {
        let mut store = ColumnStore::new();
        for (slug, values) in iter {
            store.insert(&slug, values);
        }
        store
    }
}

impl Serialize for ColumnStore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.slugs.len()))?;
        for (slug, values) in self.iter() {
            map.serialize_entry(slug, values)?;
        }
        map.end()
    }
}

/// Sort direction for one key of a multi-column sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

/// Convert rows into columns, keyed by the first row's slugs
///
/// Each row's cells are visited once. Slugs the first row lacks are
/// ignored; cells a later row lacks are `Empty`.
pub fn rows_to_column_store(rows: &[Row]) -> ColumnStore {
    let Some(first) = rows.first() else {
        return ColumnStore::new();
    };

    let slugs: Vec<&str> = first.slugs().collect();
    let positions: HashMap<&str, usize> = slugs.iter().enumerate().map(|(i, slug)| (*slug, i)).collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); slugs.len()];
    for row in rows {
        let mut cells = vec![Value::Empty; slugs.len()];
        for (slug, value) in row.iter() {
            if let Some(&position) = positions.get(slug) {
                cells[position] = value.clone();
            }
        }
        for (column, cell) in columns.iter_mut().zip(cells) {
            column.push(cell);
        }
    }

    slugs
        .into_iter()
        .map(str::to_string)
        .zip(columns)
        .collect()
}

/// Convert columns into rows
pub fn column_store_to_rows(store: &ColumnStore) -> Vec<Row> {
    (0..store.num_rows())
        .map(|index| make_row_from_column_store(index, store))
        .collect()
}

/// Build the row at `row_index`
pub fn make_row_from_column_store(row_index: usize, store: &ColumnStore) -> Row {
    let mut row = Row::with_capacity(store.num_columns());
    for (slug, values) in store.iter() {
        row.push_unique(slug, values.get(row_index).cloned().unwrap_or_default());
    }
    row
}

/// Stack stores row-wise
///
/// The result has the union of all slugs in first-appearance order, or
/// exactly `slugs_to_keep` when given. A store lacking a slug contributes
/// [`ErrorValue::MissingValuePlaceholder`] cells for it so rows stay aligned.
pub fn concat_column_stores(stores: &[&ColumnStore], slugs_to_keep: Option<&[ColumnSlug]>) -> ColumnStore {
    if stores.is_empty() {
        return ColumnStore::new();
    }

    let slugs: Vec<ColumnSlug> = match slugs_to_keep {
        Some(slugs) => slugs.to_vec(),
        None => {
            let mut seen = HashSet::new();
            stores
                .iter()
                .flat_map(|store| store.slugs().iter())
                .filter(|slug| seen.insert(slug.as_str()))
                .cloned()
                .collect()
        }
    };

    let total_rows: usize = stores.iter().map(|store| store.num_rows()).sum();
    slugs
        .into_iter()
        .map(|slug| {
            let mut values = Vec::with_capacity(total_rows);
            for store in stores {
                match store.get(&slug) {
                    Some(column) => values.extend_from_slice(column),
                    None => values.extend(
                        std::iter::repeat(Value::Invalid(ErrorValue::MissingValuePlaceholder))
                            .take(store.num_rows()),
                    ),
                }
            }
            (slug, values)
        })
        .collect()
}

/// Reverse the row order of every column
pub fn reverse_column_store(store: &ColumnStore) -> ColumnStore {
    store
        .iter()
        .map(|(slug, values)| (slug.to_string(), values.iter().rev().cloned().collect()))
        .collect()
}

/// Substitute slugs; unmapped slugs are kept as they are
pub fn rename_column_store(store: &ColumnStore, rename_map: &HashMap<ColumnSlug, ColumnSlug>) -> ColumnStore {
    let mut renamed = ColumnStore::new();
    for (slug, values) in store.slugs.iter().zip(&store.columns) {
        let target = rename_map.get(slug).unwrap_or(slug);
        renamed.insert_shared(target, values.clone());
    }
    renamed
}

/// Map every cell of the named columns through `replace`
///
/// Slugs the store lacks are ignored.
pub fn replace_cells(store: &ColumnStore, slugs: &[ColumnSlug], replace: impl Fn(&Value) -> Value) -> ColumnStore {
    let mut replaced = store.clone();
    for slug in slugs {
        if let Some(values) = store.get(slug) {
            replaced.insert(slug, values.iter().map(&replace).collect());
        }
    }
    replaced
}

/// Replace zero and negative numbers with [`ErrorValue::InvalidOnALogScale`]
pub fn replace_non_positives(store: &ColumnStore, slugs: &[ColumnSlug]) -> ColumnStore {
    replace_cells(store, slugs, |value| match value {
        Value::Number(n) if *n <= 0.0 => Value::Invalid(ErrorValue::InvalidOnALogScale),
        other => other.clone(),
    })
}

/// Sample `how_many` distinct indices below `len`, reproducibly for a seed
pub fn get_drop_indexes(len: usize, how_many: usize, seed: u64) -> BTreeSet<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    sample(&mut rng, len, how_many.min(len)).into_iter().collect()
}

/// Replace `how_many` random cells in each named column
pub fn replace_random_cells_in_column_store(
    store: &ColumnStore,
    how_many: usize,
    slugs: &[ColumnSlug],
    seed: u64,
    replacement: impl Fn() -> Value,
) -> ColumnStore {
    let mut replaced = store.clone();
    for slug in slugs {
        if let Some(values) = store.get(slug) {
            let drop = get_drop_indexes(values.len(), how_many, seed);
            let column = values
                .iter()
                .enumerate()
                .map(|(index, value)| if drop.contains(&index) { replacement() } else { value.clone() })
                .collect();
            replaced.insert(slug, column);
        }
    }
    replaced
}

/// Stable permutation of row indices ordered by the given keys
///
/// `orders` pairs with `slugs` by position; missing entries sort ascending.
/// Slugs the store lacks do not take part in the comparison.
pub fn sort_permutation(store: &ColumnStore, slugs: &[ColumnSlug], orders: &[SortOrder]) -> Vec<usize> {
    let keys: Vec<(&[Value], SortOrder)> = slugs
        .iter()
        .enumerate()
        .filter_map(|(i, slug)| {
            store
                .get(slug)
                .map(|values| (values, orders.get(i).copied().unwrap_or_default()))
        })
        .collect();

    let mut permutation: Vec<usize> = (0..store.num_rows()).collect();
    permutation.sort_by(|&a, &b| {
        for (values, order) in &keys {
            let ordering = values[a].cmp(&values[b]);
            let ordering = match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    permutation
}

/// Reorder every column by one shared permutation
pub fn apply_permutation(store: &ColumnStore, permutation: &[usize]) -> ColumnStore {
    store
        .iter()
        .map(|(slug, values)| {
            let column = permutation.iter().map(|&i| values[i].clone()).collect();
            (slug.to_string(), column)
        })
        .collect()
}

/// Sort rows by one or more columns, keeping every column aligned
pub fn sort_column_store(store: &ColumnStore, slugs: &[ColumnSlug], orders: &[SortOrder]) -> ColumnStore {
    apply_permutation(store, &sort_permutation(store, slugs, orders))
}

/// Composite key of the given columns at one row
pub fn row_key(store: &ColumnStore, slugs: &[ColumnSlug], row_index: usize) -> Vec<Value> {
    slugs.iter().map(|slug| store.cell(slug, row_index)).collect()
}

/// Infer a def from a slug and one sample value
pub fn guess_column_def_from_slug_and_value(slug: &str, sample: &Value) -> ColumnDef {
    match slug {
        "Entity" => ColumnDef::new(slug, ColumnTypeName::EntityName).with_name(slug),
        well_known_slugs::DAY => ColumnDef::new(slug, ColumnTypeName::Day).with_name("Day"),
        well_known_slugs::YEAR | "Year" => ColumnDef::new(slug, ColumnTypeName::Year).with_name("Year"),
        well_known_slugs::ENTITY_NAME => ColumnDef::new(slug, ColumnTypeName::EntityName).with_name("Entity"),
        well_known_slugs::ENTITY_CODE => ColumnDef::new(slug, ColumnTypeName::EntityCode).with_name("Code"),
        well_known_slugs::ENTITY_ID => ColumnDef::new(slug, ColumnTypeName::EntityId).with_name("Entity ID"),
        "date" => ColumnDef::new(slug, ColumnTypeName::Date).with_name("Date"),
        _ => {
            let looks_numeric = match sample {
                Value::Number(_) => true,
                Value::Text(s) => !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
                _ => false,
            };
            let column_type = if looks_numeric {
                ColumnTypeName::Numeric
            } else {
                ColumnTypeName::String
            };
            ColumnDef::new(slug, column_type).with_name(slug)
        }
    }
}

/// Infer defs for every slug of `store` not already in `defined`
///
/// The sample for each column is its first non-empty cell.
pub fn autodetect_column_defs(store: &ColumnStore, defined: &HashSet<&str>) -> Vec<ColumnDef> {
    store
        .iter()
        .filter(|(slug, _)| !defined.contains(slug))
        .map(|(slug, values)| {
            let sample = values
                .iter()
                .find(|value| !matches!(value, Value::Empty) && value.as_str() != Some(""))
                .cloned()
                .unwrap_or_default();
            guess_column_def_from_slug_and_value(slug, &sample)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::Number).collect()
    }

    fn sample_store() -> ColumnStore {
        ColumnStore::new()
            .with_column("country", vec!["fr".into(), "de".into(), "fr".into()])
            .with_column("pop", numbers(&[67.0, 83.0, 66.0]))
    }

    #[test]
    fn test_rows_round_trip() {
        let store = sample_store();
        let rows = column_store_to_rows(&store);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], Row::new().with("country", "de").with("pop", 83.0));
        assert_eq!(rows_to_column_store(&rows), store);
    }

    #[test]
    fn test_rows_with_reordered_and_missing_slugs() {
        let rows = vec![
            Row::new().with("country", "fr").with("pop", 67.0),
            Row::new().with("pop", 83.0).with("country", "de"),
            Row::new().with("country", "it").with("extra", 1.0),
        ];
        let expected = ColumnStore::new()
            .with_column("country", vec!["fr".into(), "de".into(), "it".into()])
            .with_column("pop", vec![Value::Number(67.0), Value::Number(83.0), Value::Empty]);
        assert_eq!(rows_to_column_store(&rows), expected);
    }

    #[test]
    fn test_wide_rows_convert_in_column_order() {
        let slugs: Vec<String> = (0..200).map(|i| format!("c{i}")).collect();
        let row: Row = slugs.iter().rev().map(|slug| (slug.as_str(), slug.as_str())).collect();
        let store = rows_to_column_store(&vec![row; 50]);
        assert_eq!(store.num_columns(), 200);
        assert_eq!(store.num_rows(), 50);
        assert_eq!(store.slugs()[0], "c199");
        assert_eq!(store.get("c7").unwrap()[49], Value::from("c7"));
        assert_eq!(column_store_to_rows(&store)[0].value("c0"), Value::from("c0"));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(rows_to_column_store(&[]).is_empty());
        assert!(column_store_to_rows(&ColumnStore::new()).is_empty());
        assert!(concat_column_stores(&[], None).is_empty());
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut store = sample_store();
        store.insert("country", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(store.slugs(), &["country".to_string(), "pop".to_string()]);

        store.remove("country");
        assert_eq!(store.slugs(), &["pop".to_string()]);
        assert_eq!(store.get("pop").map(<[Value]>::len), Some(3));
    }

    #[test]
    fn test_concat_fills_missing_columns() {
        let a = ColumnStore::new()
            .with_column("x", numbers(&[1.0]))
            .with_column("y", numbers(&[2.0]));
        let b = ColumnStore::new()
            .with_column("y", numbers(&[3.0, 4.0]))
            .with_column("z", numbers(&[5.0, 6.0]));

        let merged = concat_column_stores(&[&a, &b], None);
        let missing = Value::Invalid(ErrorValue::MissingValuePlaceholder);
        assert_eq!(merged.slugs(), &["x".to_string(), "y".to_string(), "z".to_string()]);
        assert_eq!(merged.get("x").unwrap(), &[Value::Number(1.0), missing.clone(), missing.clone()]);
        assert_eq!(merged.get("y").unwrap(), numbers(&[2.0, 3.0, 4.0]).as_slice());
        assert_eq!(merged.get("z").unwrap(), &[missing, Value::Number(5.0), Value::Number(6.0)]);
    }

    #[test]
    fn test_rename() {
        let renamed = rename_column_store(
            &sample_store(),
            &HashMap::from([("pop".to_string(), "population".to_string())]),
        );
        assert_eq!(renamed.slugs(), &["country".to_string(), "population".to_string()]);
        assert_eq!(renamed.get("population"), sample_store().get("pop"));
    }

    #[test]
    fn test_sort_multiple_keys() {
        let store = sample_store();
        let sorted = sort_column_store(
            &store,
            &["country".to_string(), "pop".to_string()],
            &[SortOrder::Asc, SortOrder::Desc],
        );
        assert_eq!(
            sorted.get("country").unwrap(),
            &[Value::from("de"), Value::from("fr"), Value::from("fr")]
        );
        assert_eq!(sorted.get("pop").unwrap(), numbers(&[83.0, 67.0, 66.0]).as_slice());
    }

    #[test]
    fn test_replace_non_positives() {
        let store = ColumnStore::new().with_column("v", numbers(&[-1.0, 0.0, 2.0]));
        let replaced = replace_non_positives(&store, &["v".to_string()]);
        let invalid = Value::Invalid(ErrorValue::InvalidOnALogScale);
        assert_eq!(replaced.get("v").unwrap(), &[invalid.clone(), invalid, Value::Number(2.0)]);
        assert_eq!(store.get("v").unwrap(), numbers(&[-1.0, 0.0, 2.0]).as_slice());
    }

    #[test]
    fn test_drop_indexes_are_reproducible() {
        let first = get_drop_indexes(100, 10, 42);
        assert_eq!(first.len(), 10);
        assert!(first.iter().all(|&i| i < 100));
        assert_eq!(first, get_drop_indexes(100, 10, 42));
        assert_eq!(get_drop_indexes(3, 10, 1).len(), 3);
    }

    #[test]
    fn test_replace_random_cells() {
        let store = ColumnStore::new().with_column("v", numbers(&[1.0, 2.0, 3.0, 4.0]));
        let replaced = replace_random_cells_in_column_store(&store, 2, &["v".to_string()], 7, || {
            Value::Invalid(ErrorValue::DroppedForTesting)
        });
        let dropped = replaced.get("v").unwrap().iter().filter(|v| v.is_missing()).count();
        assert_eq!(dropped, 2);
    }

    #[test_case("Entity", Value::from("France"), ColumnTypeName::EntityName; "entity")]
    #[test_case("day", Value::Number(3.0), ColumnTypeName::Day; "day")]
    #[test_case("Year", Value::from("2000"), ColumnTypeName::Year; "capital year")]
    #[test_case("entityCode", Value::from("FRA"), ColumnTypeName::EntityCode; "entity code")]
    #[test_case("entityId", Value::Number(1.0), ColumnTypeName::EntityId; "entity id")]
    #[test_case("date", Value::from("2020-01-01"), ColumnTypeName::Date; "date")]
    #[test_case("gdp", Value::Number(1.5), ColumnTypeName::Numeric; "number sample")]
    #[test_case("count", Value::from("123"), ColumnTypeName::Numeric; "digit string")]
    #[test_case("ratio", Value::from("1.5"), ColumnTypeName::String; "decimal string stays text")]
    #[test_case("notes", Value::Empty, ColumnTypeName::String; "no sample")]
    fn test_guess_column_def(slug: &str, sample: Value, expected: ColumnTypeName) {
        assert_eq!(guess_column_def_from_slug_and_value(slug, &sample).column_type, expected);
    }

    #[test]
    fn test_autodetect_skips_defined_and_blank_samples() {
        let store = ColumnStore::new()
            .with_column("a", vec!["".into(), "12".into()])
            .with_column("b", vec!["x".into(), "y".into()]);
        let defs = autodetect_column_defs(&store, &HashSet::from(["b"]));
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].slug, "a");
        assert_eq!(defs[0].column_type, ColumnTypeName::Numeric);
    }

    proptest! {
        #[test]
        fn prop_reverse_twice_is_identity(values in prop::collection::vec(-1000i32..1000, 0..50)) {
            let column: Vec<Value> = values.iter().copied().map(Value::from).collect();
            let store = ColumnStore::new().with_column("v", column.clone()).with_column("w", column);
            prop_assert_eq!(reverse_column_store(&reverse_column_store(&store)), store);
        }

        #[test]
        fn prop_sort_is_stable(keys in prop::collection::vec(0i32..5, 0..40)) {
            let key_column: Vec<Value> = keys.iter().copied().map(Value::from).collect();
            let positions: Vec<Value> = (0..keys.len() as i64).map(Value::from).collect();
            let store = ColumnStore::new().with_column("k", key_column).with_column("pos", positions);
            let slugs = ["k".to_string()];

            let once = sort_column_store(&store, &slugs, &[]);
            let twice = sort_column_store(&once, &slugs, &[]);
            prop_assert_eq!(&once, &twice);

            let sorted_positions = once.get("pos").unwrap();
            let sorted_keys = once.get("k").unwrap();
            for i in 1..sorted_keys.len() {
                if sorted_keys[i - 1] == sorted_keys[i] {
                    prop_assert!(sorted_positions[i - 1] < sorted_positions[i]);
                }
            }
        }
    }
}
