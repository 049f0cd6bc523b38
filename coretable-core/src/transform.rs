//! Row and column transforms that derive a child table from one parent

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::column_def::{well_known_slugs, ColumnDef, ColumnSlug};
use crate::column_store::{
    apply_permutation, get_drop_indexes, rename_column_store, replace_non_positives,
    replace_random_cells_in_column_store, reverse_column_store, sort_column_store, sort_permutation, ColumnStore,
    SortOrder,
};
use crate::delimited::rows_from_matrix;
use crate::diagnostics::TransformType;
use crate::error::{Error, Result};
use crate::filter_mask::FilterMask;
use crate::interpolation::{Interpolation, LinearInterpolation, ToleranceInterpolation};
use crate::row::Row;
use crate::table::{CoreTable, TableOptions};
use crate::value::{ErrorValue, Time, Value};

fn comma_list<S: AsRef<str>>(slugs: &[S]) -> String {
    slugs.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",")
}

fn owned_slugs(slugs: &[&str]) -> Vec<ColumnSlug> {
    slugs.iter().map(|slug| (*slug).to_string()).collect()
}

impl CoreTable {
    fn require_all(&self, slugs: &[&str]) -> Result<()> {
        match slugs.iter().find(|slug| !self.has(slug)) {
            Some(missing) => Err(Error::UnknownColumn((*missing).to_string())),
            None => Ok(()),
        }
    }

    fn with_mask(&self, mask: FilterMask, description: impl Into<String>) -> CoreTable {
        self.derive(
            self.column_store().clone(),
            self.defs().to_vec(),
            description,
            TransformType::FilterRows,
            Some(mask),
        )
    }

    fn with_defs(&self, defs: Vec<ColumnDef>, description: impl Into<String>, category: TransformType) -> CoreTable {
        self.derive(self.column_store().clone(), defs, description, category, None)
    }

    /// Keep rows where `predicate(row, index)` holds
    pub fn row_filter(&self, predicate: impl Fn(&Row, usize) -> bool, description: &str) -> CoreTable {
        let keep = self
            .iter_rows()
            .enumerate()
            .map(|(index, row)| predicate(&row, index))
            .collect();
        self.with_mask(FilterMask::from_bools(self.num_rows(), keep), description)
    }

    /// Keep rows where `predicate(value, index)` holds for one column
    pub fn column_filter(
        &self,
        slug: &str,
        predicate: impl Fn(&Value, usize) -> bool,
        description: &str,
    ) -> Result<CoreTable> {
        let keep = self
            .get_values_for(slug)?
            .iter()
            .enumerate()
            .map(|(index, value)| predicate(value, index))
            .collect();
        Ok(self.with_mask(FilterMask::from_bools(self.num_rows(), keep), description))
    }

    /// Keep rows whose cells, joined by spaces, contain `search`
    pub fn grep(&self, search: &str) -> CoreTable {
        self.row_filter(
            |row, _| {
                row.values()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
                    .contains(search)
            },
            &format!("Kept rows that matched '{search}'"),
        )
    }

    /// Keep columns whose slug contains `search`
    pub fn grep_columns(&self, search: &str) -> CoreTable {
        let defs: Vec<ColumnDef> = self
            .defs()
            .iter()
            .filter(|def| def.slug.contains(search))
            .cloned()
            .collect();
        let description = format!("Kept {} columns that matched '{search}'", defs.len());
        self.with_defs(defs, description, TransformType::FilterColumns)
    }

    /// Rows the previous row filter removed
    ///
    /// A table without a row filter is its own opposite.
    pub fn opposite(&self) -> CoreTable {
        let (Some(parent), Some(mask)) = (self.parent(), self.filter_mask()) else {
            return self.clone();
        };
        self.derive(
            parent.column_store().clone(),
            self.defs().to_vec(),
            "Inversing previous filter",
            TransformType::InverseFilterRows,
            Some(mask.inverse()),
        )
    }

    /// Columns of the parent this table does not have
    pub fn opposite_columns(&self) -> CoreTable {
        let Some(parent) = self.parent() else {
            return self.clone();
        };
        let defs = parent
            .defs()
            .iter()
            .filter(|def| !self.has(&def.slug))
            .cloned()
            .collect();
        self.derive(
            parent.column_store().clone(),
            defs,
            "Inversing previous column filter",
            TransformType::InverseFilterColumns,
            None,
        )
    }

    /// Keep rows matching every `slug = value` pair of `query`
    pub fn where_(&self, query: &Row) -> Result<CoreTable> {
        let indices = self.find_rows_indices(query)?;
        let conditions: Vec<String> = query.iter().map(|(slug, value)| format!("{slug}={value}")).collect();
        let description = format!("Selecting {} rows where {}", indices.len(), conditions.join("&"));
        Ok(self.with_mask(FilterMask::from_indices(self.num_rows(), &indices, true), description))
    }

    /// Keep at most `how_many` rows starting at `offset`
    pub fn limit(&self, how_many: usize, offset: usize) -> CoreTable {
        let end = offset.saturating_add(how_many);
        let keep = (0..self.num_rows()).map(|index| index >= offset && index < end).collect();
        self.with_mask(
            FilterMask::from_bools(self.num_rows(), keep),
            format!("Kept {how_many} rows starting at {offset}"),
        )
    }

    /// Keep at most `how_many` columns starting at `offset`
    pub fn limit_columns(&self, how_many: usize, offset: usize) -> CoreTable {
        let defs: Vec<ColumnDef> = self.defs().iter().skip(offset).take(how_many).cloned().collect();
        let description = format!("Kept {} columns starting at {offset}", defs.len());
        self.with_defs(defs, description, TransformType::FilterColumns)
    }

    /// Keep only these columns, in table order
    pub fn select(&self, slugs: &[&str]) -> Result<CoreTable> {
        self.require_all(slugs)?;
        let keep: HashSet<&str> = slugs.iter().copied().collect();
        let defs = self
            .defs()
            .iter()
            .filter(|def| keep.contains(def.slug.as_str()))
            .cloned()
            .collect();
        Ok(self.with_defs(defs, format!("Kept columns '{}'", comma_list(slugs)), TransformType::FilterColumns))
    }

    /// Remove these columns
    pub fn drop_columns(&self, slugs: &[&str]) -> Result<CoreTable> {
        self.require_all(slugs)?;
        Ok(self.without_columns(slugs, format!("Dropped columns '{}'", comma_list(slugs))))
    }

    fn without_columns(&self, slugs: &[&str], description: String) -> CoreTable {
        let drop: HashSet<&str> = slugs.iter().copied().collect();
        let defs = self
            .defs()
            .iter()
            .filter(|def| !drop.contains(def.slug.as_str()))
            .cloned()
            .collect();
        self.with_defs(defs, description, TransformType::FilterColumns)
    }

    /// Remove every column holding a single value across all rows
    pub fn drop_constant_columns(&self) -> CoreTable {
        let slugs: Vec<&str> = self.constant_columns().iter().map(|column| column.slug()).collect();
        self.without_columns(&slugs, format!("Dropped constant columns '{}'", comma_list(&slugs)))
    }

    /// Stable multi-column sort; `orders` pairs with `slugs` and defaults to ascending
    pub fn sort_by(&self, slugs: &[&str], orders: &[SortOrder]) -> Result<CoreTable> {
        self.require_all(slugs)?;
        let store = sort_column_store(self.column_store(), &owned_slugs(slugs), orders);
        let orders: Vec<String> = orders.iter().map(|order| format!("{order:?}").to_lowercase()).collect();
        Ok(self.derive(
            store,
            self.defs().to_vec(),
            format!("Sort by {} {}", comma_list(slugs), orders.join(",")).trim_end().to_string(),
            TransformType::SortRows,
            None,
        ))
    }

    /// Move these columns to the front, keeping the rest in order
    pub fn sort_columns(&self, slugs: &[&str]) -> Result<CoreTable> {
        self.require_all(slugs)?;
        let first: HashSet<&str> = slugs.iter().copied().collect();
        let mut defs: Vec<ColumnDef> = Vec::with_capacity(self.num_columns());
        for slug in slugs {
            if let Some(def) = self.defs().iter().find(|def| def.slug == *slug) {
                defs.push(def.clone());
            }
        }
        defs.extend(
            self.defs()
                .iter()
                .filter(|def| !first.contains(def.slug.as_str()))
                .cloned(),
        );
        Ok(self.with_defs(defs, "Sorted columns", TransformType::SortColumns))
    }

    /// Reverse the row order
    pub fn reverse(&self) -> CoreTable {
        self.derive(
            reverse_column_store(self.column_store()),
            self.defs().to_vec(),
            "Reversed row order",
            TransformType::SortRows,
            None,
        )
    }

    /// Remove rows at these positions
    pub fn drop_rows_at(&self, indices: &[usize], description: Option<&str>) -> CoreTable {
        let description = description.map_or_else(|| format!("Dropping {} rows", indices.len()), str::to_string);
        self.with_mask(FilterMask::from_indices(self.num_rows(), indices, false), description)
    }

    /// Remove later copies of repeated rows
    pub fn drop_duplicate_rows(&self) -> CoreTable {
        self.drop_rows_at(&self.duplicate_row_indices(), None)
    }

    /// Remove `how_many` rows chosen reproducibly from `seed`, preserving order
    pub fn drop_random_rows(&self, how_many: usize, seed: u64) -> CoreTable {
        if how_many == 0 {
            return self.clone();
        }
        let indices: Vec<usize> = get_drop_indexes(self.num_rows(), how_many, seed).into_iter().collect();
        self.drop_rows_at(&indices, Some(&format!("Dropping a random {how_many} rows")))
    }

    /// Remove roughly `percent` percent of rows
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn drop_random_percent(&self, percent: f64, seed: u64) -> CoreTable {
        let how_many = ((percent / 100.0) * self.num_rows() as f64).floor().max(0.0) as usize;
        self.drop_random_rows(how_many, seed)
    }

    /// Rename columns, keeping their position and def otherwise
    pub fn rename_columns(&self, renames: &[(&str, &str)]) -> Result<CoreTable> {
        let old: Vec<&str> = renames.iter().map(|(from, _)| *from).collect();
        self.require_all(&old)?;
        let rename_map: HashMap<ColumnSlug, ColumnSlug> = renames
            .iter()
            .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
            .collect();
        let defs = self
            .defs()
            .iter()
            .map(|def| match rename_map.get(&def.slug) {
                Some(slug) => ColumnDef {
                    slug: slug.clone(),
                    ..def.clone()
                },
                None => def.clone(),
            })
            .collect();
        let description = format!(
            "Renamed {}",
            renames
                .iter()
                .map(|(from, to)| format!("'{from}' to '{to}'"))
                .collect::<Vec<_>>()
                .join(" and ")
        );
        Ok(self.derive(
            rename_column_store(self.column_store(), &rename_map),
            defs,
            description,
            TransformType::RenameColumns,
            None,
        ))
    }

    /// Map every def through `update`
    pub fn update_defs(&self, update: impl FnMut(ColumnDef) -> ColumnDef) -> CoreTable {
        let defs = self.defs().iter().cloned().map(update).collect();
        self.with_defs(defs, "Updated column defs", TransformType::UpdateColumnDefs)
    }

    /// Add columns after the existing ones
    ///
    /// Defs carrying values or a generator are computed for the new table.
    pub fn append_columns(&self, defs: Vec<ColumnDef>) -> CoreTable {
        let description = format!(
            "Appended columns {}",
            defs.iter()
                .map(|def| format!("'{}'", def.slug))
                .collect::<Vec<_>>()
                .join(" and ")
        );
        let mut all_defs = self.defs().to_vec();
        all_defs.extend(defs);
        self.with_defs(all_defs, description, TransformType::AppendColumns)
    }

    /// Add only the columns whose slug is not already present
    pub fn append_columns_if_new(&self, defs: Vec<ColumnDef>) -> CoreTable {
        self.append_columns(defs.into_iter().filter(|def| !self.has(&def.slug)).collect())
    }

    /// Add rows after the existing ones
    ///
    /// New rows are loaded with this table's defs, so they are parsed and
    /// computed like a fresh input before being stacked.
    pub fn append_rows(&self, rows: Vec<Row>, description: &str) -> CoreTable {
        let options = TableOptions {
            table_description: description.to_string(),
            ..self.options().clone()
        };
        // Precomputed values belong to this table's rows, not the new ones
        let defs = self
            .defs()
            .iter()
            .map(|def| ColumnDef {
                values: None,
                ..def.clone()
            })
            .collect();
        let appended = CoreTable::with_options(rows, defs, options);
        self.stack(&[appended], description, TransformType::AppendRows)
    }

    /// Replace zero and negative numbers in these columns with a log-scale sentinel
    pub fn replace_non_positive_cells_for_log_scale(&self, slugs: &[&str]) -> Result<CoreTable> {
        self.require_all(slugs)?;
        Ok(self.derive(
            replace_non_positives(self.column_store(), &owned_slugs(slugs)),
            self.defs().to_vec(),
            format!("Replaced negative or zero cells across columns {}", slugs.join(" and ")),
            TransformType::UpdateRows,
            None,
        ))
    }

    /// Replace `how_many` random cells per column with [`ErrorValue::DroppedForTesting`]
    pub fn replace_random_cells(&self, how_many: usize, slugs: &[&str], seed: u64) -> Result<CoreTable> {
        self.replace_random_cells_with(how_many, slugs, seed, || Value::Invalid(ErrorValue::DroppedForTesting))
    }

    /// Replace `how_many` random cells per column with generated values
    pub fn replace_random_cells_with(
        &self,
        how_many: usize,
        slugs: &[&str],
        seed: u64,
        replacement: impl Fn() -> Value,
    ) -> Result<CoreTable> {
        self.require_all(slugs)?;
        Ok(self.derive(
            replace_random_cells_in_column_store(self.column_store(), how_many, &owned_slugs(slugs), seed, replacement),
            self.defs().to_vec(),
            format!("Replaced a random {how_many} cells in {}", slugs.join(" and ")),
            TransformType::UpdateRows,
            None,
        ))
    }

    /// Keep rows whose cell is greater than `value`
    ///
    /// Only values of the same kind compare; sentinels never pass.
    pub fn is_greater_than(&self, slug: &str, value: &Value, description: Option<&str>) -> Result<CoreTable> {
        let description = description.map_or_else(|| format!("Filter where {slug} > {value}"), str::to_string);
        self.column_filter(
            slug,
            |cell, _| cell.compare_like(value) == Some(Ordering::Greater),
            &description,
        )
    }

    /// Keep rows whose cell is a number at least zero
    pub fn filter_negatives(&self, slug: &str) -> Result<CoreTable> {
        self.column_filter(
            slug,
            |cell, _| cell.as_number().is_some_and(|n| n >= 0.0),
            &format!("Filter negative values for {slug}"),
        )
    }

    /// Keep rows whose cell is a positive number
    pub fn filter_negatives_for_log_scale(&self, slug: &str) -> Result<CoreTable> {
        self.is_greater_than(
            slug,
            &Value::Number(0.0),
            Some(&format!("Remove rows if {slug} is <= 0 for log scale")),
        )
    }

    /// Replace every row from a header-first grid, keeping the defs
    pub fn reload_from_grid(&self, grid: &[Vec<Value>]) -> CoreTable {
        let rows = rows_from_matrix(grid);
        let description = format!("Reloaded {} rows", rows.len());
        self.derive(rows, self.defs().to_vec(), description, TransformType::Reload, None)
    }

    /// Fill gaps in one column by linear interpolation over time
    ///
    /// Rows are sorted by `group_slug` (when given) and then by the time
    /// column; each group is interpolated on its own. Rows without a usable
    /// time are never filled.
    pub fn interpolate_column_linearly(
        &self,
        value_slug: &str,
        group_slug: Option<&str>,
        policy: LinearInterpolation,
    ) -> Result<CoreTable> {
        let mut series = self.sorted_for_interpolation(value_slug, group_slug)?;
        series.fill(&policy, ErrorValue::NoValueForInterpolation);
        let mut store = series.store;
        store.insert(value_slug, series.values);
        Ok(self.derive(
            store,
            self.defs().to_vec(),
            format!("Interpolated values linearly in {value_slug}"),
            TransformType::UpdateRows,
            None,
        ))
    }

    /// Fill gaps in one column from the nearest valid row within `time_tolerance`
    ///
    /// The time cell each value was borrowed from is kept in a new column
    /// named `{value_slug}-originalTime`.
    pub fn interpolate_column_with_tolerance(
        &self,
        value_slug: &str,
        group_slug: Option<&str>,
        time_tolerance: Time,
    ) -> Result<CoreTable> {
        let mut series = self.sorted_for_interpolation(value_slug, group_slug)?;
        series.fill(&ToleranceInterpolation { time_tolerance }, ErrorValue::NoValueWithinTolerance);
        let original_times = series.source_time_cells();

        let time_type = self
            .time_column()
            .map(|column| column.type_name().clone())
            .unwrap_or_default();
        let original_time_slug = format!("{value_slug}-originalTime");
        let mut store = series.store;
        store.insert(value_slug, series.values);
        store.insert(&original_time_slug, original_times);

        let mut defs = self.defs().to_vec();
        defs.retain(|def| def.slug != original_time_slug);
        defs.push(ColumnDef::new(&original_time_slug, time_type));
        Ok(self.derive(
            store,
            defs,
            format!("Interpolated values in {value_slug} with tolerance {time_tolerance}"),
            TransformType::UpdateRows,
            None,
        ))
    }

    /// Sort by group and time, then split into per-group ranges
    ///
    /// Times come from the time column's type, so date text sorts and
    /// measures by day. Rows without a usable time sort last in their group.
    fn sorted_for_interpolation(&self, value_slug: &str, group_slug: Option<&str>) -> Result<TimeSeries> {
        self.require_all(&[value_slug])?;
        if let Some(group) = group_slug {
            self.require_all(&[group])?;
        }
        let time_column = self
            .time_column()
            .ok_or_else(|| Error::UnknownColumn(well_known_slugs::TIME.to_string()))?;
        let time_type = time_column.column_type();
        let unsorted_times: Vec<Option<Time>> =
            time_column.all_values().iter().map(|cell| time_type.to_time(cell)).collect();

        let mut sort_keys = ColumnStore::new();
        let mut key_slugs: Vec<ColumnSlug> = Vec::new();
        if let Some(cells) = group_slug.and_then(|group| self.column_store().get(group)) {
            sort_keys.insert("group", cells.to_vec());
            key_slugs.push("group".to_string());
        }
        sort_keys.insert(
            "time",
            unsorted_times.iter().map(|time| time.map_or(Value::Empty, Value::from)).collect(),
        );
        key_slugs.push("time".to_string());
        let permutation = sort_permutation(&sort_keys, &key_slugs, &[]);
        let store = apply_permutation(self.column_store(), &permutation);

        let known: Vec<Option<Time>> = permutation.iter().map(|&index| unsorted_times[index]).collect();
        let time_cells = store.get(time_column.slug()).map(<[Value]>::to_vec).unwrap_or_default();
        let values = store.get(value_slug).map(<[Value]>::to_vec).unwrap_or_default();

        let mut cells_by_time: HashMap<Time, Value> = HashMap::new();
        for (time, cell) in known.iter().zip(&time_cells) {
            if let Some(time) = time {
                cells_by_time.entry(*time).or_insert_with(|| cell.clone());
            }
        }

        let mut groups = Vec::new();
        let group_values = group_slug.and_then(|group| store.get(group));
        let mut start = 0;
        for index in 1..=values.len() {
            let boundary = index == values.len()
                || group_values.is_some_and(|cells| cells[index] != cells[index - 1]);
            if boundary {
                let timed_end = (start..index).find(|&i| known[i].is_none()).unwrap_or(index);
                groups.push((start, timed_end, index));
                start = index;
            }
        }

        Ok(TimeSeries {
            times: known.iter().map(|time| time.unwrap_or_default()).collect(),
            store,
            values,
            time_cells,
            cells_by_time,
            groups,
        })
    }
}

/// One value column sorted by group and time, ready for gap filling
struct TimeSeries {
    store: ColumnStore,
    values: Vec<Value>,
    times: Vec<Time>,
    /// Time cells as stored, in sorted order
    time_cells: Vec<Value>,
    cells_by_time: HashMap<Time, Value>,
    /// `(start, timed_end, end)`; rows in `timed_end..end` have no usable time
    groups: Vec<(usize, usize, usize)>,
}

impl TimeSeries {
    fn fill(&mut self, policy: &impl Interpolation, unfillable: ErrorValue) {
        for &(start, timed_end, end) in &self.groups {
            policy.interpolate(&mut self.values, &mut self.times, start, timed_end);
            for value in &mut self.values[timed_end..end] {
                if !value.is_valid() {
                    *value = Value::Invalid(unfillable);
                }
            }
        }
    }

    /// The time cell each row's value came from
    fn source_time_cells(&self) -> Vec<Value> {
        let mut cells = self.time_cells.clone();
        for &(start, timed_end, _) in &self.groups {
            for index in start..timed_end {
                let time = self.times[index];
                cells[index] = self.cells_by_time.get(&time).cloned().unwrap_or_else(|| Value::from(time));
            }
        }
        cells
    }
}
