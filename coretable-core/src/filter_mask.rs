//! Boolean row selection over a column store

use std::collections::HashSet;

use tracing::warn;

use crate::column_store::ColumnStore;

/// Immutable selection over row positions
///
/// A mask is always sized to the store it was built against, which for a
/// child table is the parent's store. Inverting therefore selects against
/// the pre-filter universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMask {
    mask: Vec<bool>,
}

impl FilterMask {
    /// Wrap an explicit selection, padding with `false` or truncating to `num_rows`
    pub fn from_bools(num_rows: usize, mut mask: Vec<bool>) -> Self {
        if mask.len() != num_rows {
            warn!(expected = num_rows, actual = mask.len(), "Filter mask length mismatch");
            mask.resize(num_rows, false);
        }
        Self { mask }
    }

    /// Select by row index
    ///
    /// With `keep_these` the listed rows are kept, otherwise they are the
    /// ones excluded.
    pub fn from_indices(num_rows: usize, indices: &[usize], keep_these: bool) -> Self {
        let set: HashSet<usize> = indices.iter().copied().collect();
        let mask = (0..num_rows)
            .map(|index| if set.contains(&index) { keep_these } else { !keep_these })
            .collect();
        Self { mask }
    }

    /// A new mask with every bit flipped
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            mask: self.mask.iter().map(|bit| !bit).collect(),
        }
    }

    /// Keep, for every column, the values at selected positions
    pub fn apply(&self, store: &ColumnStore) -> ColumnStore {
        store
            .iter()
            .map(|(slug, values)| {
                let kept = values
                    .iter()
                    .zip(&self.mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(value, _)| value.clone())
                    .collect();
                (slug.to_string(), kept)
            })
            .collect()
    }

    /// Whether the row at `index` is selected
    pub fn is_selected(&self, index: usize) -> bool {
        self.mask.get(index).copied().unwrap_or(false)
    }

    /// Number of rows the mask covers
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    /// Whether the mask covers no rows
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Number of selected rows
    pub fn num_selected(&self) -> usize {
        self.mask.iter().filter(|&&bit| bit).count()
    }
}
