//! Static column metadata

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::column_type::ColumnTypeName;
use crate::row::Row;
use crate::value::Value;

/// Column slug: the unique key of a column inside a table
pub type ColumnSlug = String;

/// Slugs the engine recognizes without a declared def
pub mod well_known_slugs {
    /// Entity display name
    pub const ENTITY_NAME: &str = "entityName";
    /// Entity short code
    pub const ENTITY_CODE: &str = "entityCode";
    /// Entity numeric id
    pub const ENTITY_ID: &str = "entityId";
    /// Generic time column
    pub const TIME: &str = "time";
    /// Day column
    pub const DAY: &str = "day";
    /// Year column
    pub const YEAR: &str = "year";
}

/// Formula that computes one cell from an input row and its index
#[derive(Clone)]
pub struct ColumnGenerator(Arc<dyn Fn(&Row, usize) -> Value + Send + Sync>);

impl ColumnGenerator {
    /// Wrap a closure
    pub fn new(f: impl Fn(&Row, usize) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluate the formula
    pub fn call(&self, row: &Row, index: usize) -> Value {
        (self.0)(row, index)
    }
}

impl fmt::Debug for ColumnGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ColumnGenerator(..)")
    }
}

/// Definition of a column: how to parse it and, optionally, how to compute it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Unique key
    pub slug: ColumnSlug,

    /// Declared type
    #[serde(rename = "type", default)]
    pub column_type: ColumnTypeName,

    /// Display name (defaults to the slug)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional color hint for renderers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Optional unit label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Precomputed values, one per input row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,

    /// Formula evaluated per input row
    #[serde(skip)]
    pub generator: Option<ColumnGenerator>,
}

impl ColumnDef {
    /// Create a def with a slug and a type
    pub fn new(slug: &str, column_type: ColumnTypeName) -> Self {
        Self {
            slug: slug.to_string(),
            column_type,
            ..Default::default()
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set the color
    #[must_use]
    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    /// Set the unit
    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Supply precomputed values
    #[must_use]
    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }

    /// Supply a formula
    #[must_use]
    pub fn with_generator(mut self, f: impl Fn(&Row, usize) -> Value + Send + Sync + 'static) -> Self {
        self.generator = Some(ColumnGenerator::new(f));
        self
    }

    /// Whether this column is produced by a formula or precomputed values
    pub fn is_computed(&self) -> bool {
        self.values.is_some() || self.generator.is_some()
    }

    /// Display name, falling back to the slug
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.slug)
    }
}

/// Replace defs whose slug appears in `new_defs`, keep the rest
pub fn replace_def(defs: &[ColumnDef], new_defs: &[ColumnDef]) -> Vec<ColumnDef> {
    defs.iter()
        .map(|def| {
            new_defs
                .iter()
                .find(|new_def| new_def.slug == def.slug)
                .unwrap_or(def)
                .clone()
        })
        .collect()
}
