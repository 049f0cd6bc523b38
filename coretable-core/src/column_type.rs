//! Column type collaborators: how raw cells become typed values
//!
//! The engine only relies on the [`ColumnType`] contract. The built-in
//! types below are intentionally minimal; richer parsing (currencies,
//! calendars, locales) plugs in through [`ColumnTypeRegistry::register`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::value::{ErrorValue, Time, Value};

/// Name of a column type as declared in a column definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnTypeName {
    /// Free text
    #[default]
    String,
    /// Floating point numbers
    Numeric,
    /// Whole numbers
    Integer,
    /// Calendar year
    Year,
    /// Day offset
    Day,
    /// ISO date text
    Date,
    /// Booleans
    Boolean,
    /// Entity (country, region) display name
    EntityName,
    /// Entity short code
    EntityCode,
    /// Entity numeric id
    EntityId,
    /// A type supplied by a registered collaborator
    Custom(String),
}

impl ColumnTypeName {
    /// Name as it appears in serialized defs
    pub fn as_str(&self) -> &str {
        match self {
            ColumnTypeName::String => "String",
            ColumnTypeName::Numeric => "Numeric",
            ColumnTypeName::Integer => "Integer",
            ColumnTypeName::Year => "Year",
            ColumnTypeName::Day => "Day",
            ColumnTypeName::Date => "Date",
            ColumnTypeName::Boolean => "Boolean",
            ColumnTypeName::EntityName => "EntityName",
            ColumnTypeName::EntityCode => "EntityCode",
            ColumnTypeName::EntityId => "EntityId",
            ColumnTypeName::Custom(name) => name,
        }
    }

    /// Whether this names one of the time types
    pub fn is_time(&self) -> bool {
        matches!(self, ColumnTypeName::Year | ColumnTypeName::Day | ColumnTypeName::Date)
    }
}

impl From<String> for ColumnTypeName {
    fn from(name: String) -> Self {
        match name.as_str() {
            "String" => ColumnTypeName::String,
            "Numeric" => ColumnTypeName::Numeric,
            "Integer" => ColumnTypeName::Integer,
            "Year" => ColumnTypeName::Year,
            "Day" => ColumnTypeName::Day,
            "Date" => ColumnTypeName::Date,
            "Boolean" => ColumnTypeName::Boolean,
            "EntityName" => ColumnTypeName::EntityName,
            "EntityCode" => ColumnTypeName::EntityCode,
            "EntityId" => ColumnTypeName::EntityId,
            _ => ColumnTypeName::Custom(name),
        }
    }
}

impl From<&str> for ColumnTypeName {
    fn from(name: &str) -> Self {
        ColumnTypeName::from(name.to_string())
    }
}

impl From<ColumnTypeName> for String {
    fn from(name: ColumnTypeName) -> Self {
        name.as_str().to_string()
    }
}

impl fmt::Display for ColumnTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract every column type must satisfy
pub trait ColumnType: Send + Sync + fmt::Debug {
    /// The type name this implementation answers to
    fn name(&self) -> ColumnTypeName;

    /// Convert a raw cell into a typed value or a sentinel
    fn parse(&self, raw: &Value) -> Value;

    /// Whether a raw cell still needs to go through [`ColumnType::parse`]
    fn needs_parsing(&self, value: &Value) -> bool;

    /// Value for a cell nobody filled in
    fn blank_value(&self) -> Value {
        self.parse(&Value::Empty)
    }

    /// Human readable rendering
    fn format_value(&self, value: &Value) -> String {
        value.to_string()
    }

    /// Rendering for delimited export, before quoting
    fn format_for_csv(&self, value: &Value) -> String {
        self.format_value(value)
    }

    /// Whether values of this type are numbers
    fn is_numeric(&self) -> bool {
        false
    }

    /// Time coordinate of a parsed cell, if it has one
    fn to_time(&self, value: &Value) -> Option<Time> {
        value.as_time()
    }
}

/// Text columns
#[derive(Debug)]
pub struct StringColumnType {
    name: ColumnTypeName,
}

impl ColumnType for StringColumnType {
    fn name(&self) -> ColumnTypeName {
        self.name.clone()
    }

    fn parse(&self, raw: &Value) -> Value {
        match raw {
            Value::Number(_) | Value::Boolean(_) => Value::Text(raw.to_string()),
            other => other.clone(),
        }
    }

    fn needs_parsing(&self, value: &Value) -> bool {
        matches!(value, Value::Number(_) | Value::Boolean(_))
    }
}

/// Numeric columns, optionally rounded to whole numbers
#[derive(Debug)]
pub struct NumericColumnType {
    name: ColumnTypeName,
    integer: bool,
}

impl NumericColumnType {
    fn parse_number(&self, raw: &Value) -> Value {
        let number = match raw {
            Value::Number(n) => *n,
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Value::Invalid(ErrorValue::BlankButShouldBeNumber);
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => n,
                    _ => return Value::Invalid(ErrorValue::NaNButShouldBeNumber),
                }
            }
            Value::Boolean(_) => return Value::Invalid(ErrorValue::NaNButShouldBeNumber),
            Value::Empty => return Value::Invalid(ErrorValue::UndefinedButShouldBeNumber),
            Value::Invalid(err) => return Value::Invalid(*err),
        };

        if self.integer {
            Value::Number(number.round())
        } else {
            Value::Number(number)
        }
    }
}

impl ColumnType for NumericColumnType {
    fn name(&self) -> ColumnTypeName {
        self.name.clone()
    }

    fn parse(&self, raw: &Value) -> Value {
        self.parse_number(raw)
    }

    fn needs_parsing(&self, value: &Value) -> bool {
        !matches!(value, Value::Number(_) | Value::Invalid(_))
    }

    fn is_numeric(&self) -> bool {
        true
    }
}

/// Boolean columns
#[derive(Debug)]
pub struct BooleanColumnType;

impl ColumnType for BooleanColumnType {
    fn name(&self) -> ColumnTypeName {
        ColumnTypeName::Boolean
    }

    fn parse(&self, raw: &Value) -> Value {
        match raw {
            Value::Boolean(_) | Value::Empty | Value::Invalid(_) => raw.clone(),
            Value::Number(n) if *n == 1.0 => Value::Boolean(true),
            Value::Number(n) if *n == 0.0 => Value::Boolean(false),
            Value::Number(_) => Value::Invalid(ErrorValue::NotAParseableBoolean),
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "t" => Value::Boolean(true),
                "false" | "0" | "no" | "n" | "f" => Value::Boolean(false),
                "" => Value::Empty,
                _ => Value::Invalid(ErrorValue::NotAParseableBoolean),
            },
        }
    }

    fn needs_parsing(&self, value: &Value) -> bool {
        matches!(value, Value::Number(_) | Value::Text(_))
    }
}

/// Lookup from type name to implementation
#[derive(Debug, Clone)]
pub struct ColumnTypeRegistry {
    types: HashMap<ColumnTypeName, Arc<dyn ColumnType>>,
    fallback: Arc<dyn ColumnType>,
}

static BUILTIN_REGISTRY: Lazy<Arc<ColumnTypeRegistry>> =
    Lazy::new(|| Arc::new(ColumnTypeRegistry::default()));

impl ColumnTypeRegistry {
    /// Shared registry holding only the built-in types
    pub fn builtin() -> Arc<ColumnTypeRegistry> {
        BUILTIN_REGISTRY.clone()
    }

    /// Register (or replace) a column type
    pub fn register(&mut self, column_type: Arc<dyn ColumnType>) {
        self.types.insert(column_type.name(), column_type);
    }

    /// Resolve a type name; unknown names resolve to plain text
    pub fn get(&self, name: &ColumnTypeName) -> Arc<dyn ColumnType> {
        self.types
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Whether a name resolves to a numeric type
    pub fn is_numeric(&self, name: &ColumnTypeName) -> bool {
        self.get(name).is_numeric()
    }
}

impl Default for ColumnTypeRegistry {
    fn default() -> Self {
        let fallback: Arc<dyn ColumnType> = Arc::new(StringColumnType {
            name: ColumnTypeName::String,
        });
        let mut registry = Self {
            types: HashMap::new(),
            fallback: fallback.clone(),
        };

        registry.register(fallback);
        for name in [ColumnTypeName::Date, ColumnTypeName::EntityName, ColumnTypeName::EntityCode] {
            registry.register(Arc::new(StringColumnType { name }));
        }
        registry.register(Arc::new(NumericColumnType {
            name: ColumnTypeName::Numeric,
            integer: false,
        }));
        for name in [
            ColumnTypeName::Integer,
            ColumnTypeName::Year,
            ColumnTypeName::Day,
            ColumnTypeName::EntityId,
        ] {
            registry.register(Arc::new(NumericColumnType { name, integer: true }));
        }
        registry.register(Arc::new(BooleanColumnType));

        registry
    }
}
