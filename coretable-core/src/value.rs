//! Cell values and the sentinel markers embedded in column data

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, NaiveDate};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Time coordinate used by time-series columns (years, days, epochs)
pub type Time = i64;

/// Typed marker for a cell that holds no usable value
///
/// Sentinels keep row alignment intact: a failed parse or an unmatched
/// join produces one of these instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorValue {
    /// Declared numeric but the raw text was not a number
    NaNButShouldBeNumber,
    /// Declared numeric but the raw text was empty
    BlankButShouldBeNumber,
    /// Declared numeric but no raw value was supplied
    UndefinedButShouldBeNumber,
    /// Declared boolean but the raw value was not recognized
    NotAParseableBoolean,
    /// Row had no counterpart in the joined table
    NoMatchingValueAfterJoin,
    /// Row came from a concatenated store that lacked the column
    MissingValuePlaceholder,
    /// Linear interpolation had no neighbors to work from
    NoValueForInterpolation,
    /// Tolerance interpolation found no neighbor close enough in time
    NoValueWithinTolerance,
    /// Zero or negative value removed for a log scale
    InvalidOnALogScale,
    /// Cell replaced on purpose by a test utility
    DroppedForTesting,
}

impl ErrorValue {
    /// Stable name of the sentinel
    pub fn name(&self) -> &'static str {
        match self {
            ErrorValue::NaNButShouldBeNumber => "NaNButShouldBeNumber",
            ErrorValue::BlankButShouldBeNumber => "BlankButShouldBeNumber",
            ErrorValue::UndefinedButShouldBeNumber => "UndefinedButShouldBeNumber",
            ErrorValue::NotAParseableBoolean => "NotAParseableBoolean",
            ErrorValue::NoMatchingValueAfterJoin => "NoMatchingValueAfterJoin",
            ErrorValue::MissingValuePlaceholder => "MissingValuePlaceholder",
            ErrorValue::NoValueForInterpolation => "NoValueForInterpolation",
            ErrorValue::NoValueWithinTolerance => "NoValueWithinTolerance",
            ErrorValue::InvalidOnALogScale => "InvalidOnALogScale",
            ErrorValue::DroppedForTesting => "DroppedForTesting",
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell in a column
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Numeric value
    Number(f64),
    /// Text value (also the shape of raw, unparsed input)
    Text(String),
    /// Boolean value
    Boolean(bool),
    /// No value was supplied for this cell
    #[default]
    Empty,
    /// Sentinel marking why the cell has no usable value
    Invalid(ErrorValue),
}

impl Value {
    /// True for numbers, text and booleans
    pub fn is_valid(&self) -> bool {
        !matches!(self, Value::Empty | Value::Invalid(_))
    }

    /// True for sentinels and absent cells
    pub fn is_missing(&self) -> bool {
        !self.is_valid()
    }

    /// The sentinel, if this cell holds one
    pub fn error(&self) -> Option<ErrorValue> {
        match self {
            Value::Invalid(err) => Some(*err),
            _ => None,
        }
    }

    /// Numeric payload
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Time coordinate of a time cell
    ///
    /// Numbers are taken as is. ISO `YYYY-MM-DD` text becomes a day count
    /// with 0001-01-01 as day 1. Anything else has no time.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_time(&self) -> Option<Time> {
        match self {
            Value::Number(n) if n.is_finite() => Some(n.round() as Time),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(|date| Time::from(date.num_days_from_ce())),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Ordering between two valid cells of the same kind
    ///
    /// Unlike [`Ord`], cells of different kinds and sentinels do not compare.
    pub fn compare_like(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Number(_) => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
            Value::Empty => 3,
            Value::Invalid(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Invalid(a), Value::Invalid(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Number(n) => OrderedFloat(*n).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Empty => {}
            Value::Invalid(err) => err.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            // Sentinels and absent cells render blank
            Value::Empty | Value::Invalid(_) => Ok(()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Empty | Value::Invalid(_) => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Scalar {
            Boolean(bool),
            Number(f64),
            Text(String),
        }

        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            None => Value::Empty,
            Some(Scalar::Boolean(b)) => Value::Boolean(b),
            Some(Scalar::Number(n)) => Value::Number(n),
            Some(Scalar::Text(s)) => Value::Text(s),
        })
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<ErrorValue> for Value {
    fn from(value: ErrorValue) -> Self {
        Value::Invalid(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_time_from_numbers_and_dates() {
        assert_eq!(Value::Number(2001.0).as_time(), Some(2001));
        let day = Value::from("2020-01-01").as_time().unwrap();
        assert_eq!(Value::from("2020-01-02").as_time(), Some(day + 1));
        assert_eq!(Value::from("2020-03-01").as_time(), Some(day + 60));
        assert_eq!(Value::from("fr").as_time(), None);
        assert_eq!(Value::Invalid(ErrorValue::NaNButShouldBeNumber).as_time(), None);
        assert_eq!(Value::Empty.as_time(), None);
    }

    #[test]
    fn test_sentinels_are_not_valid() {
        assert!(Value::Number(1.0).is_valid());
        assert!(Value::from("a").is_valid());
        assert!(!Value::Empty.is_valid());
        assert!(!Value::Invalid(ErrorValue::NoMatchingValueAfterJoin).is_valid());
        assert_eq!(
            Value::Invalid(ErrorValue::DroppedForTesting).error(),
            Some(ErrorValue::DroppedForTesting)
        );
    }

    #[test]
    fn test_ordering_across_kinds() {
        let mut values = vec![
            Value::Invalid(ErrorValue::MissingValuePlaceholder),
            Value::Empty,
            Value::from("b"),
            Value::Number(3.0),
            Value::from("a"),
            Value::Number(-1.0),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Number(-1.0),
                Value::Number(3.0),
                Value::from("a"),
                Value::from("b"),
                Value::Empty,
                Value::Invalid(ErrorValue::MissingValuePlaceholder),
            ]
        );
    }

    #[test]
    fn test_compare_like_only_within_a_kind() {
        assert_eq!(Value::Number(1.0).compare_like(&Value::Number(2.0)), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare_like(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::Number(1.0).compare_like(&Value::from("1")), None);
        assert_eq!(Value::Invalid(ErrorValue::DroppedForTesting).compare_like(&Value::Number(0.0)), None);
    }

    #[test]
    fn test_hash_matches_eq() {
        let set: HashSet<Value> = [Value::Number(1.0), Value::Number(1.0), Value::from("1")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_blanks_sentinels() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Invalid(ErrorValue::NaNButShouldBeNumber).to_string(), "");
        assert_eq!(Value::Empty.to_string(), "");
    }

    #[test]
    fn test_json_shape() {
        let values = vec![
            Value::Number(1.5),
            Value::from("x"),
            Value::Boolean(true),
            Value::Empty,
            Value::Invalid(ErrorValue::NoValueWithinTolerance),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[1.5,"x",true,null,null]"#);

        let parsed: Vec<Value> = serde_json::from_str(r#"[3,"y",false,null]"#).unwrap();
        assert_eq!(
            parsed,
            vec![Value::Number(3.0), Value::from("y"), Value::Boolean(false), Value::Empty]
        );
    }
}
