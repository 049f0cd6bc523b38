//! Gap filling over time-ordered value sequences
//!
//! Both algorithms work in place over a `[start, end)` sub-range so a caller
//! can run them once per group (for example once per entity) inside one
//! pair of sequences sorted by group and then by time.

use serde::{Deserialize, Serialize};

use crate::row::Row;
use crate::value::{ErrorValue, Time, Value};

/// A gap-filling policy
pub trait Interpolation {
    /// Fill missing cells of `values[start..end]`
    ///
    /// `times` is parallel to `values` and sorted ascending within the range.
    /// Ranges past the end of `values` are clamped; an empty range is a no-op.
    fn interpolate(&self, values: &mut [Value], times: &mut [Time], start: usize, end: usize);

    /// Fill the whole sequence
    fn interpolate_all(&self, values: &mut [Value], times: &mut [Time]) {
        let end = values.len();
        self.interpolate(values, times, 0, end);
    }
}

fn find_valid(values: &[Value], from: usize, end: usize) -> Option<usize> {
    (from..end).find(|&i| values[i].is_valid())
}

/// Distance-weighted gap fill between the nearest valid neighbors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearInterpolation {
    /// Copy the first valid value backwards over leading gaps
    pub extrapolate_at_start: bool,

    /// Copy the last valid value forwards over trailing gaps
    pub extrapolate_at_end: bool,
}

impl Interpolation for LinearInterpolation {
    fn interpolate(&self, values: &mut [Value], _times: &mut [Time], start: usize, end: usize) {
        let end = end.min(values.len());
        if start >= end {
            return;
        }

        let mut prev: Option<usize> = None;
        let mut next: Option<usize> = None;

        for index in start..end {
            if values[index].is_valid() {
                prev = Some(index);
                continue;
            }

            if next.map_or(true, |n| n <= index) {
                next = find_valid(values, index + 1, end);
            }

            let prev_value = prev.map(|p| &values[p]).filter(|v| v.is_valid());
            let next_value = next.map(|n| &values[n]);

            let value = match (prev_value, next_value, prev, next) {
                (Some(Value::Number(a)), Some(Value::Number(b)), Some(p), Some(n)) => {
                    #[allow(clippy::cast_precision_loss)]
                    let (dist_left, dist_right) = ((index - p) as f64, (n - index) as f64);
                    Value::Number((a * dist_right + b * dist_left) / (dist_left + dist_right))
                }
                (Some(a), _, _, _) if self.extrapolate_at_end => a.clone(),
                (_, Some(b), _, _) if self.extrapolate_at_start => b.clone(),
                _ => Value::Invalid(ErrorValue::NoValueForInterpolation),
            };

            // The filled cell becomes the left neighbor of the next gap
            prev = Some(index);
            values[index] = value;
        }
    }
}

/// Nearest-in-time gap fill bounded by a maximum time distance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceInterpolation {
    /// Largest time distance a value may be borrowed across
    pub time_tolerance: Time,
}

#[derive(Clone, Copy)]
enum NextValid {
    Unsearched,
    Found(usize),
    Exhausted,
}

impl Interpolation for ToleranceInterpolation {
    fn interpolate(&self, values: &mut [Value], times: &mut [Time], start: usize, end: usize) {
        let end = end.min(values.len()).min(times.len());
        if start >= end {
            return;
        }

        let tolerance = u64::try_from(self.time_tolerance).unwrap_or(0);
        let mut prev: Option<usize> = None;
        let mut next = NextValid::Unsearched;

        for index in start..end {
            if values[index].is_valid() {
                prev = Some(index);
                continue;
            }

            let rescan = match next {
                NextValid::Unsearched => true,
                NextValid::Found(n) => n <= index,
                NextValid::Exhausted => false,
            };
            if rescan {
                next = find_valid(values, index + 1, end).map_or(NextValid::Exhausted, NextValid::Found);
            }

            let current = times[index];
            let prev_diff = prev.map_or(u64::MAX, |p| times[p].abs_diff(current));
            let next_diff = match next {
                NextValid::Found(n) => times[n].abs_diff(current),
                _ => u64::MAX,
            };

            let source = match (next, prev) {
                (NextValid::Found(n), _) if next_diff <= prev_diff && next_diff <= tolerance => Some(n),
                (_, Some(p)) if prev_diff <= tolerance => Some(p),
                _ => None,
            };

            match source {
                Some(source) => {
                    values[index] = values[source].clone();
                    times[index] = times[source];
                }
                None => values[index] = Value::Invalid(ErrorValue::NoValueWithinTolerance),
            }
        }
    }
}

/// Tolerance-fill one value column of rows already sorted by time
///
/// Filled rows also take the time cell of the row they borrowed from.
/// Rows whose time cell has no time (see [`Value::as_time`]) neither lend
/// nor borrow; their gaps become [`ErrorValue::NoValueWithinTolerance`].
pub fn interpolate_row_values_with_tolerance(
    rows_sorted_by_time_asc: &[Row],
    value_slug: &str,
    time_slug: &str,
    time_tolerance: Time,
) -> Vec<Row> {
    let timed: Vec<(usize, Time)> = rows_sorted_by_time_asc
        .iter()
        .enumerate()
        .filter_map(|(index, row)| row.value(time_slug).as_time().map(|time| (index, time)))
        .collect();
    let mut values: Vec<Value> = timed
        .iter()
        .map(|&(index, _)| rows_sorted_by_time_asc[index].value(value_slug))
        .collect();
    let mut times: Vec<Time> = timed.iter().map(|&(_, time)| time).collect();
    let original_times = times.clone();

    ToleranceInterpolation { time_tolerance }.interpolate_all(&mut values, &mut times);

    let mut filled: Vec<Row> = rows_sorted_by_time_asc.to_vec();
    for row in &mut filled {
        if row.value(time_slug).as_time().is_none() && !row.value(value_slug).is_valid() {
            row.insert(value_slug, Value::Invalid(ErrorValue::NoValueWithinTolerance));
        }
    }
    for (position, (&(index, _), value)) in timed.iter().zip(values).enumerate() {
        let row = &mut filled[index];
        row.insert(value_slug, value);
        if times[position] != original_times[position] {
            let source = original_times.iter().position(|&time| time == times[position]);
            if let Some(source) = source {
                let cell = rows_sorted_by_time_asc[timed[source].0].value(time_slug);
                row.insert(time_slug, cell);
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn err() -> Value {
        Value::Invalid(ErrorValue::NaNButShouldBeNumber)
    }

    #[test]
    fn test_linear_fills_interior_gaps() {
        let mut values = vec![Value::Number(2.0), err(), err(), Value::Number(8.0)];
        let mut times = vec![0, 1, 2, 3];
        LinearInterpolation::default().interpolate_all(&mut values, &mut times);
        assert_eq!(
            values,
            vec![Value::Number(2.0), Value::Number(4.0), Value::Number(6.0), Value::Number(8.0)]
        );
    }

    #[test]
    fn test_linear_edges_without_extrapolation() {
        let mut values = vec![Value::Empty, Value::Number(2.0), Value::Empty];
        let mut times = vec![0, 1, 2];
        LinearInterpolation::default().interpolate_all(&mut values, &mut times);
        let none = Value::Invalid(ErrorValue::NoValueForInterpolation);
        assert_eq!(values, vec![none.clone(), Value::Number(2.0), none]);
    }

    #[test]
    fn test_linear_extrapolation() {
        let mut values = vec![err(), err(), Value::Number(2.0), Value::Number(3.0), err()];
        let mut times = vec![0, 1, 2, 3, 4];
        let policy = LinearInterpolation {
            extrapolate_at_start: true,
            extrapolate_at_end: true,
        };
        policy.interpolate_all(&mut values, &mut times);
        assert_eq!(values, [2.0, 2.0, 2.0, 3.0, 3.0].map(Value::Number).to_vec());
    }

    #[test]
    fn test_linear_respects_ranges() {
        let mut values = vec![Value::Number(1.0), err(), Value::Number(10.0), err(), Value::Number(30.0)];
        let mut times = vec![0, 1, 0, 1, 2];
        LinearInterpolation::default().interpolate(&mut values, &mut times, 0, 2);
        LinearInterpolation::default().interpolate(&mut values, &mut times, 2, 5);
        assert_eq!(values[1], Value::Invalid(ErrorValue::NoValueForInterpolation));
        assert_eq!(values[3], Value::Number(20.0));
    }

    #[test]
    fn test_tolerance_prefers_closest_neighbor() {
        let mut values = vec![Value::Number(5.0), err(), err(), Value::Number(20.0)];
        let mut times = vec![0, 1, 5, 6];
        ToleranceInterpolation { time_tolerance: 1 }.interpolate_all(&mut values, &mut times);
        assert_eq!(
            values,
            vec![Value::Number(5.0), Value::Number(5.0), Value::Number(20.0), Value::Number(20.0)]
        );
        assert_eq!(times, vec![0, 0, 6, 6]);
    }

    #[test]
    fn test_tolerance_out_of_range() {
        let mut values = vec![Value::Number(1.0), Value::Empty, Value::Number(3.0)];
        let mut times = vec![0, 5, 10];
        ToleranceInterpolation { time_tolerance: 2 }.interpolate_all(&mut values, &mut times);
        assert_eq!(values[1], Value::Invalid(ErrorValue::NoValueWithinTolerance));
        assert_eq!(times[1], 5);
    }

    #[test]
    fn test_empty_sequences_are_noops() {
        let mut values: Vec<Value> = Vec::new();
        let mut times: Vec<Time> = Vec::new();
        LinearInterpolation::default().interpolate_all(&mut values, &mut times);
        ToleranceInterpolation { time_tolerance: 3 }.interpolate(&mut values, &mut times, 0, 10);
        assert!(values.is_empty());
    }

    #[test]
    fn test_row_values_with_tolerance() {
        let rows = vec![
            Row::new().with("year", 2000).with("gdp", 1.0),
            Row::new().with("year", 2001).with("gdp", Value::Empty),
            Row::new().with("year", 2005).with("gdp", Value::Empty),
        ];
        let filled = interpolate_row_values_with_tolerance(&rows, "gdp", "year", 1);
        assert_eq!(filled[1], Row::new().with("year", 2000).with("gdp", 1.0));
        assert_eq!(filled[2].value("gdp"), Value::Invalid(ErrorValue::NoValueWithinTolerance));
        assert_eq!(filled[2].value("year"), Value::from(2005));
    }

    #[test]
    fn test_row_values_with_tolerance_over_dates() {
        let rows = vec![
            Row::new().with("date", "2020-01-01").with("v", 5.0),
            Row::new().with("date", "2020-01-02").with("v", Value::Empty),
            Row::new().with("date", "2020-06-01").with("v", Value::Empty),
            Row::new().with("date", "2020-06-02").with("v", 20.0),
            Row::new().with("date", "someday").with("v", Value::Empty),
        ];
        let filled = interpolate_row_values_with_tolerance(&rows, "v", "date", 1);
        assert_eq!(filled[1], Row::new().with("date", "2020-01-01").with("v", 5.0));
        assert_eq!(filled[2], Row::new().with("date", "2020-06-02").with("v", 20.0));
        assert_eq!(filled[4].value("v"), Value::Invalid(ErrorValue::NoValueWithinTolerance));
        assert_eq!(filled[4].value("date"), Value::from("someday"));
    }
}
