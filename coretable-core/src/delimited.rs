//! Delimited text input and matrix helpers

use std::collections::HashMap;

use csv::{ReaderBuilder, Trim};
use tracing::warn;

use crate::column_def::ColumnSlug;
use crate::error::Result;
use crate::row::Row;
use crate::value::{ErrorValue, Value};

/// Header row followed by value rows
pub type Matrix = Vec<Vec<Value>>;

/// Options for reading delimited text
#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    /// Delimiter byte; detected from the text when unset
    pub delimiter: Option<u8>,

    /// Quote character
    pub quote: u8,

    /// Whether to trim whitespace around fields
    pub trim: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
            trim: false,
        }
    }
}

/// Pick the delimiter: tab if present, else comma if present, else space
pub fn detect_delimiter(text: &str) -> u8 {
    if text.contains('\t') {
        b'\t'
    } else if text.contains(',') {
        b','
    } else {
        b' '
    }
}

/// Parse delimited text into rows of raw text cells
///
/// The first record is the header. Short records are padded with empty
/// text; malformed records are skipped with a warning.
pub fn parse_delimited(text: &str, options: &DelimitedOptions) -> Result<Vec<Row>> {
    let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(text));
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(delimiter)
        .quote(options.quote)
        .has_headers(true)
        .flexible(true);
    if options.trim {
        builder.trim(Trim::All);
    }

    let mut reader = builder.from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line + 2, error = %err, "Skipping malformed delimited record");
                continue;
            }
        };
        let row = headers
            .iter()
            .enumerate()
            .map(|(i, slug)| (slug.as_str(), Value::from(record.get(i).unwrap_or(""))))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Leading float the way lenient parsers read it: `"12abc"` is 12
fn parse_float_prefix(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    if end == digits_start {
        return None;
    }
    text[..end].parse().ok()
}

/// Matches `^-?\d+\.?\d*$`
fn is_plain_number(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    !whole.is_empty() && whole.bytes().all(|b| b.is_ascii_digit()) && fraction.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Text,
    Number,
}

/// Types raw text rows, one column at a time
///
/// The first value seen in a column fixes its kind. Later cells of a
/// number column that do not parse become
/// [`ErrorValue::NaNButShouldBeNumber`]. Slugs declared numeric up front
/// always coerce.
#[derive(Debug, Clone, Default)]
pub struct AutoTyper {
    kinds: HashMap<ColumnSlug, CellKind>,
}

impl AutoTyper {
    /// Create an auto typer that treats `numeric_slugs` as numbers
    pub fn new<'a>(numeric_slugs: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            kinds: numeric_slugs
                .into_iter()
                .map(|slug| (slug.to_string(), CellKind::Number))
                .collect(),
        }
    }

    /// Type every text cell of a row
    pub fn convert(&mut self, row: Row) -> Row {
        row.iter()
            .map(|(slug, value)| {
                let Value::Text(text) = value else {
                    return (slug.to_string(), value.clone());
                };
                let typed = match self.kinds.get(slug) {
                    Some(CellKind::Text) => value.clone(),
                    Some(CellKind::Number) => parse_float_prefix(text)
                        .map_or(Value::Invalid(ErrorValue::NaNButShouldBeNumber), Value::Number),
                    None => match parse_float_prefix(text) {
                        Some(number) if is_plain_number(text) => {
                            self.kinds.insert(slug.to_string(), CellKind::Number);
                            Value::Number(number)
                        }
                        _ => {
                            self.kinds.insert(slug.to_string(), CellKind::Text);
                            value.clone()
                        }
                    },
                };
                (slug.to_string(), typed)
            })
            .collect()
    }
}

/// Strip characters that are not word characters, spaces or dashes, then dash-join words
pub fn slugify_same_case(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect();
    cleaned.split(' ').filter(|part| !part.is_empty()).collect::<Vec<_>>().join("-")
}

/// Original name and new slug of a renamed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedSlug {
    /// Header as it appeared in the input
    pub name: String,
    /// Standardized slug
    pub slug: ColumnSlug,
}

/// Rewrite headers that are not already slugs
///
/// Returns `None` when every header of the first row is already a slug.
pub fn standardize_slugs(rows: &[Row]) -> Option<(Vec<Row>, Vec<RenamedSlug>)> {
    let first = rows.first()?;
    let renames: Vec<RenamedSlug> = first
        .slugs()
        .map(|name| RenamedSlug {
            name: name.to_string(),
            slug: slugify_same_case(name),
        })
        .filter(|renamed| renamed.name != renamed.slug)
        .collect();
    if renames.is_empty() {
        return None;
    }

    let lookup: HashMap<&str, &str> = renames.iter().map(|r| (r.name.as_str(), r.slug.as_str())).collect();
    let rows = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(slug, value)| (lookup.get(slug).copied().unwrap_or(slug), value.clone()))
                .collect()
        })
        .collect();
    Some((rows, renames))
}

/// Blank cells: absent or empty text
pub fn is_cell_empty(cell: &Value) -> bool {
    matches!(cell, Value::Empty) || cell.as_str() == Some("")
}

/// Drop trailing blank cells
pub fn trim_array(cells: &[Value]) -> Vec<Value> {
    let keep = cells.iter().rposition(|cell| !is_cell_empty(cell)).map_or(0, |i| i + 1);
    cells[..keep].to_vec()
}

/// Drop trailing rows made only of blank cells
pub fn trim_empty_rows(matrix: &[Vec<Value>]) -> Matrix {
    let keep = matrix
        .iter()
        .rposition(|row| !row.iter().all(is_cell_empty))
        .map_or(0, |i| i + 1);
    matrix[..keep].to_vec()
}

/// Drop trailing blank rows, then trailing blank cells of each row
pub fn trim_matrix(matrix: &[Vec<Value>]) -> Matrix {
    trim_empty_rows(matrix).iter().map(|row| trim_array(row)).collect()
}

/// Rows keyed by the matrix header
pub fn rows_from_matrix(matrix: &[Vec<Value>]) -> Vec<Row> {
    let matrix = trim_matrix(matrix);
    let Some((header, body)) = matrix.split_first() else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(ToString::to_string).collect();
    body.iter()
        .map(|cells| {
            header
                .iter()
                .enumerate()
                .map(|(i, slug)| (slug.as_str(), cells.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Header row from the first row's slugs, then every row's values
pub fn rows_to_matrix(rows: &[Row]) -> Option<Matrix> {
    let first = rows.first()?;
    let mut matrix = Vec::with_capacity(rows.len() + 1);
    matrix.push(first.slugs().map(Value::from).collect());
    matrix.extend(rows.iter().map(|row| row.values().cloned().collect()));
    Some(matrix)
}

/// Join a matrix with a delimiter, without quoting
pub fn matrix_to_delimited(matrix: &[Vec<Value>], delimiter: &str) -> String {
    matrix
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>().join(delimiter))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slugs whose cell in the first data row is blank
pub fn empty_columns_in_first_row(text: &str) -> Result<Vec<ColumnSlug>> {
    let head: String = text.lines().take(2).collect::<Vec<_>>().join("\n");
    let rows = parse_delimited(&head, &DelimitedOptions::default())?;
    Ok(rows
        .first()
        .map(|row| {
            row.iter()
                .filter(|(_, value)| is_cell_empty(value))
                .map(|(slug, _)| slug.to_string())
                .collect()
        })
        .unwrap_or_default())
}
