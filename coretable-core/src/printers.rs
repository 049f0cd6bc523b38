//! Text renderings of tables: delimited, aligned plain text, markdown

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::{Error, Result};
use crate::row::Row;

/// Options for [`to_aligned_text_table`]
#[derive(Debug, Clone)]
pub struct AlignedTextTableOptions {
    /// Longest rendering of one cell before it is truncated with `...`
    pub max_characters_per_column: usize,

    /// Widest line; columns that would overflow it are left out
    pub max_characters_per_line: usize,

    /// Pad cells on the left instead of the right
    pub align_right: bool,
}

impl Default for AlignedTextTableOptions {
    fn default() -> Self {
        Self {
            max_characters_per_column: 20,
            max_characters_per_line: 80,
            align_right: true,
        }
    }
}

/// Cut `text` to `max_length` characters, ending in `...` when cut
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn pad(text: &str, width: usize, align_right: bool) -> String {
    if align_right {
        format!("{text:>width$}")
    } else {
        format!("{text:<width$}")
    }
}

/// Fixed-width plain text table for terminals and logs
pub fn to_aligned_text_table(slugs: &[String], rows: &[Row], options: &AlignedTextTableOptions) -> String {
    let max_column = options.max_characters_per_column.max(4);

    let mut columns: Vec<(String, Vec<String>, usize)> = Vec::new();
    let mut line_width = 0;
    for slug in slugs {
        let header = truncate(slug, max_column);
        let cells: Vec<String> = rows
            .iter()
            .map(|row| truncate(&row.value(slug).to_string(), max_column))
            .collect();
        let width = cells
            .iter()
            .map(|cell| cell.chars().count())
            .chain(std::iter::once(header.chars().count()))
            .max()
            .unwrap_or(0);

        let separator = usize::from(!columns.is_empty());
        if line_width + separator + width > options.max_characters_per_line {
            break;
        }
        line_width += separator + width;
        columns.push((header, cells, width));
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|(header, _, width)| pad(header, *width, options.align_right))
            .collect::<Vec<_>>()
            .join(" "),
    );
    for index in 0..rows.len() {
        lines.push(
            columns
                .iter()
                .map(|(_, cells, width)| pad(&cells[index], *width, options.align_right))
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    lines.join("\n")
}

/// Minimal markdown table
pub fn to_markdown_table(slugs: &[String], rows: &[Row]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!("|{}|", slugs.join("|")));
    lines.push(format!("|{}|", vec!["-"; slugs.len()].join("|")));
    for row in rows {
        let cells: Vec<String> = slugs.iter().map(|slug| row.value(slug).to_string()).collect();
        lines.push(format!("|{}|", cells.join("|")));
    }
    lines.join("\n")
}

/// Write records as delimited text with CSV quoting where needed
///
/// Lines are separated by `\n` and there is no trailing newline.
pub fn write_delimited<I>(delimiter: u8, records: I) -> Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());
    for record in records {
        writer.write_record(&record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| Error::Csv(csv::Error::from(err.into_error())))?;
    let mut text = String::from_utf8(bytes).map_err(|err| Error::InvalidArgument(err.to_string()))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Header of slugs followed by one record per row
pub fn to_delimited(delimiter: u8, slugs: &[String], rows: &[Row]) -> Result<String> {
    let header = std::iter::once(slugs.to_vec());
    let body = rows
        .iter()
        .map(|row| slugs.iter().map(|slug| row.value(slug).to_string()).collect());
    write_delimited(delimiter, header.chain(body))
}
