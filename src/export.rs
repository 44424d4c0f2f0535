//! Result export (CSV / JSON / text table)
//!
//! Pure serialization functions, no filesystem I/O. The caller writes the
//! returned string wherever it wants it (a file, stdout, the bridge's
//! `write-file` channel).

use crate::db::types::{CellValue, QueryResult};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Widest a column may grow in [`to_table`]
const MAX_TABLE_WIDTH: usize = 40;

/// Export format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// File extension for this format (without leading dot)
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn render(&self, result: &QueryResult) -> String {
        match self {
            ExportFormat::Csv => to_csv(result),
            ExportFormat::Json => to_json(result),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("Unknown export format: {other}")),
        }
    }
}

/// Header line, then one line per row, joined by `\n`.
pub fn to_csv(result: &QueryResult) -> String {
    let header = result
        .columns
        .iter()
        .map(|c| csv_field(c))
        .collect::<Vec<_>>()
        .join(",");
    let lines: Vec<String> = result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| csv_field(&cell_to_export_string(cell)))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect();
    format!("{}\n{}", header, lines.join("\n"))
}

/// Pretty-printed array of objects keyed by column name.
pub fn to_json(result: &QueryResult) -> String {
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|row| {
            let mut obj = Map::new();
            for (i, column) in result.columns.iter().enumerate() {
                let value = row.get(i).cloned().map(Value::from).unwrap_or(Value::Null);
                obj.insert(column.clone(), value);
            }
            Value::Object(obj)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Aligned plain-text table for terminals.
pub fn to_table(result: &QueryResult) -> String {
    if let Some(error) = &result.error {
        return format!("ERROR: {error}\n");
    }
    if result.columns.is_empty() {
        return format!("{} row(s) affected\n", result.row_count.unwrap_or(0));
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|c| c.display_string(MAX_TABLE_WIDTH).replace('\n', " "))
                .collect()
        })
        .collect();
    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(|s| s.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
                .min(MAX_TABLE_WIDTH)
        })
        .collect();

    let mut out = String::new();
    push_table_line(&mut out, result.columns.iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &cells {
        push_table_line(&mut out, row.iter().map(String::as_str), &widths);
    }

    let total = result.row_count.unwrap_or(result.rows.len());
    out.push_str(&format!("({} row{})\n", total, if total == 1 { "" } else { "s" }));
    if let Some(message) = &result.truncated_message {
        out.push_str(message);
        out.push('\n');
    }
    out
}

fn push_table_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = fields
        .zip(widths)
        .map(|(field, width)| format!("{:<width$}", field, width = *width))
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

/// Full untruncated value string for CSV export (NULL → empty string).
fn cell_to_export_string(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => s.clone(),
        other => match Value::from(other.clone()) {
            Value::String(s) => s,
            value => value.to_string(),
        },
    }
}

/// Quote a field if it contains `,` `"` or a newline.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
