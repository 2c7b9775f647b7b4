//! Text rendering of result rows.
//!
//! Lacework rows are JSON objects whose keys vary from row to row, so the
//! column set is the union of keys in first-seen order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use unicode_width::UnicodeWidthStr;

/// Output format for tool results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON rows only (default)
    #[default]
    Json,
    /// ASCII table in addition to the rows
    Table,
    /// Markdown table in addition to the rows
    Markdown,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "table" => Some(Self::Table),
            "markdown" | "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Render `rows` in this format. `None` for JSON.
    pub fn render(self, rows: &[Map<String, JsonValue>], row_count: usize) -> Option<String> {
        let columns = columns_of(rows);
        match self {
            Self::Json => None,
            Self::Table => Some(format_as_table(&columns, rows, row_count)),
            Self::Markdown => Some(format_as_markdown(&columns, rows, row_count)),
        }
    }
}

/// Union of row keys, in the order they first appear.
pub fn columns_of(rows: &[Map<String, JsonValue>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// Markdown cells cannot contain raw pipes or newlines.
fn markdown_cell(value: &JsonValue) -> String {
    format_value(value).replace('|', "\\|").replace('\n', " ")
}

fn rows_label(row_count: usize) -> &'static str {
    if row_count == 1 { "row" } else { "rows" }
}

pub fn format_as_table(
    columns: &[String],
    rows: &[Map<String, JsonValue>],
    row_count: usize,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    // `{:<width$}` pads by char count, so pad by display width by hand.
    let pad = |text: &str, width: usize, right: bool| {
        let fill = " ".repeat(width.saturating_sub(text.width()));
        if right {
            format!("| {}{} ", fill, text)
        } else {
            format!("| {}{} ", text, fill)
        }
    };

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| pad(col, *w, false))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                pad(&format_value(value), *w, value.is_number())
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);
    output.push_str(&format!("{} {} in set\n", row_count, rows_label(row_count)));
    output
}

pub fn format_as_markdown(
    columns: &[String],
    rows: &[Map<String, JsonValue>],
    row_count: usize,
) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();
    let header: String = columns.iter().map(|c| format!("| {} ", c)).collect::<String>() + "|\n";
    output.push_str(&header);
    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let line: String = columns
            .iter()
            .map(|col| format!("| {} ", markdown_cell(row.get(col).unwrap_or(&JsonValue::Null))))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{} {}*", row_count, rows_label(row_count)));
    output
}
