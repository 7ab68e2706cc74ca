use unicode_width::UnicodeWidthStr;

use crate::db::{CellValue, QueryResult};

/// How the CLI prints a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Tsv,
    Json,
    /// The row codec's delimiter-encoded string.
    Raw,
}

pub fn render(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => to_table(result),
        OutputFormat::Csv => to_csv(result),
        OutputFormat::Tsv => to_tsv(result),
        OutputFormat::Json => to_json(result),
        OutputFormat::Raw => result.to_raw_string(),
    }
}

/// Columns padded to their widest cell, with a header rule.
pub fn to_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return format!("({} rows)\n", result.row_count);
    }

    let widths: Vec<usize> = result.columns.iter().map(|c| c.max_width.max(c.name.width())).collect();
    let mut output = String::new();

    let header: Vec<String> = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| pad(&c.name, *w))
        .collect();
    output.push_str(header.join(" | ").trim_end());
    output.push('\n');

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&rule.join("-+-"));
    output.push('\n');

    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| pad(&cell.display(), *w))
            .collect();
        output.push_str(cells.join(" | ").trim_end());
        output.push('\n');
    }

    let noun = if result.row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!("({} {})\n", result.row_count, noun));
    output
}

fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(fill))
}

pub fn to_csv(result: &QueryResult) -> String {
    let mut output = String::new();

    // Header
    let headers: Vec<String> = result.columns.iter().map(|c| csv_escape(&c.name)).collect();
    output.push_str(&headers.join(","));
    output.push('\n');

    // Rows
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| csv_escape(&cell_to_csv(cell)))
            .collect();
        output.push_str(&cells.join(","));
        output.push('\n');
    }

    output
}

pub fn to_json(result: &QueryResult) -> String {
    let mut rows_json: Vec<serde_json::Value> = Vec::new();

    for row in &result.rows {
        let mut obj = serde_json::Map::new();
        for (i, cell) in row.iter().enumerate() {
            let col_name = result
                .columns
                .get(i)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("column_{}", i));
            obj.insert(col_name, cell.to_json());
        }
        rows_json.push(serde_json::Value::Object(obj));
    }

    serde_json::to_string_pretty(&rows_json).unwrap_or_else(|_| "[]".to_string())
}

pub fn to_tsv(result: &QueryResult) -> String {
    let mut output = String::new();

    let headers: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    output.push_str(&headers.join("\t"));
    output.push('\n');

    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell_to_csv(cell).replace('\t', " "))
            .collect();
        output.push_str(&cells.join("\t"));
        output.push('\n');
    }

    output
}

fn cell_to_csv(cell: &CellValue) -> String {
    cell.to_text().unwrap_or_default()
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
