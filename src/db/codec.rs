//! Delimiter-encoded row transport.
//!
//! A result set travels as one string: rows joined by [`ROW_DELIMITER`],
//! fields within a row joined by [`COLUMN_DELIMITER`]. Values containing
//! either character are not escaped; changing the delimiters breaks every
//! previously stored row string.

use std::collections::BTreeMap;

use tracing::warn;

pub const ROW_DELIMITER: char = '¬';
pub const COLUMN_DELIMITER: char = '¦';

/// True when `value` would corrupt the encoding.
pub fn has_collision(value: &str) -> bool {
    value.contains(ROW_DELIMITER) || value.contains(COLUMN_DELIMITER)
}

pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        let field = field.as_ref();
        if has_collision(field) {
            warn!(value = field, "value contains a row codec delimiter");
        }
        if i > 0 {
            out.push(COLUMN_DELIMITER);
        }
        out.push_str(field);
    }
    out
}

pub fn encode_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> String {
    rows.iter()
        .map(|row| encode_row(row.as_slice()))
        .collect::<Vec<_>>()
        .join(&ROW_DELIMITER.to_string())
}

/// Split one encoded row into its fields. An empty row has no fields.
pub fn get_line(row: &str) -> Vec<String> {
    if row.is_empty() {
        return Vec::new();
    }
    row.split(COLUMN_DELIMITER).map(str::to_string).collect()
}

/// Split a multi-row blob into encoded rows.
pub fn get_lines(blob: &str) -> Vec<String> {
    if blob.is_empty() {
        return Vec::new();
    }
    blob.split(ROW_DELIMITER).map(str::to_string).collect()
}

/// Zip column names against the fields of `row`.
///
/// A length mismatch truncates to the shorter side.
pub fn get_columns<S: AsRef<str>>(names: &[S], row: &str) -> BTreeMap<String, String> {
    names
        .iter()
        .zip(get_line(row))
        .map(|(name, value)| (name.as_ref().to_string(), value))
        .collect()
}
