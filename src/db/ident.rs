//! Identifier validation and quoting.
//!
//! Table names must match `^[A-Za-z_][A-Za-z0-9_]*$` and fit in 63 bytes.
//! Column names are free-form (flattened JSON paths end up here) but are
//! still checked for emptiness and control characters. PostgreSQL silently
//! truncates names past 63 bytes, so columns created there are held to that
//! limit through [`Ident::column_for`]; SQLite has no such limit. Every
//! identifier reaching SQL text goes through [`Ident`], and literal values
//! are bound as parameters rather than inlined.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{StoreError, StoreResult};
use super::query::Dialect;

static STRICT_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Longest identifier accepted (PostgreSQL's NAMEDATALEN - 1).
pub const MAX_IDENT_BYTES: usize = 63;

/// A validated table or column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Validate against the strict identifier pattern.
    pub fn strict(name: &str) -> StoreResult<Self> {
        validate_identifier(name)?;
        Ok(Ident(name.to_string()))
    }

    /// Validate a free-form column name, with no length limit.
    pub fn column(name: &str) -> StoreResult<Self> {
        if name.is_empty() {
            return Err(StoreError::invalid_identifier(name, "empty name"));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(StoreError::invalid_identifier(
                name,
                "contains control characters",
            ));
        }
        Ok(Ident(name.to_string()))
    }

    /// [`Ident::column`] plus the length limit of `dialect`, if it has one.
    pub fn column_for(dialect: Dialect, name: &str) -> StoreResult<Self> {
        let ident = Self::column(name)?;
        if let Some(max) = dialect.max_ident_bytes() {
            if name.len() > max {
                return Err(StoreError::invalid_identifier(
                    name,
                    format!("longer than {} bytes", max),
                ));
            }
        }
        Ok(ident)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in double quotes.
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn validate_identifier(name: &str) -> StoreResult<()> {
    if name.len() > MAX_IDENT_BYTES {
        return Err(StoreError::invalid_identifier(
            name,
            format!("longer than {} bytes", MAX_IDENT_BYTES),
        ));
    }
    if !STRICT_IDENT.is_match(name) {
        return Err(StoreError::invalid_identifier(
            name,
            "must match ^[A-Za-z_][A-Za-z0-9_]*$",
        ));
    }
    Ok(())
}

/// Wrap in double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a string as a single-quoted SQL literal.
///
/// Only used for human-readable statement text (audit records); statements
/// sent to a backend carry values as bound parameters.
pub fn escape_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
