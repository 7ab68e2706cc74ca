use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the store.
///
/// Reads that find nothing are not errors: they come back as empty rows,
/// empty maps or empty documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call is missing something it cannot run without (e.g. a table name).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// The embedded engine reported lock contention. Retryable.
    #[error("database is locked: {0}")]
    TransientLock(StructuredError),

    /// Non-retryable backend failure (syntax, constraint violation, ...).
    #[error("{0}")]
    Backend(StructuredError),

    #[error("connection error: {0}")]
    Connection(String),

    /// Missing or malformed `_json_structure` column.
    #[error("json structure error: {0}")]
    JsonStructure(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("rearranging table {table:?} failed: {source}")]
    Rearrange {
        table: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn invalid_identifier(name: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidIdentifier {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the retry loop may try the statement again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientLock(_))
    }

    /// The backend's structured error, if this came from a driver.
    pub fn structured(&self) -> Option<&StructuredError> {
        match self {
            StoreError::TransientLock(e) | StoreError::Backend(e) => Some(e),
            StoreError::Rearrange { source, .. } => source.structured(),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        let structured = StructuredError::from_pg_error(&err, "");
        if structured.category == ErrorCategory::Connection {
            StoreError::Connection(structured.message)
        } else {
            StoreError::Backend(structured)
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let structured = StructuredError::from_sqlite_error(&err);
        if structured.category == ErrorCategory::Lock {
            StoreError::TransientLock(structured)
        } else {
            StoreError::Backend(structured)
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Categorized error types for SQL failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE class 42 - syntax_error, etc.)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    /// Transaction state errors (e.g., transaction aborted)
    Transaction,
    /// Lock contention on the embedded engine (SQLITE_BUSY / SQLITE_LOCKED)
    Lock,
    /// Connection/communication errors
    Connection,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Lock => write!(f, "Lock Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// Structured error with context from the backend's error response.
#[derive(Debug, Clone)]
pub struct StructuredError {
    pub category: ErrorCategory,
    /// SQLSTATE for PostgreSQL, extended result code for SQLite.
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub constraint: Option<String>,
}

impl StructuredError {
    pub fn from_pg_error(err: &tokio_postgres::Error, _statement: &str) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code_str = db_err.code().code().to_string();
            StructuredError {
                category: categorize_sqlstate(&code_str),
                code: code_str,
                message: db_err.message().to_string(),
                detail: db_err.detail().map(|s| s.to_string()),
                hint: db_err.hint().map(|s| s.to_string()),
                table: db_err.table().map(|s| s.to_string()),
                column: db_err.column().map(|s| s.to_string()),
                constraint: db_err.constraint().map(|s| s.to_string()),
            }
        } else {
            // Non-database error (connection, protocol, etc.)
            let category = if err.is_closed() || err.source().is_some() {
                ErrorCategory::Connection
            } else {
                ErrorCategory::Unknown
            };
            StructuredError {
                category,
                detail: err.source().map(|e| e.to_string()),
                ..StructuredError::from_string(err.to_string())
            }
        }
    }

    pub fn from_sqlite_error(err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let text = message.clone().unwrap_or_else(|| failure.to_string());
                StructuredError {
                    category: categorize_sqlite(failure.code, &text),
                    code: failure.extended_code.to_string(),
                    ..StructuredError::from_string(text)
                }
            }
            other => StructuredError::from_string(other.to_string()),
        }
    }

    /// Create a simple error from a plain string (for non-database errors).
    pub fn from_string(msg: String) -> Self {
        StructuredError {
            category: ErrorCategory::Unknown,
            code: String::new(),
            message: msg,
            detail: None,
            hint: None,
            table: None,
            column: None,
            constraint: None,
        }
    }

    /// Format as a rich multi-line string for terminal output.
    pub fn display_full(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];

        if !self.code.is_empty() {
            lines.push(format!("  Code: {}", self.code));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }
        match (&self.table, &self.column) {
            (Some(table), Some(column)) => lines.push(format!("  Object: {}.{}", table, column)),
            (Some(table), None) => lines.push(format!("  Table: {}", table)),
            _ => {}
        }
        if let Some(constraint) = &self.constraint {
            lines.push(format!("  Constraint: {}", constraint));
        }

        lines.join("\n")
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Categorize a SQLSTATE code into an ErrorCategory.
fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        // 42601 = syntax_error; the rest of class 42 is undefined objects etc.
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

/// Categorize a SQLite primary result code.
fn categorize_sqlite(code: rusqlite::ErrorCode, message: &str) -> ErrorCategory {
    use rusqlite::ErrorCode;

    match code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ErrorCategory::Lock,
        ErrorCode::ConstraintViolation
        | ErrorCode::TooBig
        | ErrorCode::TypeMismatch
        | ErrorCode::ReadOnly
        | ErrorCode::DiskFull => ErrorCategory::Execution,
        ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied => {
            ErrorCategory::Connection
        }
        _ if message.to_lowercase().contains("locked") => ErrorCategory::Lock,
        _ if message.contains("syntax error") => ErrorCategory::Syntax,
        _ if message.contains("no such") || message.contains("duplicate column") => {
            ErrorCategory::Semantic
        }
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int, msg: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), Some(msg.to_string()))
    }

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42P01"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("42703"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("23505"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("25001"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("XX000"), ErrorCategory::Unknown);
        assert_eq!(categorize_sqlstate(""), ErrorCategory::Unknown);
    }

    #[test]
    fn test_sqlite_busy_is_transient() {
        let err: StoreError = sqlite_failure(rusqlite::ffi::SQLITE_BUSY, "database is locked").into();
        assert!(err.is_transient());
        assert_eq!(err.structured().unwrap().category, ErrorCategory::Lock);
    }

    #[test]
    fn test_sqlite_locked_is_transient() {
        let err: StoreError =
            sqlite_failure(rusqlite::ffi::SQLITE_LOCKED, "database table is locked").into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_sqlite_constraint_is_not_transient() {
        let err: StoreError =
            sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT, "UNIQUE constraint failed").into();
        assert!(!err.is_transient());
        assert_eq!(err.structured().unwrap().category, ErrorCategory::Execution);
    }

    #[test]
    fn test_sqlite_syntax_error_category() {
        let err: StoreError = sqlite_failure(rusqlite::ffi::SQLITE_ERROR, "near \"SELEC\": syntax error").into();
        assert_eq!(err.structured().unwrap().category, ErrorCategory::Syntax);
    }

    #[test]
    fn test_rearrange_error_keeps_source() {
        let inner = StoreError::Backend(StructuredError::from_string("boom".into()));
        let err = StoreError::Rearrange {
            table: "users".into(),
            source: Box::new(inner),
        };
        let text = err.to_string();
        assert!(text.contains("users"));
        assert!(text.contains("boom"));
        assert_eq!(err.structured().unwrap().message, "boom");
    }

    #[test]
    fn test_display_full() {
        let err = StructuredError {
            category: ErrorCategory::Syntax,
            code: "42601".to_string(),
            message: "syntax error at or near \",\"".to_string(),
            detail: None,
            hint: Some("Remove trailing comma.".to_string()),
            table: Some("users".to_string()),
            column: None,
            constraint: None,
        };
        let full = err.display_full();
        assert!(full.contains("Syntax Error"));
        assert!(full.contains("42601"));
        assert!(full.contains("Remove trailing comma"));
        assert!(full.contains("Table: users"));
    }
}
