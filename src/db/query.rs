use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Row;

use super::codec;
use super::ident::{escape_literal, Ident, MAX_IDENT_BYTES};

/// SQL flavor of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Longest identifier the engine keeps intact, if it has a limit.
    pub fn max_ident_bytes(&self) -> Option<usize> {
        match self {
            Dialect::Postgres => Some(MAX_IDENT_BYTES),
            Dialect::Sqlite => None,
        }
    }

    /// Placeholder for the `n`th (1-based) bound parameter.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => format!("?{}", n),
        }
    }

    /// Rewrite auto-increment key declarations for this engine.
    ///
    /// `SERIAL PRIMARY KEY`, `INTEGER PRIMARY KEY AUTOINCREMENT` and the
    /// bare `AUTO_INCREMENT` placeholder are interchangeable; any other
    /// declaration passes through untouched.
    pub fn translate_type(&self, decl: &str) -> String {
        let normalized = decl.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let is_auto = matches!(
            normalized.as_str(),
            "SERIAL PRIMARY KEY"
                | "INTEGER PRIMARY KEY AUTOINCREMENT"
                | "INTEGER PRIMARY KEY AUTO_INCREMENT"
                | "INTEGER AUTO_INCREMENT PRIMARY KEY"
                | "AUTO_INCREMENT"
                | "AUTOINCREMENT"
        );
        if !is_auto {
            return decl.to_string();
        }
        match self {
            Dialect::Postgres => "SERIAL PRIMARY KEY".to_string(),
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        }
    }
}

/// A literal value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Render as a SQL literal for human-readable statement text.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => escape_literal(s),
        }
    }

    /// Textual form; `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

type BoxError = Box<dyn StdError + Sync + Send>;

// The server infers parameter types from context, so the binding adapts to
// whatever type it asked for instead of insisting on one.
impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => text_to_sql(&b.to_string(), ty, out),
            },
            SqlValue::Int(i) => int_to_sql(*i, ty, out),
            SqlValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ => text_to_sql(&f.to_string(), ty, out),
            },
            SqlValue::Text(s) => text_to_sql(s, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        _ => text_to_sql(&i.to_string(), ty, out),
    }
}

fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(s.trim().parse::<i64>()?, ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::BOOL => parse_bool(s)
            .ok_or_else(|| format!("cannot bind {:?} as boolean", s))?
            .to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::NUMERIC => Err(format!(
            "cannot bind {:?} to a NUMERIC parameter; cast the column to text",
            s
        )
        .into()),
        _ => s.to_sql(ty, out),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value, ValueRef};

        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(*b as i64)),
            SqlValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Read statements are exactly those whose trimmed text starts with `SELECT`.
pub fn is_select(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    trimmed
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("SELECT"))
        .unwrap_or(false)
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn is_read(&self) -> bool {
        is_select(&self.sql)
    }

    /// The statement with parameters substituted as literals, for logs.
    pub fn inline(&self, dialect: Dialect) -> String {
        let mut text = self.sql.clone();
        for (i, value) in self.params.iter().enumerate().rev() {
            text = text.replace(&dialect.placeholder(i + 1), &value.to_literal());
        }
        text
    }
}

/// Incrementally assembles a [`Statement`]: SQL fragments, validated
/// identifiers and bound values.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        self.sql.push_str(&ident.quoted());
        self
    }

    /// Push quoted identifiers joined by `", "`.
    pub fn push_ident_list<'a>(&mut self, idents: impl IntoIterator<Item = &'a Ident>) -> &mut Self {
        let list = idents
            .into_iter()
            .map(Ident::quoted)
            .collect::<Vec<_>>()
            .join(", ");
        self.sql.push_str(&list);
        self
    }

    /// Append a placeholder and bind `value` to it.
    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub max_width: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Unknown(String),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            other => other.to_text().unwrap_or_default(),
        }
    }

    /// Textual form as carried by the row codec; `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            CellValue::Null => return None,
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int16(i) => i.to_string(),
            CellValue::Int32(i) => i.to_string(),
            CellValue::Int64(i) => i.to_string(),
            CellValue::Float32(f) => f.to_string(),
            CellValue::Float64(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            CellValue::Date(d) => d.to_string(),
            CellValue::Time(t) => t.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::TimestampTz(dt) => dt.to_rfc3339(),
            CellValue::Json(j) => j.to_string(),
            CellValue::Unknown(s) => s.clone(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Int16(i) => serde_json::json!(*i),
            CellValue::Int32(i) => serde_json::json!(*i),
            CellValue::Int64(i) => serde_json::json!(*i),
            CellValue::Float32(f) => serde_json::json!(*f),
            CellValue::Float64(f) => serde_json::json!(*f),
            CellValue::Json(j) => j.clone(),
            other => serde_json::Value::String(other.display()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int16(i) => Some(*i as i64),
            CellValue::Int32(i) => Some(*i as i64),
            CellValue::Int64(i) => Some(*i),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn display_width(&self) -> usize {
        unicode_width::UnicodeWidthStr::width(self.display().as_str())
    }

    pub fn from_sqlite(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;

        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Int64(i),
            ValueRef::Real(f) => CellValue::Float64(f),
            ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => CellValue::Bytes(b.to_vec()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    pub execution_time: Duration,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            row_count: 0,
            execution_time: Duration::ZERO,
        }
    }

    pub fn from_rows(
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<CellValue>>,
        execution_time: Duration,
    ) -> Self {
        let mut columns = columns;
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(col) = columns.get_mut(i) {
                    col.max_width = col.max_width.max(cell.display_width());
                }
            }
        }
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows as text, NULL rendered as the empty string.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_text().unwrap_or_default()).collect())
            .collect()
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Encode through the row codec.
    pub fn to_raw_string(&self) -> String {
        codec::encode_rows(&self.text_rows())
    }
}

/// What a statement produced.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Rows(QueryResult),
    Affected { count: u64, execution_time: Duration },
}

impl QueryOutcome {
    /// Row text for reads, the affected-row count for writes.
    pub fn to_raw_string(&self) -> String {
        match self {
            QueryOutcome::Rows(result) => result.to_raw_string(),
            QueryOutcome::Affected { count, .. } => count.to_string(),
        }
    }

    pub fn into_rows(self) -> QueryResult {
        match self {
            QueryOutcome::Rows(result) => result,
            QueryOutcome::Affected { execution_time, .. } => QueryResult {
                execution_time,
                ..QueryResult::empty()
            },
        }
    }

    pub fn affected(&self) -> u64 {
        match self {
            QueryOutcome::Rows(result) => result.row_count as u64,
            QueryOutcome::Affected { count, .. } => *count,
        }
    }
}

pub(crate) fn parse_pg_rows(rows: &[Row], execution_time: Duration) -> QueryResult {
    let Some(first_row) = rows.first() else {
        return QueryResult {
            execution_time,
            ..QueryResult::empty()
        };
    };

    let columns: Vec<ColumnInfo> = first_row
        .columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            type_name: col.type_().name().to_string(),
            max_width: unicode_width::UnicodeWidthStr::width(col.name()),
        })
        .collect();

    let result_rows = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| extract_value(row, i, col.type_()))
                .collect()
        })
        .collect();

    QueryResult::from_rows(columns, result_rows, execution_time)
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Bool)
            .unwrap_or(CellValue::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Int16)
            .unwrap_or(CellValue::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Int32)
            .unwrap_or(CellValue::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Int64)
            .unwrap_or(CellValue::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Float32)
            .unwrap_or(CellValue::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Float64)
            .unwrap_or(CellValue::Null),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Bytes)
            .unwrap_or(CellValue::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Time)
            .unwrap_or(CellValue::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .ok()
            .flatten()
            .map(CellValue::TimestampTz)
            .unwrap_or(CellValue::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Json)
            .unwrap_or(CellValue::Null),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(s)) => CellValue::Text(s),
            Ok(None) => CellValue::Null,
            Err(_) => CellValue::Unknown(format!("<{}>", pg_type.name())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_select() {
        assert!(is_select("SELECT 1"));
        assert!(is_select("  select * from t"));
        assert!(is_select("\n\tSeLeCt id FROM t"));
        assert!(!is_select("INSERT INTO t VALUES (1)"));
        assert!(!is_select("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_select("SEL"));
        assert!(!is_select(""));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
    }

    #[test]
    fn test_translate_type() {
        assert_eq!(
            Dialect::Postgres.translate_type("integer primary key   autoincrement"),
            "SERIAL PRIMARY KEY"
        );
        assert_eq!(
            Dialect::Sqlite.translate_type("SERIAL PRIMARY KEY"),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
        assert_eq!(
            Dialect::Sqlite.translate_type("AUTO_INCREMENT"),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
        assert_eq!(Dialect::Postgres.translate_type("TEXT"), "TEXT");
        assert_eq!(Dialect::Sqlite.translate_type("varchar(20)"), "varchar(20)");
    }

    #[test]
    fn test_builder_binds_in_order() {
        let table = Ident::strict("users").unwrap();
        let col = Ident::column("name").unwrap();
        let mut b = StatementBuilder::new(Dialect::Postgres);
        b.push("UPDATE ")
            .push_ident(&table)
            .push(" SET ")
            .push_ident(&col)
            .push(" = ")
            .push_bind("O'Brien")
            .push(" WHERE id = ")
            .push_bind(7i64);
        let stmt = b.build();
        assert_eq!(stmt.sql, "UPDATE \"users\" SET \"name\" = $1 WHERE id = $2");
        assert_eq!(stmt.params, vec![SqlValue::from("O'Brien"), SqlValue::Int(7)]);
        assert_eq!(
            stmt.inline(Dialect::Postgres),
            "UPDATE \"users\" SET \"name\" = 'O''Brien' WHERE id = 7"
        );
    }

    #[test]
    fn test_inline_handles_double_digit_placeholders() {
        let mut b = StatementBuilder::new(Dialect::Sqlite);
        for i in 0..11 {
            if i > 0 {
                b.push(",");
            }
            b.push_bind(i as i64);
        }
        let stmt = b.build();
        assert_eq!(stmt.inline(Dialect::Sqlite), "0,1,2,3,4,5,6,7,8,9,10");
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::Null.to_literal(), "NULL");
        assert_eq!(SqlValue::Bool(true).to_literal(), "TRUE");
        assert_eq!(SqlValue::Null.to_text(), None);
    }

    #[test]
    fn test_pg_binding_adapts_to_parameter_type() {
        let mut buf = BytesMut::new();
        SqlValue::Text("42".into()).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(&buf[..], &42i32.to_be_bytes());

        let mut buf = BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::TEXT, &mut buf).unwrap();
        assert_eq!(&buf[..], b"7");

        let mut buf = BytesMut::new();
        assert!(SqlValue::Int(70_000).to_sql(&Type::INT2, &mut buf).is_err());

        let mut buf = BytesMut::new();
        assert!(matches!(SqlValue::Null.to_sql(&Type::INT8, &mut buf), Ok(IsNull::Yes)));
    }

    #[test]
    fn test_cell_text_and_display() {
        assert_eq!(CellValue::Null.display(), "NULL");
        assert_eq!(CellValue::Null.to_text(), None);
        assert_eq!(CellValue::Int32(-100).display(), "-100");
        assert_eq!(CellValue::Text("hello".into()).display_width(), 5);
        assert_eq!(CellValue::Bool(false).to_text().unwrap(), "false");
        assert_eq!(CellValue::Text(" 12 ".into()).as_i64(), Some(12));
    }

    #[test]
    fn test_cell_to_json() {
        assert!(CellValue::Null.to_json().is_null());
        assert_eq!(CellValue::Int32(42).to_json(), serde_json::json!(42));
        assert_eq!(CellValue::Text("a".into()).to_json(), serde_json::json!("a"));
    }

    #[test]
    fn test_result_raw_string_uses_codec() {
        let result = QueryResult::from_rows(
            vec![
                ColumnInfo { name: "id".into(), type_name: "int8".into(), max_width: 2 },
                ColumnInfo { name: "name".into(), type_name: "text".into(), max_width: 4 },
            ],
            vec![
                vec![CellValue::Int64(1), CellValue::Text("Alice".into())],
                vec![CellValue::Int64(2), CellValue::Null],
            ],
            Duration::ZERO,
        );
        assert_eq!(result.row_count, 2);
        assert_eq!(result.columns[1].max_width, 5);
        assert_eq!(result.to_raw_string(), "1¦Alice¬2¦");
        let outcome = QueryOutcome::Affected { count: 3, execution_time: Duration::ZERO };
        assert_eq!(outcome.to_raw_string(), "3");
    }
}
