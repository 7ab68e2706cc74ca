use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::audit::{AuditLog, SharedAuditLog};
use crate::db::{
    codec, open_backend, quote_ident, Backend, CellValue, ColumnDetails, ColumnSpec, Dialect, Ident, QueryExecutor,
    QueryOutcome, QueryResult, RetryPolicy, SchemaManager, SqlValue, Statement, StatementBuilder,
    StoreConfig, StoreError, StoreResult, ID_COLUMN,
};
use crate::json::{document_columns, document_from_row, empty_document};

/// Column name and value pairs, in column order.
pub type Record = Vec<(String, SqlValue)>;

/// Which rows a read, update or delete applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Id(SqlValue),
    /// Every pair must match. A `Null` value matches `IS NULL`.
    Where(Vec<(Ident, SqlValue)>),
    All,
}

impl Selector {
    pub fn id(value: impl Into<SqlValue>) -> Self {
        Selector::Id(value.into())
    }

    pub fn where_eq(column: &str, value: impl Into<SqlValue>) -> StoreResult<Self> {
        Ok(Selector::Where(vec![(Ident::column(column)?, value.into())]))
    }

    fn push_to(&self, b: &mut StatementBuilder) {
        match self {
            Selector::All => {}
            Selector::Id(id) => {
                b.push(" WHERE ")
                    .push(&quote_ident(ID_COLUMN))
                    .push(" = ")
                    .push_bind(id.clone());
            }
            Selector::Where(pairs) => {
                for (i, (column, value)) in pairs.iter().enumerate() {
                    b.push(if i == 0 { " WHERE " } else { " AND " });
                    b.push_ident(column);
                    if *value == SqlValue::Null {
                        b.push(" IS NULL");
                    } else {
                        b.push(" = ").push_bind(value.clone());
                    }
                }
            }
        }
    }
}

/// Record-level access to one backend: raw statements, column-addressed
/// reads and writes, JSON documents and schema changes.
#[derive(Clone)]
pub struct Store {
    exec: QueryExecutor,
    schema: SchemaManager,
}

impl Store {
    /// No connection is made here; each operation opens its own.
    pub fn open(config: &StoreConfig) -> Self {
        let mut exec = QueryExecutor::new(open_backend(&config.backend), config.retry.clone());
        if config.audit {
            exec = exec.with_audit(AuditLog::new().shared());
        }
        Self::with_executor(exec)
    }

    pub fn with_backend(backend: Arc<dyn Backend>, retry: RetryPolicy) -> Self {
        Self::with_executor(QueryExecutor::new(backend, retry))
    }

    pub fn with_executor(exec: QueryExecutor) -> Self {
        Self {
            schema: SchemaManager::new(exec.clone()),
            exec,
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.exec
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    pub fn dialect(&self) -> Dialect {
        self.exec.dialect()
    }

    pub fn audit_log(&self) -> Option<&SharedAuditLog> {
        self.exec.audit_log()
    }

    // --- Raw statements ---

    /// Run raw SQL. Reads come back codec-encoded, writes as the affected
    /// row count.
    pub async fn execute(&self, sql: &str) -> StoreResult<String> {
        self.exec.execute_raw(&Statement::raw(sql)).await
    }

    /// Like [`Store::execute`], but failures are logged and return `""`.
    pub async fn execute_lenient(&self, sql: &str) -> String {
        self.exec.execute_lenient(&Statement::raw(sql)).await
    }

    pub async fn run(&self, statement: &Statement) -> StoreResult<QueryOutcome> {
        self.exec.execute(statement).await
    }

    // --- Reads ---

    fn select(&self, table: &Ident, selector: &Selector, columns: &[&str]) -> StoreResult<Statement> {
        let mut b = StatementBuilder::new(self.dialect());
        b.push("SELECT ");
        if columns.is_empty() {
            b.push("*");
        } else {
            let idents = columns
                .iter()
                .map(|c| Ident::column_for(self.dialect(), c))
                .collect::<StoreResult<Vec<_>>>()?;
            b.push_ident_list(&idents);
        }
        b.push(" FROM ").push_ident(table);
        selector.push_to(&mut b);
        Ok(b.build())
    }

    /// Matching rows with the requested columns, or every column when
    /// `columns` is empty.
    pub async fn query_rows(&self, table: &str, selector: &Selector, columns: &[&str]) -> StoreResult<QueryResult> {
        let table = table_ident(table)?;
        let statement = self.select(&table, selector, columns)?;
        self.exec.query(&statement).await
    }

    /// Matching rows, codec-encoded.
    pub async fn get(&self, table: &str, selector: &Selector, columns: &[&str]) -> StoreResult<String> {
        Ok(self.query_rows(table, selector, columns).await?.to_raw_string())
    }

    pub async fn get_lines(&self, table: &str, selector: &Selector, columns: &[&str]) -> StoreResult<Vec<Vec<String>>> {
        let raw = self.get(table, selector, columns).await?;
        Ok(codec::get_lines(&raw).iter().map(|line| codec::get_line(line)).collect())
    }

    /// Fields of the first matching row; empty when nothing matches.
    pub async fn get_line(&self, table: &str, selector: &Selector, columns: &[&str]) -> StoreResult<Vec<String>> {
        let raw = self.get(table, selector, columns).await?;
        Ok(codec::get_lines(&raw)
            .first()
            .map(|line| codec::get_line(line))
            .unwrap_or_default())
    }

    /// First matching row as a name to value map; empty when nothing
    /// matches.
    pub async fn get_columns(
        &self,
        table: &str,
        selector: &Selector,
        columns: &[&str],
    ) -> StoreResult<BTreeMap<String, String>> {
        let result = self.query_rows(table, selector, columns).await?;
        let raw = result.to_raw_string();
        let lines = codec::get_lines(&raw);
        Ok(lines
            .first()
            .map(|line| codec::get_columns(&result.column_names(), line))
            .unwrap_or_default())
    }

    // --- Writes ---

    /// Create the table or add columns so every name in `record` exists.
    /// New columns are TEXT.
    async fn ensure_columns(&self, table: &Ident, record: &[(String, SqlValue)], id: Option<&SqlValue>) -> StoreResult<()> {
        let wanted: Vec<ColumnSpec> = record
            .iter()
            .filter(|(name, _)| name != ID_COLUMN)
            .map(|(name, _)| ColumnSpec::text(name.clone()))
            .collect();

        if !self.schema.table_exists(table).await? {
            let id_decl = match id {
                Some(SqlValue::Text(_)) => "TEXT PRIMARY KEY",
                _ => "AUTO_INCREMENT",
            };
            let mut structure = vec![ColumnSpec::new(ID_COLUMN, id_decl)];
            structure.extend(wanted);
            self.schema.create_table(table, &structure).await?;
            return Ok(());
        }

        self.schema.add_columns(table, &wanted).await?;
        Ok(())
    }

    /// Update the rows matched by `selector`.
    ///
    /// Missing columns are added first. With [`Selector::Id`] an absent row
    /// is inserted; `Where` and `All` only update. Returns the affected row
    /// count.
    #[instrument(skip(self, record))]
    pub async fn upd(&self, table: &str, selector: &Selector, record: &[(String, SqlValue)]) -> StoreResult<u64> {
        let table = table_ident(table)?;
        let record = dedupe(record);
        let id = match selector {
            Selector::Id(id) => Some(id),
            _ => None,
        };
        self.ensure_columns(&table, &record, id).await?;

        let values: Vec<&(String, SqlValue)> = record.iter().filter(|(name, _)| name != ID_COLUMN).collect();
        if !values.is_empty() {
            let mut b = StatementBuilder::new(self.dialect());
            b.push("UPDATE ").push_ident(&table).push(" SET ");
            for (i, (name, value)) in values.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.push_ident(&Ident::column_for(self.dialect(), name)?).push(" = ").push_bind(value.clone());
            }
            selector.push_to(&mut b);
            let affected = self.exec.execute(&b.build()).await?.affected();
            if affected > 0 {
                return Ok(affected);
            }
        }

        let Some(id) = id else {
            return Ok(0);
        };
        if values.is_empty() {
            let existing = self.query_rows(table.as_str(), selector, &[ID_COLUMN]).await?;
            if existing.row_count > 0 {
                return Ok(0);
            }
        }

        debug!(table = %table, "no row to update; inserting");
        let mut with_id: Record = vec![(ID_COLUMN.to_string(), id.clone())];
        with_id.extend(values.into_iter().cloned());
        Ok(self.insert(&table, &with_id).await?.affected())
    }

    /// Insert a row, adding missing columns first. Returns the row's id:
    /// the one supplied in `record`, or the highest id after the insert.
    ///
    /// The generated-id lookup is a separate statement; concurrent inserts
    /// into the same table can observe each other's ids.
    #[instrument(skip(self, record))]
    pub async fn insert_dic(&self, table: &str, record: &[(String, SqlValue)]) -> StoreResult<SqlValue> {
        let table = table_ident(table)?;
        let record = dedupe(record);
        let supplied_id = record
            .iter()
            .find(|(name, _)| name == ID_COLUMN)
            .map(|(_, value)| value.clone());
        self.ensure_columns(&table, &record, supplied_id.as_ref()).await?;
        self.insert(&table, &record).await?;

        if let Some(id) = supplied_id {
            return Ok(id);
        }
        let mut b = StatementBuilder::new(self.dialect());
        b.push("SELECT MAX(")
            .push(&quote_ident(ID_COLUMN))
            .push(") FROM ")
            .push_ident(&table);
        let result = self.exec.query(&b.build()).await?;
        Ok(result.scalar().map(cell_to_sql).unwrap_or(SqlValue::Null))
    }

    async fn insert(&self, table: &Ident, record: &[(String, SqlValue)]) -> StoreResult<QueryOutcome> {
        let mut b = StatementBuilder::new(self.dialect());
        b.push("INSERT INTO ").push_ident(table);
        if record.is_empty() {
            b.push(" DEFAULT VALUES");
        } else {
            let names = record
                .iter()
                .map(|(name, _)| Ident::column_for(self.dialect(), name))
                .collect::<StoreResult<Vec<_>>>()?;
            b.push(" (").push_ident_list(&names).push(") VALUES (");
            for (i, (_, value)) in record.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.push_bind(value.clone());
            }
            b.push(")");
        }
        self.exec.execute(&b.build()).await
    }

    pub async fn del(&self, table: &str, selector: &Selector) -> StoreResult<u64> {
        let table = table_ident(table)?;
        let mut b = StatementBuilder::new(self.dialect());
        b.push("DELETE FROM ").push_ident(&table);
        selector.push_to(&mut b);
        Ok(self.exec.execute(&b.build()).await?.affected())
    }

    // --- Documents ---

    /// Store `document` as flattened columns plus its structure.
    ///
    /// [`Selector::All`] inserts a new row and `Id` upserts that row.
    /// `Where` replaces the lowest-id matching row, or inserts a new one
    /// when nothing matches. Returns the row's id.
    #[instrument(skip(self, document))]
    pub async fn write_document(&self, table: &str, document: &Value, selector: &Selector) -> StoreResult<SqlValue> {
        let record: Record = document_columns(document)?
            .into_iter()
            .map(|(name, value)| (name, SqlValue::from(value)))
            .collect();
        match selector {
            Selector::All => self.insert_dic(table, &record).await,
            Selector::Id(id) => {
                self.upd(table, selector, &record).await?;
                Ok(id.clone())
            }
            Selector::Where(_) => match self.first_id(table, selector).await? {
                Some(id) => {
                    self.upd(table, &Selector::Id(id.clone()), &record).await?;
                    Ok(id)
                }
                None => self.insert_dic(table, &record).await,
            },
        }
    }

    /// Lowest id among the rows matched by `selector`; `None` when the
    /// table is missing or nothing matches.
    async fn first_id(&self, table: &str, selector: &Selector) -> StoreResult<Option<SqlValue>> {
        let ident = table_ident(table)?;
        if !self.schema.table_exists(&ident).await? {
            return Ok(None);
        }
        let mut statement = self.select(&ident, selector, &[ID_COLUMN])?;
        statement.sql.push_str(&format!(" ORDER BY {} LIMIT 1", quote_ident(ID_COLUMN)));
        let result = self.exec.query(&statement).await?;
        Ok(result.scalar().map(cell_to_sql))
    }

    /// Rebuild the document stored in row `id`, or in the lowest-id row.
    ///
    /// A missing table, a missing row or an unusable structure column all
    /// give `{}`.
    pub async fn read_document(&self, table: &str, id: Option<SqlValue>) -> StoreResult<Value> {
        let ident = table_ident(table)?;
        if !self.schema.table_exists(&ident).await? {
            return Ok(empty_document());
        }
        let selector = id.map(Selector::Id).unwrap_or(Selector::All);
        let mut statement = self.select(&ident, &selector, &[])?;
        statement.sql.push_str(&format!(" ORDER BY {} LIMIT 1", quote_ident(ID_COLUMN)));
        let result = self.exec.query(&statement).await?;
        Ok(row_maps(&result)
            .first()
            .map(document_from_row)
            .unwrap_or_else(empty_document))
    }

    /// Every document in the table, in id order.
    pub async fn read_documents(&self, table: &str) -> StoreResult<Vec<Value>> {
        let ident = table_ident(table)?;
        if !self.schema.table_exists(&ident).await? {
            return Ok(Vec::new());
        }
        let mut statement = self.select(&ident, &Selector::All, &[])?;
        statement.sql.push_str(&format!(" ORDER BY {}", quote_ident(ID_COLUMN)));
        let result = self.exec.query(&statement).await?;
        Ok(row_maps(&result).iter().map(document_from_row).collect())
    }

    // --- Schema ---

    pub async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        self.schema.table_exists(&table_ident(table)?).await
    }

    pub async fn create_table(&self, table: &str, structure: &[ColumnSpec]) -> StoreResult<bool> {
        self.schema.create_table(&table_ident(table)?, structure).await
    }

    /// Columns in physical order. A missing table is a configuration error.
    pub async fn columns(&self, table: &str) -> StoreResult<Vec<ColumnDetails>> {
        let ident = table_ident(table)?;
        let columns = self.schema.columns(&ident).await?;
        if columns.is_empty() {
            return Err(StoreError::Configuration(format!("table {} does not exist", ident)));
        }
        Ok(columns)
    }

    pub async fn add_columns(&self, table: &str, columns: &[ColumnSpec]) -> StoreResult<Vec<String>> {
        self.schema.add_columns(&table_ident(table)?, columns).await
    }

    pub async fn drop_column(&self, table: &str, column: &str) -> StoreResult<bool> {
        self.schema.drop_column(&table_ident(table)?, column).await
    }

    pub async fn prune_columns<S: AsRef<str>>(&self, table: &str, keep: &[S]) -> StoreResult<Vec<String>> {
        self.schema.prune_columns(&table_ident(table)?, keep).await
    }

    pub async fn prune_empty_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        self.schema.prune_empty_columns(&table_ident(table)?).await
    }

    pub async fn rearrange_columns(&self, table: &str, target: &[ColumnSpec]) -> StoreResult<()> {
        if table.trim().is_empty() {
            return Err(missing_table());
        }
        self.schema.rearrange_columns(table, target).await
    }
}

fn missing_table() -> StoreError {
    StoreError::Configuration("missing table name".to_string())
}

fn table_ident(name: &str) -> StoreResult<Ident> {
    if name.trim().is_empty() {
        return Err(missing_table());
    }
    Ident::strict(name)
}

/// Later pairs win over earlier ones with the same name.
fn dedupe(record: &[(String, SqlValue)]) -> Record {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(record.len());
    for (name, value) in record.iter().rev() {
        if seen.insert(name.as_str()) {
            out.push((name.clone(), value.clone()));
        }
    }
    out.reverse();
    out
}

fn cell_to_sql(cell: &CellValue) -> SqlValue {
    match cell {
        CellValue::Null => SqlValue::Null,
        CellValue::Bool(b) => SqlValue::Bool(*b),
        CellValue::Float32(f) => SqlValue::Float(*f as f64),
        CellValue::Float64(f) => SqlValue::Float(*f),
        other => match other.as_i64() {
            Some(i) if !matches!(other, CellValue::Text(_)) => SqlValue::Int(i),
            _ => SqlValue::from(other.to_text()),
        },
    }
}

fn row_maps(result: &QueryResult) -> Vec<BTreeMap<String, Option<String>>> {
    let names = result.column_names();
    result
        .rows
        .iter()
        .map(|row| {
            names
                .iter()
                .zip(row)
                .map(|(name, cell)| (name.to_string(), cell.to_text()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ScriptedBackend, SqliteBackend};
    use serde_json::json;

    fn sqlite_store(dir: &tempfile::TempDir) -> Store {
        Store::with_backend(
            Arc::new(SqliteBackend::new(dir.path().join("store.db"))),
            RetryPolicy::immediate(10),
        )
    }

    fn rec(pairs: &[(&str, SqlValue)]) -> Record {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_selector_rendering() {
        let mut b = StatementBuilder::new(Dialect::Postgres);
        b.push("SELECT * FROM t");
        Selector::Where(vec![
            (Ident::column("a").unwrap(), SqlValue::from("x")),
            (Ident::column("b").unwrap(), SqlValue::Null),
        ])
        .push_to(&mut b);
        let stmt = b.build();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE \"a\" = $1 AND \"b\" IS NULL");
        assert_eq!(stmt.params, vec![SqlValue::from("x")]);
    }

    #[test]
    fn test_dedupe_keeps_last() {
        let out = dedupe(&rec(&[("a", SqlValue::Int(1)), ("b", SqlValue::Int(2)), ("a", SqlValue::Int(3))]));
        assert_eq!(out, rec(&[("b", SqlValue::Int(2)), ("a", SqlValue::Int(3))]));
    }

    #[tokio::test]
    async fn test_missing_table_name_is_configuration_error() {
        let backend = Arc::new(ScriptedBackend::new(Dialect::Sqlite, vec![]));
        let store = Store::with_backend(backend.clone(), RetryPolicy::immediate(1));
        let err = store.get(" ", &Selector::All, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
        let err = store.get("bad name", &Selector::All, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier { .. }));
        assert_eq!(backend.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upd_creates_table_and_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);

        store.upd("people", &Selector::id(1i64), &rec(&[("name", "Ann".into())])).await.unwrap();
        store
            .upd("people", &Selector::id(1i64), &rec(&[("city", "Oslo".into())]))
            .await
            .unwrap();
        store.upd("people", &Selector::id(2i64), &rec(&[("name", "Bo".into())])).await.unwrap();

        let row = store
            .get_columns("people", &Selector::id(1i64), &["id", "name", "city"])
            .await
            .unwrap();
        assert_eq!(row["name"], "Ann");
        assert_eq!(row["city"], "Oslo");
        assert_eq!(store.get("people", &Selector::All, &["name"]).await.unwrap(), "Ann¬Bo");
        assert_eq!(
            store.get_line("people", &Selector::id(2i64), &["id", "name", "city"]).await.unwrap(),
            vec!["2", "Bo", ""]
        );
    }

    #[tokio::test]
    async fn test_upd_by_where_updates_matches_without_inserting() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);
        for (id, city) in [(1i64, "Oslo"), (2, "Bergen"), (3, "Oslo")] {
            store
                .upd("people", &Selector::id(id), &rec(&[("city", city.into())]))
                .await
                .unwrap();
        }

        let oslo = Selector::where_eq("city", "Oslo").unwrap();
        let affected = store.upd("people", &oslo, &rec(&[("zone", "north".into())])).await.unwrap();
        assert_eq!(affected, 2);
        assert_eq!(
            store.get_lines("people", &Selector::All, &["id", "zone"]).await.unwrap(),
            vec![vec!["1", "north"], vec!["2", ""], vec!["3", "north"]]
        );

        let nowhere = Selector::where_eq("city", "Paris").unwrap();
        assert_eq!(store.upd("people", &nowhere, &rec(&[("zone", "west".into())])).await.unwrap(), 0);
        assert_eq!(store.get("people", &Selector::All, &["id"]).await.unwrap(), "1¬2¬3");
    }

    #[tokio::test]
    async fn test_columns_of_missing_table_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);
        assert!(matches!(
            store.columns("nothing").await,
            Err(StoreError::Configuration(_))
        ));
        store.upd("present", &Selector::id(1i64), &rec(&[("a", "1".into())])).await.unwrap();
        assert_eq!(store.columns("present").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_dic_returns_new_id_and_del() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);

        let first = store.insert_dic("log", &rec(&[("msg", "a".into())])).await.unwrap();
        let second = store.insert_dic("log", &rec(&[("msg", "b".into())])).await.unwrap();
        assert_eq!(first, SqlValue::Int(1));
        assert_eq!(second, SqlValue::Int(2));

        let lines = store.get_lines("log", &Selector::All, &["id", "msg"]).await.unwrap();
        assert_eq!(lines, vec![vec!["1", "a"], vec!["2", "b"]]);

        let removed = store
            .del("log", &Selector::where_eq("msg", "a").unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_columns("log", &Selector::id(1i64), &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_documents_round_trip_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);

        let doc = json!({"user": {"name": "Bob", "tags": ["x", "y"]}, "score": 4.5, "vip": true});
        let id = store.write_document("docs", &doc, &Selector::All).await.unwrap();
        assert_eq!(store.read_document("docs", Some(id.clone())).await.unwrap(), doc);

        let replacement = json!({"user": {"name": "Rob"}});
        store
            .write_document("docs", &replacement, &Selector::Id(id.clone()))
            .await
            .unwrap();
        assert_eq!(store.read_document("docs", Some(id)).await.unwrap(), replacement);

        store.write_document("docs", &json!({"n": 1}), &Selector::All).await.unwrap();
        let all = store.read_documents("docs").await.unwrap();
        assert_eq!(all, vec![replacement, json!({"n": 1})]);
    }

    #[tokio::test]
    async fn test_write_document_by_where_replaces_match_or_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);

        let by_sku = Selector::where_eq("sku", "A-1").unwrap();
        let first = store
            .write_document("items", &json!({"sku": "A-1", "qty": 1}), &by_sku)
            .await
            .unwrap();
        assert_eq!(first, SqlValue::Int(1));

        let updated = json!({"sku": "A-1", "qty": 5, "tags": ["sale"]});
        let again = store.write_document("items", &updated, &by_sku).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(store.read_documents("items").await.unwrap(), vec![updated.clone()]);

        let other = store
            .write_document("items", &json!({"sku": "B-2"}), &Selector::where_eq("sku", "B-2").unwrap())
            .await
            .unwrap();
        assert_eq!(other, SqlValue::Int(2));
        assert_eq!(store.read_document("items", Some(first)).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_read_document_absent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(&dir);
        assert_eq!(store.read_document("nothing", None).await.unwrap(), json!({}));

        store.upd("plain", &Selector::id(1i64), &rec(&[("a", "1".into())])).await.unwrap();
        assert_eq!(store.read_document("plain", Some(SqlValue::Int(1))).await.unwrap(), json!({}));
        assert_eq!(store.read_document("plain", Some(SqlValue::Int(9))).await.unwrap(), json!({}));
    }
}
