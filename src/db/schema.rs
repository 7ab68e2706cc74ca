use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

use super::error::{StoreError, StoreResult};
use super::executor::QueryExecutor;
use super::ident::{quote_ident, Ident};
use super::query::{CellValue, Dialect, QueryResult, Statement, StatementBuilder};

/// The primary key every table carries.
pub const ID_COLUMN: &str = "id";

/// Type used for columns added on demand.
pub const DEFAULT_COLUMN_TYPE: &str = "TEXT";

const TEMP_MARKER: &str = "_tmp_";
/// `%Y%m%d%H%M%S%6f` + `_` + four random digits.
const TEMP_SUFFIX_LEN: usize = 20 + 1 + 4;
const TEMP_PREFIX_MAX: usize = 33;

/// A column name with its backend type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub decl: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, decl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decl: decl.into(),
        }
    }

    /// A column of [`DEFAULT_COLUMN_TYPE`].
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_COLUMN_TYPE)
    }

    /// Parse `name` or `name:TYPE`. A bare name carries an empty declaration.
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((name, decl)) => Self::new(name.trim(), decl.trim()),
            None => Self::new(s.trim(), ""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDetails {
    pub name: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i64,
    /// Key generated by a PostgreSQL sequence or SQLite `AUTOINCREMENT`.
    pub auto_increment: bool,
}

/// One column of a rearranged table.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedColumn {
    pub name: String,
    pub decl: String,
    /// Expression selecting this column's value from the original table.
    pub copy_expr: String,
}

/// Result of [`plan_rearrange`].
#[derive(Debug, Clone, PartialEq)]
pub struct RearrangePlan {
    pub columns: Vec<PlannedColumn>,
    /// The id's sequence must be carried over to the rebuilt table.
    pub carry_id_sequence: bool,
}

/// Table and column lifecycle on top of a [`QueryExecutor`].
///
/// Schema-changing operations take no lock; callers must not run them
/// concurrently against the same table.
#[derive(Clone)]
pub struct SchemaManager {
    exec: QueryExecutor,
}

impl SchemaManager {
    pub fn new(exec: QueryExecutor) -> Self {
        Self { exec }
    }

    fn dialect(&self) -> Dialect {
        self.exec.dialect()
    }

    fn builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.dialect())
    }

    async fn count(&self, statement: &Statement) -> StoreResult<i64> {
        let result = self.exec.query(statement).await?;
        Ok(result.scalar().and_then(CellValue::as_i64).unwrap_or(0))
    }

    pub async fn table_exists(&self, table: &Ident) -> StoreResult<bool> {
        let mut b = self.builder();
        match self.dialect() {
            Dialect::Postgres => b.push(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = ",
            ),
            Dialect::Sqlite => b.push("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = "),
        };
        b.push_bind(table.as_str());
        Ok(self.count(&b.build()).await? != 0)
    }

    pub async fn list_tables(&self) -> StoreResult<Vec<String>> {
        let sql = match self.dialect() {
            Dialect::Postgres => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
        };
        let result = self.exec.query(&Statement::raw(sql)).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(CellValue::to_text))
            .collect())
    }

    /// Current columns in physical order. Empty when the table is missing.
    pub async fn columns(&self, table: &Ident) -> StoreResult<Vec<ColumnDetails>> {
        let mut b = self.builder();
        match self.dialect() {
            Dialect::Postgres => b.push(
                r#"SELECT
                    a.attname AS name,
                    pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
                    COALESCE(i.indisprimary, false) AS is_primary_key,
                    pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_value,
                    a.attnum::int8 AS ordinal_position
                FROM pg_catalog.pg_attribute a
                JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                LEFT JOIN pg_catalog.pg_index i
                    ON i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
                WHERE n.nspname = current_schema()
                  AND a.attnum > 0
                  AND NOT a.attisdropped
                  AND c.relname = "#,
            ),
            Dialect::Sqlite => b.push("SELECT name, type, pk, dflt_value, cid FROM pragma_table_info("),
        };
        b.push_bind(table.as_str());
        match self.dialect() {
            Dialect::Postgres => b.push(" ORDER BY a.attnum"),
            Dialect::Sqlite => b.push(") ORDER BY cid"),
        };

        let result = self.exec.query(&b.build()).await?;
        let mut details = parse_column_details(&result);
        if self.dialect() == Dialect::Sqlite && self.sqlite_autoincrement(table).await? {
            for column in details.iter_mut().filter(|c| c.is_primary_key) {
                column.auto_increment = true;
            }
        }
        Ok(details)
    }

    /// Whether the table's declaration carries `AUTOINCREMENT`. The pragma
    /// does not report it.
    async fn sqlite_autoincrement(&self, table: &Ident) -> StoreResult<bool> {
        let mut b = self.builder();
        b.push("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ")
            .push_bind(table.as_str());
        let result = self.exec.query(&b.build()).await?;
        Ok(result
            .scalar()
            .and_then(CellValue::to_text)
            .map(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT"))
            .unwrap_or(false))
    }

    pub async fn column_names(&self, table: &Ident) -> StoreResult<Vec<String>> {
        Ok(self
            .columns(table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    /// Create `table` from an ordered structure unless it already exists.
    ///
    /// An `id` column is prepended when the structure lacks one. Returns
    /// whether the table was created.
    #[instrument(skip_all, fields(table = %table))]
    pub async fn create_table(&self, table: &Ident, structure: &[ColumnSpec]) -> StoreResult<bool> {
        if self.table_exists(table).await? {
            return Ok(false);
        }

        let dialect = self.dialect();
        let mut defs = Vec::with_capacity(structure.len() + 1);
        if !structure.iter().any(|c| c.name == ID_COLUMN) {
            defs.push(column_def(ID_COLUMN, &dialect.translate_type("AUTO_INCREMENT")));
        }
        let mut seen = HashSet::new();
        for spec in structure {
            let name = Ident::column_for(dialect, &spec.name)?;
            if !seen.insert(name.as_str().to_string()) {
                return Err(StoreError::Configuration(format!(
                    "duplicate column {:?} in structure for {}",
                    spec.name, table
                )));
            }
            defs.push(column_def(name.as_str(), &dialect.translate_type(&spec.decl)));
        }

        let sql = format!("CREATE TABLE {} ({})", table.quoted(), defs.join(", "));
        self.exec.execute(&Statement::raw(sql)).await?;
        info!(columns = defs.len(), "created table");
        Ok(true)
    }

    /// Add one column unless present. Returns whether it was added.
    pub async fn add_column(&self, table: &Ident, column: &ColumnSpec) -> StoreResult<bool> {
        let added = self.add_columns(table, std::slice::from_ref(column)).await?;
        Ok(!added.is_empty())
    }

    /// Add every missing column, checked against a fresh column list.
    /// Returns the names actually added.
    #[instrument(skip_all, fields(table = %table))]
    pub async fn add_columns(&self, table: &Ident, columns: &[ColumnSpec]) -> StoreResult<Vec<String>> {
        let mut existing: HashSet<String> = self.column_names(table).await?.into_iter().collect();
        let dialect = self.dialect();
        let mut added = Vec::new();

        for spec in columns {
            if existing.contains(&spec.name) {
                continue;
            }
            let name = Ident::column_for(dialect, &spec.name)?;
            let decl = if spec.decl.trim().is_empty() {
                DEFAULT_COLUMN_TYPE.to_string()
            } else {
                dialect.translate_type(&spec.decl)
            };
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table.quoted(),
                column_def(name.as_str(), &decl)
            );
            self.exec.execute(&Statement::raw(sql)).await?;
            existing.insert(spec.name.clone());
            added.push(spec.name.clone());
        }

        if !added.is_empty() {
            info!(added = ?added, "added columns");
        }
        Ok(added)
    }

    /// Drop a column if present. Dependent objects go with it where the
    /// engine supports `CASCADE`. The `id` column is refused.
    pub async fn drop_column(&self, table: &Ident, column: &str) -> StoreResult<bool> {
        if column == ID_COLUMN {
            return Err(StoreError::Configuration(format!(
                "refusing to drop {:?} from {}",
                ID_COLUMN, table
            )));
        }
        let existing = self.column_names(table).await?;
        if !existing.iter().any(|c| c == column) {
            return Ok(false);
        }
        self.drop_existing_column(table, column).await?;
        Ok(true)
    }

    async fn drop_existing_column(&self, table: &Ident, column: &str) -> StoreResult<()> {
        let sql = match self.dialect() {
            Dialect::Postgres => format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {} CASCADE",
                table.quoted(),
                quote_ident(column)
            ),
            Dialect::Sqlite => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                table.quoted(),
                quote_ident(column)
            ),
        };
        self.exec.execute(&Statement::raw(sql)).await?;
        info!(table = %table, column, "dropped column");
        Ok(())
    }

    /// Drop every column not named in `keep`, except `id`.
    #[instrument(skip_all, fields(table = %table))]
    pub async fn prune_columns<S: AsRef<str>>(&self, table: &Ident, keep: &[S]) -> StoreResult<Vec<String>> {
        let keep: HashSet<&str> = keep.iter().map(AsRef::as_ref).collect();
        let mut dropped = Vec::new();
        for column in self.column_names(table).await? {
            if column == ID_COLUMN || keep.contains(column.as_str()) {
                continue;
            }
            self.drop_existing_column(table, &column).await?;
            dropped.push(column);
        }
        Ok(dropped)
    }

    /// Drop every non-`id` column holding no non-empty value.
    ///
    /// Issues one full-table count per column.
    #[instrument(skip_all, fields(table = %table))]
    pub async fn prune_empty_columns(&self, table: &Ident) -> StoreResult<Vec<String>> {
        let mut dropped = Vec::new();
        for column in self.column_names(table).await? {
            if column == ID_COLUMN {
                continue;
            }
            let quoted = quote_ident(&column);
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS NOT NULL AND CAST({} AS TEXT) <> ''",
                table.quoted(),
                quoted,
                quoted
            );
            if self.count(&Statement::raw(sql)).await? == 0 {
                self.drop_existing_column(table, &column).await?;
                dropped.push(column);
            }
        }
        Ok(dropped)
    }

    /// Rebuild `table` with the caller's column order and types.
    ///
    /// `id` goes first, then the listed columns that exist, then every
    /// remaining column in its current order and type. The data moves
    /// through a temporary table: create, copy, drop original, rename.
    /// Cleanup always runs afterwards. While the original still exists a
    /// leftover temporary table is dropped; once the original is gone the
    /// temporary table is renamed into its place instead. Orphans left by
    /// an earlier interrupted run are resolved the same way before starting.
    #[instrument(skip(self, target))]
    pub async fn rearrange_columns(&self, table_name: &str, target: &[ColumnSpec]) -> StoreResult<()> {
        let table = Ident::strict(table_name)?;
        let wrap = |source: StoreError| StoreError::Rearrange {
            table: table_name.to_string(),
            source: Box::new(source),
        };

        self.recover_orphans(&table).await.map_err(wrap)?;

        let current = self.columns(&table).await.map_err(wrap)?;
        if current.is_empty() {
            return Err(wrap(StoreError::Configuration(format!(
                "table {} does not exist",
                table
            ))));
        }
        let plan = plan_rearrange(self.dialect(), &current, target);
        let temp = Ident::strict(&temp_table_name(table.as_str())).map_err(wrap)?;

        let result = self.copy_swap(&table, &temp, &plan).await;
        if let Err(err) = &result {
            warn!(temp = %temp, error = %err, "rearrange failed; cleaning up");
        }
        let cleanup = self.cleanup_temp(&table, &temp).await;

        match (result, cleanup) {
            (Err(err), _) => Err(wrap(err)),
            (Ok(()), Err(err)) => {
                warn!(temp = %temp, error = %err, "post-rearrange cleanup failed");
                Ok(())
            }
            (Ok(()), Ok(())) => {
                info!(columns = plan.columns.len(), "rearranged table");
                Ok(())
            }
        }
    }

    async fn copy_swap(&self, table: &Ident, temp: &Ident, plan: &RearrangePlan) -> StoreResult<()> {
        let defs: Vec<String> = plan
            .columns
            .iter()
            .map(|c| column_def(&c.name, &c.decl))
            .collect();
        self.exec
            .execute(&Statement::raw(format!(
                "CREATE TABLE {} ({})",
                temp.quoted(),
                defs.join(", ")
            )))
            .await?;

        let names: Vec<String> = plan.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let exprs: Vec<&str> = plan.columns.iter().map(|c| c.copy_expr.as_str()).collect();
        self.exec
            .execute(&Statement::raw(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                temp.quoted(),
                names.join(", "),
                exprs.join(", "),
                table.quoted()
            )))
            .await?;

        if plan.carry_id_sequence {
            self.carry_id_sequence(table, temp).await?;
        }

        self.exec
            .execute(&Statement::raw(format!("DROP TABLE {}", table.quoted())))
            .await?;
        self.rename_table(temp, table).await
    }

    /// Move the id sequence of `table` onto `temp`, never lowering it, so
    /// ids of deleted rows are not handed out again after the swap.
    async fn carry_id_sequence(&self, table: &Ident, temp: &Ident) -> StoreResult<()> {
        match self.dialect() {
            Dialect::Postgres => {
                let mut b = self.builder();
                b.push("SELECT setval(pg_get_serial_sequence(")
                    .push_bind(temp.quoted())
                    .push(", 'id'), GREATEST(COALESCE((SELECT MAX(\"id\") FROM ")
                    .push_ident(temp)
                    .push("), 0), COALESCE((SELECT s.last_value FROM pg_sequences s, parse_ident(pg_get_serial_sequence(")
                    .push_bind(table.quoted())
                    .push(", 'id')) AS q(parts) WHERE s.schemaname = q.parts[1] AND s.sequencename = q.parts[2]), 0)) + 1, false)");
                self.exec.execute(&b.build()).await?;
            }
            Dialect::Sqlite => {
                // DROP TABLE forgets the original's row and RENAME moves the
                // temp table's row, so the counter travels with the copy.
                let mut b = self.builder();
                b.push("INSERT INTO sqlite_sequence (name, seq) SELECT ")
                    .push_bind(temp.as_str())
                    .push(", 0 WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = ")
                    .push_bind(temp.as_str())
                    .push(")");
                self.exec.execute(&b.build()).await?;

                let mut b = self.builder();
                b.push("UPDATE sqlite_sequence SET seq = MAX(seq, COALESCE((SELECT seq FROM sqlite_sequence WHERE name = ")
                    .push_bind(table.as_str())
                    .push("), 0)) WHERE name = ")
                    .push_bind(temp.as_str());
                self.exec.execute(&b.build()).await?;
            }
        }
        Ok(())
    }

    async fn rename_table(&self, from: &Ident, to: &Ident) -> StoreResult<()> {
        self.exec
            .execute(&Statement::raw(format!(
                "ALTER TABLE {} RENAME TO {}",
                from.quoted(),
                to.quoted()
            )))
            .await?;
        Ok(())
    }

    /// Resolve a leftover temporary table: drop it while the original
    /// exists, otherwise promote it to the original name.
    async fn cleanup_temp(&self, table: &Ident, temp: &Ident) -> StoreResult<()> {
        if !self.table_exists(temp).await? {
            return Ok(());
        }
        if self.table_exists(table).await? {
            self.exec
                .execute(&Statement::raw(format!("DROP TABLE {}", temp.quoted())))
                .await?;
            info!(temp = %temp, "dropped leftover temp table");
        } else {
            self.rename_table(temp, table).await?;
            warn!(temp = %temp, "restored table from temp copy");
        }
        Ok(())
    }

    async fn recover_orphans(&self, table: &Ident) -> StoreResult<()> {
        let mut orphans: Vec<String> = self
            .list_tables()
            .await?
            .into_iter()
            .filter(|name| is_temp_table_of(table.as_str(), name))
            .collect();
        // Newest first, so the latest copy is the one promoted.
        orphans.sort_unstable_by(|a, b| b.cmp(a));
        for orphan in orphans {
            let orphan = Ident::strict(&orphan)?;
            self.cleanup_temp(table, &orphan).await?;
        }
        Ok(())
    }
}

fn column_def(name: &str, decl: &str) -> String {
    let decl = decl.trim();
    if decl.is_empty() {
        quote_ident(name)
    } else {
        format!("{} {}", quote_ident(name), decl)
    }
}

fn cell_text(row: &[CellValue], idx: usize) -> Option<String> {
    row.get(idx).and_then(CellValue::to_text)
}

fn cell_truthy(row: &[CellValue], idx: usize) -> bool {
    match row.get(idx) {
        Some(CellValue::Bool(b)) => *b,
        Some(other) => other.as_i64().map(|i| i != 0).unwrap_or(false),
        None => false,
    }
}

/// Both catalog queries select name, type, primary-key flag, default and
/// position, in that order.
fn parse_column_details(result: &QueryResult) -> Vec<ColumnDetails> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(ColumnDetails {
                name: cell_text(row, 0)?,
                data_type: cell_text(row, 1).unwrap_or_default(),
                is_primary_key: cell_truthy(row, 2),
                auto_increment: cell_text(row, 3)
                    .map(|d| d.starts_with("nextval("))
                    .unwrap_or(false),
                default_value: cell_text(row, 3),
                ordinal_position: row.get(4).and_then(CellValue::as_i64).unwrap_or(0),
            })
        })
        .collect()
}

/// Declaration for the rebuilt `id` column, and whether its sequence needs
/// carrying over after the copy.
fn id_decl(dialect: Dialect, id: &ColumnDetails) -> (String, bool) {
    let ty = id.data_type.trim();

    match dialect {
        Dialect::Postgres if id.auto_increment => {
            let serial_type = match ty.to_lowercase().as_str() {
                "bigint" => "BIGSERIAL",
                "smallint" => "SMALLSERIAL",
                _ => "SERIAL",
            };
            (format!("{} PRIMARY KEY", serial_type), true)
        }
        Dialect::Sqlite if id.auto_increment => ("INTEGER PRIMARY KEY AUTOINCREMENT".to_string(), true),
        _ if ty.is_empty() => ("PRIMARY KEY".to_string(), false),
        _ => (format!("{} PRIMARY KEY", ty), false),
    }
}

/// Work out the rebuilt table's columns. Pure; no statements run.
pub fn plan_rearrange(dialect: Dialect, current: &[ColumnDetails], target: &[ColumnSpec]) -> RearrangePlan {
    let mut columns = Vec::with_capacity(current.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut carry_id_sequence = false;

    if let Some(id) = current.iter().find(|c| c.name == ID_COLUMN) {
        let (decl, carry) = id_decl(dialect, id);
        carry_id_sequence = carry;
        columns.push(PlannedColumn {
            name: id.name.clone(),
            decl,
            copy_expr: quote_ident(&id.name),
        });
        placed.insert(ID_COLUMN);
    }

    for spec in target {
        if placed.contains(spec.name.as_str()) {
            continue;
        }
        let Some(existing) = current.iter().find(|c| c.name == spec.name) else {
            continue;
        };
        let requested = dialect.translate_type(&spec.decl);
        let requested = requested.trim();
        let quoted = quote_ident(&existing.name);
        let (decl, copy_expr) = if requested.is_empty() || requested.eq_ignore_ascii_case(existing.data_type.trim()) {
            (existing.data_type.clone(), quoted)
        } else {
            (requested.to_string(), format!("CAST({} AS {})", quoted, requested))
        };
        columns.push(PlannedColumn {
            name: existing.name.clone(),
            decl,
            copy_expr,
        });
        placed.insert(existing.name.as_str());
    }

    for existing in current {
        if placed.contains(existing.name.as_str()) {
            continue;
        }
        columns.push(PlannedColumn {
            name: existing.name.clone(),
            decl: existing.data_type.clone(),
            copy_expr: quote_ident(&existing.name),
        });
        placed.insert(existing.name.as_str());
    }

    RearrangePlan {
        columns,
        carry_id_sequence,
    }
}

/// Prefix shared by every temporary table of `table`, kept short enough
/// that the full name fits in 63 bytes.
fn temp_prefix(table: &str) -> String {
    if table.len() <= TEMP_PREFIX_MAX {
        return format!("{}{}", table, TEMP_MARKER);
    }
    // FNV-1a, so distinct long names sharing a head do not share a prefix.
    let hash = table.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    });
    format!("{}{:08x}{}", &table[..TEMP_PREFIX_MAX - 8], hash as u32, TEMP_MARKER)
}

/// A fresh, collision-resistant temporary table name for `table`.
pub fn temp_table_name(table: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%6f");
    let salt: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{}{}_{:04}", temp_prefix(table), stamp, salt)
}

/// Whether `candidate` is a temporary table produced for `table`.
pub fn is_temp_table_of(table: &str, candidate: &str) -> bool {
    let Some(suffix) = candidate.strip_prefix(&temp_prefix(table)) else {
        return false;
    };
    let bytes = suffix.as_bytes();
    bytes.len() == TEMP_SUFFIX_LEN
        && bytes[..20].iter().all(u8::is_ascii_digit)
        && bytes[20] == b'_'
        && bytes[21..].iter().all(u8::is_ascii_digit)
}
