use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_postgres::types::ToSql;
use tracing::debug;

use super::connection::{create_client, BackendConfig, ServerConfig};
use super::error::{StoreError, StoreResult};
use super::query::{parse_pg_rows, CellValue, ColumnInfo, Dialect, QueryOutcome, QueryResult, Statement};

/// A relational engine that can run one statement per call.
///
/// Implementations open their own connection for each call and release it
/// before returning, whatever the outcome.
#[async_trait]
pub trait Backend: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn run(&self, statement: &Statement) -> StoreResult<QueryOutcome>;
}

pub fn open_backend(config: &BackendConfig) -> Arc<dyn Backend> {
    match config {
        BackendConfig::Server(server) => Arc::new(PostgresBackend::new(server.clone())),
        BackendConfig::Embedded {
            path,
            busy_timeout_ms,
        } => Arc::new(
            SqliteBackend::new(path.clone())
                .with_busy_timeout(Duration::from_millis(*busy_timeout_ms)),
        ),
    }
}

pub struct PostgresBackend {
    config: ServerConfig,
}

impl PostgresBackend {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn run(&self, statement: &Statement) -> StoreResult<QueryOutcome> {
        let client = create_client(&self.config).await?;
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        let start = Instant::now();
        let outcome = if statement.is_read() {
            let rows = client.query(statement.sql.as_str(), &params).await?;
            QueryOutcome::Rows(parse_pg_rows(&rows, start.elapsed()))
        } else {
            let count = client.execute(statement.sql.as_str(), &params).await?;
            QueryOutcome::Affected {
                count,
                execution_time: start.elapsed(),
            }
        };
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "postgres statement done");
        Ok(outcome)
    }
}

pub struct SqliteBackend {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::ZERO,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn run(&self, statement: &Statement) -> StoreResult<QueryOutcome> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let statement = statement.clone();
        tokio::task::spawn_blocking(move || run_sqlite(&path, busy_timeout, &statement))
            .await
            .map_err(|e| StoreError::Connection(format!("sqlite worker failed: {}", e)))?
    }
}

fn run_sqlite(path: &Path, busy_timeout: Duration, statement: &Statement) -> StoreResult<QueryOutcome> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;

    let start = Instant::now();
    if !statement.is_read() {
        let count = conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        return Ok(QueryOutcome::Affected {
            count: count as u64,
            execution_time: start.elapsed(),
        });
    }

    let mut prepared = conn.prepare(&statement.sql)?;
    let columns: Vec<ColumnInfo> = prepared
        .column_names()
        .into_iter()
        .map(|name| ColumnInfo {
            name: name.to_string(),
            type_name: String::new(),
            max_width: unicode_width::UnicodeWidthStr::width(name),
        })
        .collect();
    let width = columns.len();

    let mut rows = prepared.query(params_from_iter(statement.params.iter()))?;
    let mut result_rows = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(CellValue::from_sqlite(row.get_ref(i)?));
        }
        result_rows.push(values);
    }

    Ok(QueryOutcome::Rows(QueryResult::from_rows(
        columns,
        result_rows,
        start.elapsed(),
    )))
}
