use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::backend::Backend;
use super::error::{StoreError, StoreResult};
use super::query::{Dialect, QueryOutcome, QueryResult, Statement};
use super::retry::RetryPolicy;
use crate::audit::{AuditEntry, SharedAuditLog};

/// Dispatches statements to a backend with bounded retry on lock contention.
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    audit: Option<SharedAuditLog>,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn Backend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            audit: None,
        }
    }

    /// Record every statement and its result text into `log`.
    pub fn with_audit(mut self, log: SharedAuditLog) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn audit_log(&self) -> Option<&SharedAuditLog> {
        self.audit.as_ref()
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    /// Run one statement.
    ///
    /// Only lock contention on the embedded engine is retried; every other
    /// error ends the loop immediately.
    pub async fn execute(&self, statement: &Statement) -> StoreResult<QueryOutcome> {
        let dialect = self.dialect();
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result = self
            .retry
            .run(
                |attempt| {
                    attempts.store(attempt + 1, Ordering::Relaxed);
                    debug!(attempt = attempt + 1, backend = dialect.name(), sql = %statement.sql, "executing");
                    self.backend.run(statement)
                },
                |err: &StoreError| dialect == Dialect::Sqlite && err.is_transient(),
            )
            .await;

        if self.audit.is_some() {
            self.record(statement, &result, attempts.load(Ordering::Relaxed), start);
        }
        result
    }

    /// Run a statement that must produce rows.
    pub async fn query(&self, statement: &Statement) -> StoreResult<QueryResult> {
        Ok(self.execute(statement).await?.into_rows())
    }

    /// Run a statement and return its raw result string.
    pub async fn execute_raw(&self, statement: &Statement) -> StoreResult<String> {
        Ok(self.execute(statement).await?.to_raw_string())
    }

    /// Like [`QueryExecutor::execute_raw`], but failures are logged and
    /// come back as an empty string.
    pub async fn execute_lenient(&self, statement: &Statement) -> String {
        match self.execute_raw(statement).await {
            Ok(text) => text,
            Err(err) => {
                warn!(sql = %statement.sql, error = %err, "statement failed");
                String::new()
            }
        }
    }

    fn record(&self, statement: &Statement, result: &StoreResult<QueryOutcome>, attempts: u32, start: Instant) {
        let dialect = self.dialect();
        let text = statement.inline(dialect);
        let (result_text, success) = match result {
            Ok(outcome) => (outcome.to_raw_string(), true),
            Err(err) => (err.to_string(), false),
        };
        info!(
            target: "flexstore::audit",
            backend = dialect.name(),
            attempts,
            success,
            statement = %text,
            result = %result_text,
            "statement executed"
        );
        let entry = AuditEntry {
            statement: text,
            result: result_text,
            timestamp: chrono::Utc::now(),
            backend: dialect.name().to_string(),
            attempts,
            execution_time_ms: start.elapsed().as_millis() as u64,
            success,
        };
        if let Some(log) = &self.audit {
            match log.lock() {
                Ok(mut log) => log.record(entry),
                Err(poisoned) => poisoned.into_inner().record(entry),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::db::error::StructuredError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that replays a fixed script of outcomes and counts calls.
    pub(crate) struct ScriptedBackend {
        pub dialect: Dialect,
        pub script: Mutex<Vec<StoreResult<QueryOutcome>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedBackend {
        pub fn new(dialect: Dialect, script: Vec<StoreResult<QueryOutcome>>) -> Self {
            Self {
                dialect,
                script: Mutex::new(script.into_iter().rev().collect()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn run(&self, _statement: &Statement) -> StoreResult<QueryOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(QueryOutcome::Rows(QueryResult::empty())))
        }
    }

    fn locked() -> StoreResult<QueryOutcome> {
        Err(StoreError::TransientLock(StructuredError::from_string(
            "database is locked".into(),
        )))
    }

    fn affected(count: u64) -> StoreResult<QueryOutcome> {
        Ok(QueryOutcome::Affected {
            count,
            execution_time: std::time::Duration::ZERO,
        })
    }

    fn executor(backend: Arc<ScriptedBackend>) -> QueryExecutor {
        QueryExecutor::new(backend, RetryPolicy::immediate(10))
    }

    #[tokio::test]
    async fn test_nine_locks_then_success_takes_ten_attempts() {
        let mut script: Vec<_> = (0..9).map(|_| locked()).collect();
        script.push(affected(1));
        let backend = Arc::new(ScriptedBackend::new(Dialect::Sqlite, script));

        let outcome = executor(backend.clone())
            .execute(&Statement::raw("UPDATE t SET a = 1"))
            .await
            .unwrap();
        assert_eq!(outcome.to_raw_string(), "1");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_ten_locks_exhaust_the_budget() {
        let mut script: Vec<_> = (0..10).map(|_| locked()).collect();
        script.push(affected(1));
        let backend = Arc::new(ScriptedBackend::new(Dialect::Sqlite, script));

        let err = executor(backend.clone())
            .execute(&Statement::raw("UPDATE t SET a = 1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_server_engine_never_retries() {
        let backend = Arc::new(ScriptedBackend::new(Dialect::Postgres, vec![locked(), affected(1)]));
        let result = executor(backend.clone())
            .execute(&Statement::raw("UPDATE t SET a = 1"))
            .await;
        assert!(result.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_not_retried() {
        let fatal = Err(StoreError::Backend(StructuredError::from_string("syntax".into())));
        let backend = Arc::new(ScriptedBackend::new(Dialect::Sqlite, vec![fatal, affected(1)]));
        let result = executor(backend.clone())
            .execute(&Statement::raw("UPDAT t"))
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lenient_swallows_errors() {
        let fatal = Err(StoreError::Backend(StructuredError::from_string("nope".into())));
        let backend = Arc::new(ScriptedBackend::new(Dialect::Sqlite, vec![fatal]));
        let text = executor(backend).execute_lenient(&Statement::raw("SELECT 1")).await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_audit_records_statement_and_result() {
        let backend = Arc::new(ScriptedBackend::new(Dialect::Sqlite, vec![locked(), affected(2)]));
        let log = AuditLog::new().shared();
        let exec = executor(backend).with_audit(log.clone());

        let stmt = Statement {
            sql: "DELETE FROM t WHERE name = ?1".into(),
            params: vec!["x".into()],
        };
        exec.execute(&stmt).await.unwrap();

        let log = log.lock().unwrap();
        let entry = &log.entries()[0];
        assert_eq!(entry.statement, "DELETE FROM t WHERE name = 'x'");
        assert_eq!(entry.result, "2");
        assert_eq!(entry.attempts, 2);
        assert!(entry.success);
    }
}
