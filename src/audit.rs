use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub statement: String,
    pub result: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub backend: String,
    pub attempts: u32,
    pub execution_time_ms: u64,
    pub success: bool,
}

/// Bounded journal of executed statements and their results.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
    max_entries: usize,
}

/// Shared handle the executor records into.
pub type SharedAuditLog = Arc<Mutex<AuditLog>>;

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn shared(self) -> SharedAuditLog {
        Arc::new(Mutex::new(self))
    }

    /// Append one executed statement. Repeats are kept: each entry is a
    /// separate execution.
    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);

        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn failures(&self) -> Vec<&AuditEntry> {
        self.entries.iter().filter(|e| !e.success).collect()
    }

    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flexstore")
            .join("audit.json")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let log: AuditLog = serde_json::from_str(&content)?;
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(statement: &str, result: &str) -> AuditEntry {
        AuditEntry {
            statement: statement.to_string(),
            result: result.to_string(),
            timestamp: chrono::Utc::now(),
            backend: "sqlite".to_string(),
            attempts: 1,
            execution_time_ms: 1,
            success: true,
        }
    }

    #[test]
    fn test_repeated_statements_are_all_recorded() {
        let mut log = AuditLog::new();
        log.record(entry("INSERT INTO t (a) VALUES ('x')", "1"));
        log.record(entry("INSERT INTO t (a) VALUES ('x')", "1"));
        log.record(entry("SELECT 1", "1"));
        log.record(entry("SELECT 1", "1"));
        assert_eq!(log.entries().len(), 4);
    }

    #[test]
    fn test_oldest_entries_are_trimmed() {
        let mut log = AuditLog::with_capacity(3);
        for i in 0..5 {
            log.record(entry(&format!("SELECT {}", i), ""));
        }
        let statements: Vec<&str> = log.entries().iter().map(|e| e.statement.as_str()).collect();
        assert_eq!(statements, vec!["SELECT 2", "SELECT 3", "SELECT 4"]);
    }

    #[test]
    fn test_failures() {
        let mut log = AuditLog::new();
        log.record(entry("SELECT * FROM users", "1"));
        log.record(AuditEntry {
            success: false,
            ..entry("DELETE FROM orders", "")
        });
        let failed = log.failures();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].statement, "DELETE FROM orders");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("audit.json");
        let mut log = AuditLog::new();
        log.record(entry("SELECT 1", "1"));
        log.save(&path).unwrap();

        let loaded = AuditLog::load(&path).unwrap();
        assert_eq!(loaded.entries(), log.entries());
        assert!(AuditLog::load(&dir.path().join("missing.json")).unwrap().entries().is_empty());
    }
}
