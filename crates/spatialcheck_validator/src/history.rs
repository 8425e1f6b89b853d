//! Run-history stores.

use spatialcheck_core::{HistoryError, RunHistoryStore, RunStatistics};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// History kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRunHistory {
    records: Mutex<Vec<RunStatistics>>,
}

impl InMemoryRunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunHistoryStore for InMemoryRunHistory {
    fn append(&self, record: &RunStatistics) -> Result<(), HistoryError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<RunStatistics>, HistoryError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// History stored as one JSON object per line in an append-only file.
#[derive(Debug)]
pub struct JsonlRunHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunHistory {
    /// Uses the file at `path`, created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunHistoryStore for JsonlRunHistory {
    fn append(&self, record: &RunStatistics) -> Result<(), HistoryError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<RunStatistics>, HistoryError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                // tolerate a torn trailing write
                Err(e) => warn!(path = %self.path.display(), line = no + 1, error = %e, "skipping unreadable history record"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(target: &str, total: f64) -> RunStatistics {
        RunStatistics {
            timestamp: Utc::now(),
            target_id: target.to_string(),
            table_count: 3,
            feature_count: 120,
            schema_field_count: 9,
            geometry_check_count: 2,
            relation_rule_count: 1,
            attribute_column_count: 4,
            per_stage_seconds: [0.1, 0.2, 0.3, 0.4, 0.5, total - 1.5],
            total_seconds: total,
        }
    }

    #[test]
    fn test_in_memory_history() {
        let store = InMemoryRunHistory::new();
        assert!(store.is_empty());
        store.append(&record("a", 2.0)).unwrap();
        store.append(&record("b", 3.0)).unwrap();
        assert_eq!(store.len(), 2);
        let recent = store.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].target_id, "b");
    }

    #[test]
    fn test_jsonl_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRunHistory::new(dir.path().join("history.jsonl"));
        assert!(store.records().unwrap().is_empty());

        let first = record("a.gdb", 2.0);
        let second = record("b.gdb", 4.0);
        store.append(&first).unwrap();
        store.append(&second).unwrap();

        let reopened = JsonlRunHistory::new(store.path());
        assert_eq!(reopened.records().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_jsonl_skips_torn_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = JsonlRunHistory::new(&path);
        store.append(&record("a.gdb", 2.0)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"timestamp\":").unwrap();

        assert_eq!(store.records().unwrap().len(), 1);
    }
}
