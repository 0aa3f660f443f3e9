//! Append-only audit trail. One entry per observable event; entries are
//! immutable once written and ordered by a strictly increasing per-run
//! sequence number. This is the only channel through which evidence (such as
//! a `screenshot_url`) is surfaced to callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use runflow_core_types::{LogLevel, RunId};

/// One immutable audit entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing within a run, never reused.
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Structured event payload; may embed an artifact URL.
    pub payload: serde_json::Value,
}

/// Append and read-all; nothing else. No mutation, no deletion.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(
        &self,
        run: &RunId,
        level: LogLevel,
        message: &str,
        payload: serde_json::Value,
    ) -> LogEntry;

    /// All entries for a run in append order. Unknown runs read as empty.
    async fn read_all(&self, run: &RunId) -> Vec<LogEntry>;
}

#[derive(Default)]
struct RunBuffer {
    next_seq: u64,
    entries: Vec<LogEntry>,
}

/// In-memory audit log. Appends across different runs only contend on the
/// map shard; ordering is guaranteed within a run, not across runs.
#[derive(Default)]
pub struct MemoryAuditLog {
    runs: DashMap<RunId, Mutex<RunBuffer>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(
        &self,
        run: &RunId,
        level: LogLevel,
        message: &str,
        payload: serde_json::Value,
    ) -> LogEntry {
        let buffer = self
            .runs
            .entry(run.clone())
            .or_insert_with(|| Mutex::new(RunBuffer::default()));
        let mut guard = buffer.lock();
        guard.next_seq += 1;
        let entry = LogEntry {
            seq: guard.next_seq,
            ts: Utc::now(),
            level,
            message: message.to_string(),
            payload,
        };
        guard.entries.push(entry.clone());
        entry
    }

    async fn read_all(&self, run: &RunId) -> Vec<LogEntry> {
        self.runs
            .get(run)
            .map(|buffer| buffer.lock().entries.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn sequences_start_at_one_and_increase() {
        let log = MemoryAuditLog::new();
        let run = RunId::new();
        let a = log.append(&run, LogLevel::Info, "run created", json!({})).await;
        let b = log.append(&run, LogLevel::Info, "step executed", json!({})).await;
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
    }

    #[tokio::test]
    async fn runs_do_not_share_sequences() {
        let log = MemoryAuditLog::new();
        let one = RunId::new();
        let two = RunId::new();
        log.append(&one, LogLevel::Info, "a", json!({})).await;
        let e = log.append(&two, LogLevel::Info, "b", json!({})).await;
        assert_eq!(e.seq, 1);
    }

    #[tokio::test]
    async fn unknown_run_reads_empty() {
        let log = MemoryAuditLog::new();
        assert!(log.read_all(&RunId::new()).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_keep_per_run_order() {
        let log = Arc::new(MemoryAuditLog::new());
        let run = RunId::new();
        let mut handles = Vec::new();
        for task in 0..8 {
            let log = Arc::clone(&log);
            let run = run.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    log.append(&run, LogLevel::Info, "tick", json!({"task": task, "i": i}))
                        .await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let entries = log.read_all(&run).await;
        assert_eq!(entries.len(), 400);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.seq, i as u64 + 1, "sequence gap or reorder at {i}");
        }
    }

    #[tokio::test]
    async fn reads_during_writes_see_a_consistent_prefix() {
        let log = Arc::new(MemoryAuditLog::new());
        let run = RunId::new();
        let writer = {
            let log = Arc::clone(&log);
            let run = run.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    log.append(&run, LogLevel::Info, "tick", json!({})).await;
                }
            })
        };
        let mut readers = Vec::new();
        for _ in 0..50 {
            let log = Arc::clone(&log);
            let run = run.clone();
            readers.push(tokio::spawn(async move {
                let entries = log.read_all(&run).await;
                for (i, entry) in entries.iter().enumerate() {
                    assert_eq!(entry.seq, i as u64 + 1);
                }
            }));
        }
        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
