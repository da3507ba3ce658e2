use rusqlite::{params, Connection, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::counters::CounterSource;
use crate::verdict::Verdict;

/// One stored row: the cumulative totals of a verdict slot at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRow {
    pub timestamp: i64,
    pub verdict: String,
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // In-memory databases report "memory" here instead of switching.
        let _: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS verdict_snapshots (
                id INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                verdict TEXT NOT NULL,
                packets INTEGER NOT NULL,
                bytes INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshot_timestamp ON verdict_snapshots(timestamp)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the current totals of every verdict slot in one transaction.
    /// Returns the number of rows written.
    pub fn record_snapshot(&self, source: &dyn CounterSource) -> Result<usize> {
        self.record_snapshot_at(source, chrono::Utc::now().timestamp_millis())
    }

    pub fn record_snapshot_at(&self, source: &dyn CounterSource, timestamp: i64) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO verdict_snapshots (timestamp, verdict, packets, bytes)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for verdict in Verdict::ALL {
                let Ok(totals) = source.snapshot(verdict.code()) else {
                    continue;
                };
                stmt.execute(params![
                    timestamp,
                    verdict.name(),
                    totals.packets as i64,
                    totals.bytes as i64
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Most recent rows first.
    pub fn query_history(&self, limit: usize) -> Result<Vec<SnapshotRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, verdict, packets, bytes
             FROM verdict_snapshots ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(SnapshotRow {
                timestamp: row.get(0)?,
                verdict: row.get(1)?,
                packets: row.get::<_, i64>(2)? as u64,
                bytes: row.get::<_, i64>(3)? as u64,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn delete_old_data(&self, older_than_seconds: u64) -> Result<usize> {
        let cutoff_ms =
            chrono::Utc::now().timestamp_millis() - (older_than_seconds as i64 * 1000);
        self.delete_before(cutoff_ms)
    }

    fn delete_before(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.lock();
        let deleted = conn.execute(
            "DELETE FROM verdict_snapshots WHERE timestamp < ?1",
            params![cutoff_ms],
        )?;
        Ok(deleted)
    }
}
