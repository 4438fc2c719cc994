//! SQLite-backed store.

use crate::error::StoreError;
use crate::record::{
    BenchmarkCatalogue, BenchmarkRow, ExperimentRecord, ExperimentStore, HistoricalCandidate,
    HistoryService,
};
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS experiments (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    workload             TEXT NOT NULL,
    policy               TEXT NOT NULL,
    policy_description   TEXT NOT NULL,
    workload_description TEXT NOT NULL,
    cpp_file_path        TEXT NOT NULL,
    cache_hit_rate       REAL,
    score                REAL NOT NULL,
    recorded_at          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS experiments_workload_score
    ON experiments (workload, score DESC);
CREATE TABLE IF NOT EXISTS workloads (
    name        TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    trace_path  TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "experiment store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA busy_timeout=5000;")
            .map_err(StoreError::query("set pragmas"))?;
        conn.execute_batch(SCHEMA)
            .map_err(StoreError::query("create schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Statements are single calls; a poisoned guard still holds a usable connection.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace one benchmark in the catalogue.
    pub fn register_benchmark(&self, row: &BenchmarkRow) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO workloads (name, description, trace_path)
                 VALUES (?1, ?2, ?3)",
                params![row.name, row.description, row.trace_path],
            )
            .map_err(StoreError::query("register benchmark"))?;
        Ok(())
    }

    /// Every row recorded under `label`, oldest first.
    pub fn records_for(&self, label: &str) -> Result<Vec<ExperimentRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT workload, policy, policy_description, workload_description,
                        cpp_file_path, cache_hit_rate, score
                 FROM experiments WHERE workload = ?1 ORDER BY id",
            )
            .map_err(StoreError::query("prepare records query"))?;
        let rows = stmt
            .query_map(params![label], |row| {
                Ok(ExperimentRecord {
                    benchmark_label: row.get(0)?,
                    candidate_name: row.get(1)?,
                    description: row.get(2)?,
                    benchmark_description: row.get(3)?,
                    artifact_locator: row.get(4)?,
                    metric_value: row.get(5)?,
                    score_value: row.get(6)?,
                })
            })
            .map_err(StoreError::query("query records"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query("read records"))
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM experiments", [], |row| row.get(0))
            .map_err(StoreError::query("count records"))?;
        Ok(count as usize)
    }
}

impl ExperimentStore for SqliteStore {
    fn record(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.lock()
            .execute(
                "INSERT INTO experiments (
                    workload, policy, policy_description, workload_description,
                    cpp_file_path, cache_hit_rate, score, recorded_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.benchmark_label,
                    record.candidate_name,
                    record.description,
                    record.benchmark_description,
                    record.artifact_locator,
                    record.metric_value,
                    record.score_value,
                    recorded_at,
                ],
            )
            .map_err(StoreError::query("insert experiment"))?;
        debug!(
            workload = %record.benchmark_label,
            policy = %record.candidate_name,
            score = record.score_value,
            "experiment recorded"
        );
        Ok(())
    }
}

impl HistoryService for SqliteStore {
    fn top_candidates(
        &self,
        workload_filter: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalCandidate>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT policy, score, policy_description
                 FROM experiments WHERE workload = ?1
                 ORDER BY score DESC, id ASC LIMIT ?2",
            )
            .map_err(StoreError::query("prepare top candidates"))?;
        let rows = stmt
            .query_map(params![workload_filter, limit as i64], |row| {
                Ok(HistoricalCandidate {
                    policy_name: row.get(0)?,
                    score: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .map_err(StoreError::query("query top candidates"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query("read top candidates"))
    }

    fn benchmarks_with_descriptions(&self) -> Result<BenchmarkCatalogue, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT name, description, trace_path FROM workloads ORDER BY name")
            .map_err(StoreError::query("prepare workloads"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BenchmarkRow {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    trace_path: row.get(2)?,
                })
            })
            .map_err(StoreError::query("query workloads"))?;
        let items = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query("read workloads"))?;
        Ok(BenchmarkCatalogue::from_rows(items))
    }
}
