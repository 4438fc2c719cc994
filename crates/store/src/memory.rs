//! In-process store, used when no database is wanted.

use crate::error::StoreError;
use crate::record::{
    BenchmarkCatalogue, BenchmarkRow, ExperimentRecord, ExperimentStore, HistoricalCandidate,
    HistoryService,
};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ExperimentRecord>>,
    benchmarks: Vec<BenchmarkRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_benchmarks(benchmarks: Vec<BenchmarkRow>) -> Self {
        Self {
            records: Mutex::default(),
            benchmarks,
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<ExperimentRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of everything recorded so far, in append order.
    pub fn records(&self) -> Vec<ExperimentRecord> {
        self.guard().clone()
    }

    pub fn records_for(&self, label: &str) -> Vec<ExperimentRecord> {
        self.guard()
            .iter()
            .filter(|r| r.benchmark_label == label)
            .cloned()
            .collect()
    }
}

impl ExperimentStore for MemoryStore {
    fn record(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        self.guard().push(record.clone());
        Ok(())
    }
}

impl HistoryService for MemoryStore {
    fn top_candidates(
        &self,
        workload_filter: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalCandidate>, StoreError> {
        let mut matching: Vec<_> = self
            .guard()
            .iter()
            .filter(|r| r.benchmark_label == workload_filter)
            .map(|r| HistoricalCandidate {
                policy_name: r.candidate_name.clone(),
                score: r.score_value,
                description: r.description.clone(),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        matching.sort_by(|a, b| b.score.total_cmp(&a.score));
        matching.truncate(limit);
        Ok(matching)
    }

    fn benchmarks_with_descriptions(&self) -> Result<BenchmarkCatalogue, StoreError> {
        Ok(BenchmarkCatalogue::from_rows(self.benchmarks.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_candidates_matches_sqlite_ordering() {
        let store = MemoryStore::new();
        for (name, score) in [("a", 1.0), ("b", 2.0), ("c", 1.0)] {
            store
                .record(&ExperimentRecord {
                    benchmark_label: "all".into(),
                    candidate_name: name.into(),
                    description: String::new(),
                    benchmark_description: String::new(),
                    artifact_locator: String::new(),
                    metric_value: None,
                    score_value: score,
                })
                .unwrap();
        }
        let top = store.top_candidates("all", 5).unwrap();
        let names: Vec<_> = top.iter().map(|c| c.policy_name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert_eq!(store.records_for("all").len(), 3);
        assert!(store.records_for("mcf").is_empty());
    }
}
