//! Record types and the store capabilities.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Benchmark label under which the chosen candidate of an iteration is recorded.
pub const AGGREGATE_LABEL: &str = "all";

/// One appended experiment row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    /// Benchmark item name, or [`AGGREGATE_LABEL`].
    pub benchmark_label: String,
    pub candidate_name: String,
    pub description: String,
    pub benchmark_description: String,
    /// Where the candidate source lives.
    pub artifact_locator: String,
    /// Secondary signal, when the run reported one.
    pub metric_value: Option<f64>,
    pub score_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalCandidate {
    pub policy_name: String,
    pub score: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRow {
    pub name: String,
    pub description: String,
    pub trace_path: String,
}

/// Benchmark items known to the history service plus a combined description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkCatalogue {
    pub description: String,
    pub items: Vec<BenchmarkRow>,
}

impl BenchmarkCatalogue {
    pub fn from_rows(items: Vec<BenchmarkRow>) -> Self {
        let description = items
            .iter()
            .map(|row| format!("- {}: {}", row.name, row.description.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        Self { description, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Append-only sink for experiment rows.
pub trait ExperimentStore: Send + Sync {
    fn record(&self, record: &ExperimentRecord) -> Result<(), StoreError>;
}

/// Read side consulted before the search starts.
pub trait HistoryService: Send + Sync {
    /// Best rows for `workload_filter`, highest score first.
    fn top_candidates(
        &self,
        workload_filter: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalCandidate>, StoreError>;

    fn benchmarks_with_descriptions(&self) -> Result<BenchmarkCatalogue, StoreError>;
}
