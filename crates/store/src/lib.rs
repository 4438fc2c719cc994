//! Experiment persistence and retrieval.
//!
//! Two narrow capabilities are exposed: an append-only [`ExperimentStore`]
//! that receives one row per observation (and one per chosen candidate), and
//! a read-only [`HistoryService`] consulted once at start-up to seed the
//! search with prior results and the benchmark catalogue.

pub mod error;
pub mod memory;
pub mod record;
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{
    BenchmarkCatalogue, BenchmarkRow, ExperimentRecord, ExperimentStore, HistoricalCandidate,
    HistoryService, AGGREGATE_LABEL,
};
pub use sqlite::SqliteStore;
