//! Performance signals recovered from simulator output.
//!
//! The primary metric (instructions per cycle) is found by trying a fixed
//! list of [`PrimaryStrategy`] patterns in priority order. Nothing here ever
//! invents a value: when no strategy matches, extraction fails with
//! [`MetricError::MetricNotFound`] carrying the tail of the output.

pub mod excerpt;
pub mod extractor;

pub use excerpt::tail_excerpt;
pub use extractor::{
    extract_primary_metric, extract_secondary_metric, MetricError, MetricExtractor,
    MetricReading, PrimaryStrategy,
};
