//! Primary and secondary metric extraction.

use crate::excerpt::{tail_excerpt, DEFAULT_EXCERPT_CHARS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

mod patterns {
    use super::*;

    /// `CPU 0 cumulative IPC: 1.2345`
    pub static PER_CORE_CUMULATIVE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)CPU\s*\d+\s+cumulative\s+IPC:\s*([0-9]*\.?[0-9]+)")
            .expect("Invalid per-core IPC regex")
    });

    /// `Overall IPC: 1.23`
    pub static OVERALL_SUMMARY: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)Overall\s+IPC:\s*([0-9]*\.?[0-9]+)").expect("Invalid overall IPC regex")
    });

    /// Heartbeat and summary lines, including the `cummulative` spelling.
    pub static CUMULATIVE_ANY: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)cu?m{1,2}ulative\s+IPC:\s*([0-9]*\.?[0-9]+)")
            .expect("Invalid cumulative IPC regex")
    });

    pub static TOTAL_INSTRUCTIONS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)Total\s+Instructions:\s*([0-9]+)")
            .expect("Invalid total instructions regex")
    });

    pub static TOTAL_CYCLES: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)Total\s+Cycles:\s*([0-9]+)").expect("Invalid total cycles regex")
    });

    /// `LLC TOTAL     ACCESS:    1234  HIT:     567`
    pub static LLC_TOTAL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"LLC TOTAL\s+ACCESS:\s+(\d+)\s+HIT:\s+(\d+)").expect("Invalid LLC total regex")
    });
}

/// One way of recovering the primary metric from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryStrategy {
    /// First per-core cumulative rate line.
    PerCoreCumulative,
    /// First aggregate summary line.
    OverallSummary,
    /// Last cumulative line of any shape; later reports supersede heartbeats.
    CumulativeLastMatch,
    /// Instructions divided by cycles from the raw totals.
    DerivedFromTotals,
}

impl PrimaryStrategy {
    /// Priority order used by [`MetricExtractor::default`].
    pub const ORDER: [PrimaryStrategy; 4] = [
        PrimaryStrategy::PerCoreCumulative,
        PrimaryStrategy::OverallSummary,
        PrimaryStrategy::CumulativeLastMatch,
        PrimaryStrategy::DerivedFromTotals,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PrimaryStrategy::PerCoreCumulative => "per_core_cumulative",
            PrimaryStrategy::OverallSummary => "overall_summary",
            PrimaryStrategy::CumulativeLastMatch => "cumulative_last_match",
            PrimaryStrategy::DerivedFromTotals => "derived_from_totals",
        }
    }

    /// A definite value, or `None` when this strategy does not apply.
    pub fn extract(&self, text: &str) -> Option<f64> {
        match self {
            PrimaryStrategy::PerCoreCumulative => first_capture(&patterns::PER_CORE_CUMULATIVE, text),
            PrimaryStrategy::OverallSummary => first_capture(&patterns::OVERALL_SUMMARY, text),
            PrimaryStrategy::CumulativeLastMatch => patterns::CUMULATIVE_ANY
                .captures_iter(text)
                .filter_map(|cap| cap[1].parse::<f64>().ok())
                .last(),
            PrimaryStrategy::DerivedFromTotals => {
                let instructions = first_capture(&patterns::TOTAL_INSTRUCTIONS, text)?;
                let cycles = first_capture(&patterns::TOTAL_CYCLES, text)?;
                if cycles > 0.0 {
                    Some(instructions / cycles)
                } else {
                    None
                }
            }
        }
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|cap| cap[1].parse::<f64>().ok())
}

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("primary metric not found in {output_chars} chars of run output")]
    MetricNotFound {
        output_chars: usize,
        /// Tail of the output, bounded for logging.
        excerpt: String,
    },
}

/// A recovered primary value and the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: f64,
    pub strategy: PrimaryStrategy,
}

#[derive(Debug, Clone)]
pub struct MetricExtractor {
    strategies: Vec<PrimaryStrategy>,
    excerpt_chars: usize,
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self {
            strategies: PrimaryStrategy::ORDER.to_vec(),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl MetricExtractor {
    pub fn with_strategies(strategies: Vec<PrimaryStrategy>) -> Self {
        Self {
            strategies,
            ..Self::default()
        }
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    pub fn strategies(&self) -> &[PrimaryStrategy] {
        &self.strategies
    }

    pub fn extract_primary(&self, text: &str) -> Result<MetricReading, MetricError> {
        for strategy in &self.strategies {
            if let Some(value) = strategy.extract(text) {
                debug!(strategy = strategy.name(), value, "primary metric extracted");
                return Ok(MetricReading {
                    value,
                    strategy: *strategy,
                });
            }
        }

        let excerpt = tail_excerpt(text, self.excerpt_chars).to_string();
        warn!(
            output_chars = text.len(),
            excerpt = %excerpt,
            "primary metric not found in run output"
        );
        Err(MetricError::MetricNotFound {
            output_chars: text.len(),
            excerpt,
        })
    }

    /// Hit ratio from the last-level cache totals, when the run reports them.
    pub fn extract_secondary(&self, text: &str) -> Option<f64> {
        let cap = patterns::LLC_TOTAL.captures(text)?;
        let access: u64 = cap[1].parse().ok()?;
        let hit: u64 = cap[2].parse().ok()?;
        if access == 0 {
            return Some(0.0);
        }
        Some(hit as f64 / access as f64)
    }
}

pub fn extract_primary_metric(text: &str) -> Result<f64, MetricError> {
    MetricExtractor::default()
        .extract_primary(text)
        .map(|reading| reading.value)
}

pub fn extract_secondary_metric(text: &str) -> Option<f64> {
    MetricExtractor::default().extract_secondary(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_core_cumulative() {
        let out = "Warmup complete\nCPU 0 cumulative IPC: 1.2345 instructions: 10000000 cycles: 8100445\n";
        assert_eq!(extract_primary_metric(out).unwrap(), 1.2345);
    }

    #[test]
    fn test_overall_summary() {
        let reading = MetricExtractor::default()
            .extract_primary("Overall IPC: 0.87\n")
            .unwrap();
        assert_eq!(reading.value, 0.87);
        assert_eq!(reading.strategy, PrimaryStrategy::OverallSummary);
    }

    #[test]
    fn test_last_cumulative_wins() {
        let out = "Heartbeat CPU 0 instructions: 100 cycles: 100 heartbeat IPC: 0.9 cumulative IPC: 1.0\n\
                   Heartbeat CPU 0 instructions: 200 cycles: 100 heartbeat IPC: 3.0 cumulative IPC: 2.0\n";
        let reading = MetricExtractor::default().extract_primary(out).unwrap();
        assert_eq!(reading.value, 2.0);
        assert_eq!(reading.strategy, PrimaryStrategy::CumulativeLastMatch);
    }

    #[test]
    fn test_misspelled_cumulative() {
        let out = "Heartbeat CPU 0 cummulative IPC: 0.75\n";
        assert_eq!(extract_primary_metric(out).unwrap(), 0.75);
    }

    #[test]
    fn test_derived_from_totals() {
        let out = "Total Instructions: 1000\nTotal Cycles: 500\n";
        let reading = MetricExtractor::default().extract_primary(out).unwrap();
        assert_eq!(reading.value, 2.0);
        assert_eq!(reading.strategy, PrimaryStrategy::DerivedFromTotals);
    }

    #[test]
    fn test_zero_cycles_is_not_a_value() {
        let out = "Total Instructions: 1000\nTotal Cycles: 0\n";
        assert!(matches!(
            extract_primary_metric(out),
            Err(MetricError::MetricNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_metric_fails_with_bounded_excerpt() {
        let out = format!("{}tail-marker", "x".repeat(2000));
        let err = MetricExtractor::default()
            .with_excerpt_chars(20)
            .extract_primary(&out)
            .unwrap_err();
        let MetricError::MetricNotFound { output_chars, excerpt } = err;
        assert_eq!(output_chars, 2011);
        assert_eq!(excerpt.chars().count(), 20);
        assert!(excerpt.ends_with("tail-marker"));
    }

    #[test]
    fn test_priority_order_prefers_per_core() {
        let out = "Overall IPC: 0.5\nCPU 0 cumulative IPC: 1.5\n";
        assert_eq!(extract_primary_metric(out).unwrap(), 1.5);
    }

    #[test]
    fn test_restricted_strategy_list() {
        let extractor = MetricExtractor::with_strategies(vec![PrimaryStrategy::DerivedFromTotals]);
        assert!(extractor.extract_primary("CPU 0 cumulative IPC: 1.5").is_err());
    }

    #[test]
    fn test_secondary_hit_ratio() {
        let out = "LLC TOTAL     ACCESS:    2000  HIT:     500  MISS:    1500\n";
        assert_eq!(extract_secondary_metric(out), Some(0.25));
        assert_eq!(
            extract_secondary_metric("LLC TOTAL     ACCESS:    0  HIT:     0"),
            Some(0.0)
        );
        assert_eq!(extract_secondary_metric("CPU 0 cumulative IPC: 1.0"), None);
    }
}
