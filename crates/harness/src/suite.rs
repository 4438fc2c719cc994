//! Benchmark suite definition and subset selection.

use crate::error::ConfigError;
use policyforge_store::BenchmarkCatalogue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkItem {
    pub name: String,
    pub trace: PathBuf,
    pub description: String,
}

impl BenchmarkItem {
    pub fn new(
        name: impl Into<String>,
        trace: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            trace: trace.into(),
            description: description.into(),
        }
    }
}

/// Ordered, fixed set of benchmark items for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    items: Vec<BenchmarkItem>,
}

impl BenchmarkSuite {
    pub fn new(items: Vec<BenchmarkItem>) -> Self {
        Self { items }
    }

    /// The five SPEC CPU2006 traces shipped with the simulator kit.
    pub fn default_five() -> Self {
        Self::new(vec![
            BenchmarkItem::new(
                "astar",
                "ChampSim_CRC2/traces/astar_313B.trace.gz",
                "path finding over large irregular graphs; mixed reuse",
            ),
            BenchmarkItem::new(
                "lbm",
                "ChampSim_CRC2/traces/lbm_564B.trace.gz",
                "lattice Boltzmann fluid solver; streaming with little reuse",
            ),
            BenchmarkItem::new(
                "mcf",
                "ChampSim_CRC2/traces/mcf_250B.trace.gz",
                "network simplex; pointer chasing over a large working set",
            ),
            BenchmarkItem::new(
                "milc",
                "ChampSim_CRC2/traces/milc_409B.trace.gz",
                "lattice QCD; strided sweeps with periodic reuse",
            ),
            BenchmarkItem::new(
                "omnetpp",
                "ChampSim_CRC2/traces/omnetpp_17B.trace.gz",
                "discrete event simulation; irregular heap accesses",
            ),
        ])
    }

    /// Suite built from the history service, or `None` when it knows no items.
    pub fn from_catalogue(catalogue: &BenchmarkCatalogue) -> Option<Self> {
        if catalogue.is_empty() {
            return None;
        }
        Some(Self::new(
            catalogue
                .items
                .iter()
                .map(|row| BenchmarkItem::new(&row.name, &row.trace_path, &row.description))
                .collect(),
        ))
    }

    /// Restrict to `names` (case-insensitive), keeping suite order.
    ///
    /// An empty selection keeps every item. Any name the suite does not
    /// contain is an error; nothing is silently dropped.
    pub fn select(&self, names: &[String]) -> Result<Self, ConfigError> {
        let wanted: BTreeSet<String> = names
            .iter()
            .map(|n| n.trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(self.clone());
        }

        let known: BTreeSet<String> = self
            .items
            .iter()
            .map(|item| item.name.to_ascii_lowercase())
            .collect();
        let unknown: Vec<String> = wanted.difference(&known).cloned().collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownBenchmarks { names: unknown });
        }

        Ok(Self::new(
            self.items
                .iter()
                .filter(|item| wanted.contains(&item.name.to_ascii_lowercase()))
                .cloned()
                .collect(),
        ))
    }

    pub fn items(&self) -> &[BenchmarkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name.as_str()).collect()
    }

    /// One `- name: description` line per item, used in prompts.
    pub fn description(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("- {}: {}", item.name, item.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
