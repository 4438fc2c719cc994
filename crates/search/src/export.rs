//! CSV export of single-policy evaluations.

use anyhow::{Context, Result};
use csv::Writer;
use policyforge_harness::Observation;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const CSV_HEADER: [&str; 5] = ["workload", "policy", "cpp_file_path", "ipc", "cache_hit_rate"];

pub fn write_observations<W: Write>(
    writer: W,
    policy: &str,
    source: &Path,
    observations: &[Observation],
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for obs in observations {
        wtr.write_record([
            obs.benchmark_item.clone(),
            policy.to_string(),
            source.display().to_string(),
            obs.metric_value.to_string(),
            obs.secondary_metric.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_observations_csv(
    path: &Path,
    policy: &str,
    source: &Path,
    observations: &[Observation],
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_observations(file, policy, source, observations)
}
