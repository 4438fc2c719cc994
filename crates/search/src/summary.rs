//! Serializable account of a search run.

use crate::prompt::PromptKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotStatus {
    Scored,
    GenerationFailed { error: String },
    ParseFailed,
    BuildFailed { error: String },
    EvaluationFailed { error: String },
    NoObservations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub slot: usize,
    pub candidate_id: Option<String>,
    pub observations: usize,
    pub score: Option<f64>,
    pub status: SlotStatus,
}

impl SlotOutcome {
    pub fn failed(slot: usize, candidate_id: Option<String>, status: SlotStatus) -> Self {
        Self {
            slot,
            candidate_id,
            observations: 0,
            score: None,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenSummary {
    pub candidate_id: String,
    pub name: String,
    pub slot: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: usize,
    pub prompt_kind: PromptKind,
    pub slots: Vec<SlotOutcome>,
    pub chosen: Option<ChosenSummary>,
    pub best_before: f64,
    pub best_after: f64,
    pub early_exit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub initial_best: f64,
    pub best_score: f64,
    pub iterations_run: usize,
    pub early_exit: bool,
    pub iterations: Vec<IterationReport>,
}

impl RunSummary {
    pub fn improved(&self) -> bool {
        self.best_score > self.initial_best
    }

    /// Highest-scoring chosen candidate of the run; earliest wins ties.
    pub fn best_chosen(&self) -> Option<&ChosenSummary> {
        self.iterations
            .iter()
            .filter_map(|report| report.chosen.as_ref())
            .fold(None, |best: Option<&ChosenSummary>, chosen| match best {
                Some(current) if current.score >= chosen.score => Some(current),
                _ => Some(chosen),
            })
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(iteration: usize, chosen: Option<f64>) -> IterationReport {
        IterationReport {
            iteration,
            prompt_kind: PromptKind::Explore,
            slots: vec![SlotOutcome::failed(0, None, SlotStatus::ParseFailed)],
            chosen: chosen.map(|score| ChosenSummary {
                candidate_id: format!("{iteration:03}_00_p"),
                name: "p".into(),
                slot: 0,
                score,
            }),
            best_before: 0.0,
            best_after: 0.0,
            early_exit: false,
        }
    }

    #[test]
    fn test_best_chosen_prefers_earliest_on_tie() {
        let summary = RunSummary {
            initial_best: 0.0,
            best_score: 1.5,
            iterations_run: 3,
            early_exit: false,
            iterations: vec![report(0, Some(1.5)), report(1, None), report(2, Some(1.5))],
        };
        assert_eq!(summary.best_chosen().unwrap().candidate_id, "000_00_p");
        assert!(summary.improved());
    }

    #[test]
    fn test_summary_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs/summary.json");
        let summary = RunSummary {
            initial_best: 1.0,
            best_score: 1.0,
            iterations_run: 1,
            early_exit: false,
            iterations: vec![report(0, None)],
        };
        summary.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"kind\": \"parse_failed\""));
        let loaded: RunSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, summary);
        assert!(loaded.best_chosen().is_none());
    }
}
