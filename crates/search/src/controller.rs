//! The generate, build, evaluate, select loop.

use crate::error::SearchError;
use crate::generator::{Generator, SamplingConfig};
use crate::prompt::{PromptContext, PromptFocus};
use crate::state::{early_exit, IterationState};
use crate::summary::{ChosenSummary, IterationReport, RunSummary, SlotOutcome, SlotStatus};
use policyforge_harness::{
    aggregate_score, BenchmarkSuite, Candidate, CandidateBuilder, ConfigError, EvaluationHarness,
    Observation,
};
use policyforge_store::{
    ExperimentRecord, ExperimentStore, HistoricalCandidate, HistoryService, AGGREGATE_LABEL,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub iterations: usize,
    pub candidates_per_iteration: usize,
    pub sampling: SamplingConfig,
    pub early_exit_ratio: f64,
    /// Benchmark names to run; empty means the whole suite.
    pub workloads: Vec<String>,
    /// Label whose history seeds the first prompt.
    pub history_workload: String,
    pub top_n: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            candidates_per_iteration: 3,
            sampling: SamplingConfig::new("gpt-4.1", 0.2),
            early_exit_ratio: 1.3,
            workloads: Vec::new(),
            history_workload: AGGREGATE_LABEL.to_string(),
            top_n: 5,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &str, reason: &str| ConfigError::InvalidSetting {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.iterations == 0 {
            return Err(invalid("iterations", "must be at least 1"));
        }
        if self.candidates_per_iteration == 0 {
            return Err(invalid("candidates", "must be at least 1"));
        }
        if !(self.early_exit_ratio.is_finite() && self.early_exit_ratio > 0.0) {
            return Err(invalid("early-exit-ratio", "must be a positive number"));
        }
        if self.sampling.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        Ok(())
    }
}

/// Everything loaded once before the first iteration.
#[derive(Debug, Clone)]
pub struct SearchSetup {
    pub suite: BenchmarkSuite,
    pub history: Vec<HistoricalCandidate>,
    pub initial_best: f64,
}

struct Survivor {
    candidate: Candidate,
    source: String,
    score: f64,
    observations: Vec<Observation>,
}

pub struct SearchController {
    generator: Arc<dyn Generator>,
    builder: CandidateBuilder,
    harness: EvaluationHarness,
    store: Arc<dyn ExperimentStore>,
    history: Arc<dyn HistoryService>,
    config: SearchConfig,
}

impl SearchController {
    pub fn new(
        generator: Arc<dyn Generator>,
        builder: CandidateBuilder,
        harness: EvaluationHarness,
        store: Arc<dyn ExperimentStore>,
        history: Arc<dyn HistoryService>,
        config: SearchConfig,
    ) -> Self {
        Self {
            generator,
            builder,
            harness,
            store,
            history,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Load prior results and fix the benchmark suite for this run.
    pub fn initialize(&self) -> Result<SearchSetup, SearchError> {
        self.config.validate()?;

        let catalogue = self.history.benchmarks_with_descriptions()?;
        let suite = BenchmarkSuite::from_catalogue(&catalogue)
            .unwrap_or_else(BenchmarkSuite::default_five)
            .select(&self.config.workloads)?;
        if suite.is_empty() {
            return Err(ConfigError::EmptySuite.into());
        }

        let history = self
            .history
            .top_candidates(&self.config.history_workload, self.config.top_n)?;
        let initial_best = history.first().map(|c| c.score).unwrap_or(0.0);

        info!(
            benchmarks = %suite.names().join(","),
            history = history.len(),
            initial_best,
            "search initialized"
        );
        Ok(SearchSetup {
            suite,
            history,
            initial_best,
        })
    }

    pub async fn run(&self) -> Result<RunSummary, SearchError> {
        let setup = self.initialize()?;
        Ok(self.run_with(&setup).await)
    }

    /// Drive the loop until the iteration budget is spent or the early exit fires.
    pub async fn run_with(&self, setup: &SearchSetup) -> RunSummary {
        let mut state = IterationState::new(setup.initial_best);
        let mut reports = Vec::with_capacity(self.config.iterations);
        let mut stopped_early = false;

        for _ in 0..self.config.iterations {
            let best_before = state.best_score_so_far;
            let (mut report, winner) = self.run_iteration(&state, setup).await;

            let exit = winner
                .as_ref()
                .map(|w| early_exit(best_before, w.score, self.config.early_exit_ratio))
                .unwrap_or(false);
            state = state.advance(winner.map(|w| (w.candidate, w.score)));

            report.best_after = state.best_score_so_far;
            report.early_exit = exit;
            reports.push(report);

            if exit {
                info!(
                    iteration = state.iteration_index - 1,
                    best_before,
                    best = state.best_score_so_far,
                    "early exit: improvement ratio exceeded"
                );
                stopped_early = true;
                break;
            }
        }

        let summary = RunSummary {
            initial_best: setup.initial_best,
            best_score: state.best_score_so_far,
            iterations_run: reports.len(),
            early_exit: stopped_early,
            iterations: reports,
        };
        if summary.improved() {
            info!(
                iterations = summary.iterations_run,
                initial_best = summary.initial_best,
                best = summary.best_score,
                "search finished"
            );
        } else {
            info!(
                iterations = summary.iterations_run,
                best = summary.best_score,
                "search finished; no improvement was recorded"
            );
        }
        summary
    }

    fn prompt_context(&self, state: &IterationState, setup: &SearchSetup) -> PromptContext {
        let focus = match &state.previous_chosen {
            Some(previous) => PromptFocus::Refine {
                name: previous.candidate.name.clone(),
                description: previous.candidate.description.clone(),
                source: previous.candidate.source_text.clone(),
                feedback: previous.feedback(),
            },
            None => PromptFocus::Explore {
                history: setup.history.clone(),
            },
        };
        PromptContext {
            benchmark_description: setup.suite.description(),
            benchmark_names: setup.suite.names().iter().map(|n| n.to_string()).collect(),
            focus,
        }
    }

    async fn run_iteration(
        &self,
        state: &IterationState,
        setup: &SearchSetup,
    ) -> (IterationReport, Option<Survivor>) {
        let iteration = state.iteration_index;
        let context = self.prompt_context(state, setup);
        let prompt = context.assemble();
        info!(
            iteration,
            prompt = ?context.kind(),
            candidates = self.config.candidates_per_iteration,
            "iteration started"
        );

        let mut slots = Vec::with_capacity(self.config.candidates_per_iteration);
        let mut survivors = Vec::new();
        for slot in 0..self.config.candidates_per_iteration {
            match self.run_slot(iteration, slot, &prompt, &setup.suite).await {
                Ok(survivor) => {
                    slots.push(SlotOutcome {
                        slot,
                        candidate_id: Some(survivor.candidate.id.clone()),
                        observations: survivor.observations.len(),
                        score: Some(survivor.score),
                        status: SlotStatus::Scored,
                    });
                    survivors.push(survivor);
                }
                Err(outcome) => slots.push(outcome),
            }
        }

        let winner = select(survivors);
        let chosen = winner.as_ref().map(|w| ChosenSummary {
            candidate_id: w.candidate.id.clone(),
            name: w.candidate.name.clone(),
            slot: w.candidate.slot,
            score: w.score,
        });

        match &winner {
            Some(w) => {
                info!(
                    iteration,
                    candidate = %w.candidate.id,
                    score = w.score,
                    best_before = state.best_score_so_far,
                    step = "select",
                    status = "ok",
                    "candidate chosen"
                );
                self.record_aggregate(w, &setup.suite);
            }
            None => warn!(
                iteration,
                step = "select",
                status = "failed",
                "no candidate survived; skipping iteration"
            ),
        }

        let report = IterationReport {
            iteration,
            prompt_kind: context.kind(),
            slots,
            chosen,
            best_before: state.best_score_so_far,
            best_after: state.best_score_so_far,
            early_exit: false,
        };
        (report, winner)
    }

    async fn run_slot(
        &self,
        iteration: usize,
        slot: usize,
        prompt: &str,
        suite: &BenchmarkSuite,
    ) -> Result<Survivor, SlotOutcome> {
        let text = match self.generator.complete(prompt, &self.config.sampling).await {
            Ok(text) => {
                info!(
                    iteration,
                    slot,
                    generator = self.generator.name(),
                    temperature = ?self.config.sampling.effective_temperature(),
                    step = "generate",
                    status = "ok",
                    "candidate received"
                );
                text
            }
            Err(err) => {
                warn!(iteration, slot, step = "generate", status = "failed", error = %err, "generation failed");
                return Err(SlotOutcome::failed(
                    slot,
                    None,
                    SlotStatus::GenerationFailed {
                        error: err.to_string(),
                    },
                ));
            }
        };

        let Some(candidate) = Candidate::from_response(iteration, slot, &text) else {
            warn!(
                iteration,
                slot,
                step = "parse",
                status = "failed",
                response_chars = text.len(),
                "response is missing a required section"
            );
            return Err(SlotOutcome::failed(slot, None, SlotStatus::ParseFailed));
        };
        info!(iteration, slot, candidate = %candidate.id, step = "parse", status = "ok", "candidate parsed");

        let artifact = self.builder.build(&candidate).await.map_err(|err| {
            SlotOutcome::failed(
                slot,
                Some(candidate.id.clone()),
                SlotStatus::BuildFailed {
                    error: err.to_string(),
                },
            )
        })?;

        let observations = self
            .harness
            .evaluate(&candidate, &artifact, suite)
            .await
            .map_err(|err| {
                warn!(candidate = %candidate.id, step = "evaluate", status = "failed", error = %err, "candidate dropped");
                SlotOutcome::failed(
                    slot,
                    Some(candidate.id.clone()),
                    SlotStatus::EvaluationFailed {
                        error: err.to_string(),
                    },
                )
            })?;

        let Some(score) = aggregate_score(&observations) else {
            warn!(candidate = %candidate.id, step = "evaluate", status = "failed", "no benchmark produced an observation");
            return Err(SlotOutcome::failed(
                slot,
                Some(candidate.id.clone()),
                SlotStatus::NoObservations,
            ));
        };
        info!(
            candidate = %candidate.id,
            score,
            observations = observations.len(),
            step = "evaluate",
            status = "ok",
            "candidate scored"
        );

        Ok(Survivor {
            source: artifact.source.display().to_string(),
            candidate,
            score,
            observations,
        })
    }

    fn record_aggregate(&self, winner: &Survivor, suite: &BenchmarkSuite) {
        let secondary: Vec<f64> = winner
            .observations
            .iter()
            .filter_map(|o| o.secondary_metric)
            .collect();
        let metric_value =
            (!secondary.is_empty()).then(|| secondary.iter().sum::<f64>() / secondary.len() as f64);

        let record = ExperimentRecord {
            benchmark_label: AGGREGATE_LABEL.to_string(),
            candidate_name: winner.candidate.name.clone(),
            description: winner.candidate.description.clone(),
            benchmark_description: suite.description(),
            artifact_locator: winner.source.clone(),
            metric_value,
            score_value: winner.score,
        };
        match self.store.record(&record) {
            Ok(()) => info!(candidate = %winner.candidate.id, step = "record", status = "ok", "aggregate recorded"),
            Err(err) => warn!(
                candidate = %winner.candidate.id,
                step = "record",
                status = "failed",
                error = %err,
                "failed to record aggregate score"
            ),
        }
    }
}

/// Strictly greatest score wins; the earliest slot keeps ties.
fn select(survivors: Vec<Survivor>) -> Option<Survivor> {
    let mut best: Option<Survivor> = None;
    for survivor in survivors {
        let better = match &best {
            Some(current) => survivor.score > current.score,
            None => true,
        };
        if better {
            best = Some(survivor);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyforge_harness::ResponseSections;

    fn survivor(slot: usize, score: f64) -> Survivor {
        Survivor {
            candidate: Candidate::new(
                0,
                slot,
                ResponseSections {
                    name: format!("p{slot}"),
                    description: "d".into(),
                    code: "int x;".into(),
                },
            ),
            source: String::new(),
            score,
            observations: Vec::new(),
        }
    }

    #[test]
    fn test_select_prefers_strictly_greater_score() {
        let chosen = select(vec![survivor(0, 1.0), survivor(1, 1.2), survivor(2, 1.1)]).unwrap();
        assert_eq!(chosen.candidate.slot, 1);
    }

    #[test]
    fn test_select_tie_goes_to_earliest_slot() {
        for _ in 0..10 {
            let chosen = select(vec![survivor(0, 1.5), survivor(1, 1.5), survivor(2, 0.3)]).unwrap();
            assert_eq!(chosen.candidate.slot, 0);
        }
        assert!(select(Vec::new()).is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        let config = SearchConfig {
            candidates_per_iteration: 0,
            ..SearchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { ref name, .. }) if name == "candidates"
        ));
        let config = SearchConfig {
            early_exit_ratio: f64::NAN,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
