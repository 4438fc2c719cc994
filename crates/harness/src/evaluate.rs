//! Running built candidates against the benchmark suite.

use crate::builder::BuildArtifact;
use crate::candidate::Candidate;
use crate::error::EvaluationError;
use crate::suite::{BenchmarkItem, BenchmarkSuite};
use policyforge_metrics::{tail_excerpt, MetricExtractor};
use policyforge_sandbox::{Arg, Sandbox};
use policyforge_store::{ExperimentRecord, ExperimentStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const EXCERPT_CHARS: usize = 500;

/// Simulator parameters shared by every benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    pub warmup_instructions: u64,
    pub simulation_instructions: u64,
    /// Upper bound for a single benchmark run.
    pub timeout: Duration,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            warmup_instructions: 1_000_000,
            simulation_instructions: 10_000_000,
            timeout: Duration::from_secs(3600),
        }
    }
}

impl RunParameters {
    pub fn args(&self, item: &BenchmarkItem) -> Vec<Arg> {
        vec![
            Arg::from("-warmup_instructions"),
            Arg::from(self.warmup_instructions.to_string()),
            Arg::from("-simulation_instructions"),
            Arg::from(self.simulation_instructions.to_string()),
            Arg::from("-traces"),
            Arg::from(item.trace.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub benchmark_item: String,
    pub candidate_id: String,
    pub metric_value: f64,
    pub secondary_metric: Option<f64>,
    pub raw_output_excerpt: String,
}

/// Arithmetic mean of the observed metric values; `None` when nothing was observed.
pub fn aggregate_score(observations: &[Observation]) -> Option<f64> {
    if observations.is_empty() {
        return None;
    }
    let total: f64 = observations.iter().map(|o| o.metric_value).sum();
    Some(total / observations.len() as f64)
}

pub struct EvaluationHarness {
    sandbox: Arc<dyn Sandbox>,
    store: Arc<dyn ExperimentStore>,
    extractor: MetricExtractor,
    params: RunParameters,
}

impl EvaluationHarness {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        store: Arc<dyn ExperimentStore>,
        params: RunParameters,
    ) -> Self {
        Self {
            sandbox,
            store,
            extractor: MetricExtractor::default(),
            params,
        }
    }

    pub fn with_extractor(mut self, extractor: MetricExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Run `artifact` on each suite item in order.
    ///
    /// A failed or timed-out run drops that item only. A run whose output
    /// carries no primary metric aborts the whole candidate, as does a
    /// failure to persist an observation. Observations are persisted as
    /// soon as they are produced.
    pub async fn evaluate(
        &self,
        candidate: &Candidate,
        artifact: &BuildArtifact,
        suite: &BenchmarkSuite,
    ) -> Result<Vec<Observation>, EvaluationError> {
        let mut observations = Vec::with_capacity(suite.len());

        for item in suite.items() {
            let args = self.params.args(item);
            let output = match self
                .sandbox
                .run(&artifact.executable, &args, self.params.timeout)
                .await
            {
                Ok(output) => output,
                Err(err) => {
                    let (stdout, stderr) = err
                        .failure()
                        .map(|f| {
                            (
                                tail_excerpt(&f.stdout, EXCERPT_CHARS).to_string(),
                                tail_excerpt(&f.stderr, EXCERPT_CHARS).to_string(),
                            )
                        })
                        .unwrap_or_default();
                    warn!(
                        candidate = %candidate.id,
                        benchmark = %item.name,
                        step = "run",
                        status = "failed",
                        timed_out = err.is_timeout(),
                        error = %err,
                        stdout = %stdout,
                        stderr = %stderr,
                        "benchmark run dropped"
                    );
                    continue;
                }
            };

            let reading = self.extractor.extract_primary(&output.stdout).map_err(|source| {
                warn!(
                    candidate = %candidate.id,
                    benchmark = %item.name,
                    step = "metric",
                    status = "failed",
                    stderr = %tail_excerpt(&output.stderr, EXCERPT_CHARS),
                    "no metric in run output; abandoning candidate"
                );
                EvaluationError::Metric {
                    candidate_id: candidate.id.clone(),
                    benchmark: item.name.clone(),
                    source,
                }
            })?;
            let secondary = self.extractor.extract_secondary(&output.stdout);

            let observation = Observation {
                benchmark_item: item.name.clone(),
                candidate_id: candidate.id.clone(),
                metric_value: reading.value,
                secondary_metric: secondary,
                raw_output_excerpt: tail_excerpt(&output.stdout, EXCERPT_CHARS).to_string(),
            };

            self.store
                .record(&ExperimentRecord {
                    benchmark_label: item.name.clone(),
                    candidate_name: candidate.name.clone(),
                    description: candidate.description.clone(),
                    benchmark_description: item.description.clone(),
                    artifact_locator: artifact.source.display().to_string(),
                    metric_value: secondary,
                    score_value: reading.value,
                })
                .map_err(|source| EvaluationError::Store {
                    candidate_id: candidate.id.clone(),
                    benchmark: item.name.clone(),
                    source,
                })?;

            info!(
                candidate = %candidate.id,
                benchmark = %item.name,
                step = "run",
                status = "ok",
                metric = reading.value,
                strategy = reading.strategy.name(),
                hit_ratio = ?secondary,
                elapsed_s = output.elapsed.as_secs_f64(),
                "benchmark observed"
            );
            observations.push(observation);
        }

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ResponseSections;
    use async_trait::async_trait;
    use policyforge_sandbox::{BuildError, CapturedOutput, RunError};
    use policyforge_store::MemoryStore;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    enum Scripted {
        Output(String),
        TimedOut,
    }

    /// Answers runs by the trace file name.
    struct ScriptedSandbox {
        by_trace: HashMap<String, Scripted>,
        seen: Mutex<Vec<Vec<Arg>>>,
    }

    impl ScriptedSandbox {
        fn new(entries: Vec<(&str, Scripted)>) -> Self {
            Self {
                by_trace: entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Sandbox for ScriptedSandbox {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn build(&self, _source: &Path, _output: &Path) -> Result<(), BuildError> {
            Ok(())
        }

        async fn run(
            &self,
            executable: &Path,
            args: &[Arg],
            timeout: Duration,
        ) -> Result<CapturedOutput, RunError> {
            self.seen.lock().unwrap().push(args.to_vec());
            let trace = match args.last() {
                Some(Arg::Path(path)) => path.display().to_string(),
                _ => String::new(),
            };
            match self.by_trace.get(&trace) {
                Some(Scripted::Output(stdout)) => Ok(CapturedOutput {
                    stdout: stdout.clone(),
                    exit_code: Some(0),
                    ..Default::default()
                }),
                Some(Scripted::TimedOut) | None => Err(RunError::TimedOut {
                    executable: executable.display().to_string(),
                    timeout,
                }),
            }
        }
    }

    fn suite() -> BenchmarkSuite {
        BenchmarkSuite::new(vec![
            BenchmarkItem::new("a", "traces/a", "first"),
            BenchmarkItem::new("b", "traces/b", "second"),
            BenchmarkItem::new("c", "traces/c", "third"),
        ])
    }

    fn candidate() -> (Candidate, BuildArtifact) {
        let candidate = Candidate::new(
            0,
            0,
            ResponseSections {
                name: "Test Policy".into(),
                description: "for tests".into(),
                code: "int x;".into(),
            },
        );
        let artifact = BuildArtifact {
            candidate_id: candidate.id.clone(),
            source: PathBuf::from("new_policies/000_00_test_policy.cc"),
            executable: PathBuf::from("new_policies/000_00_test_policy.out"),
        };
        (candidate, artifact)
    }

    fn ipc(value: f64) -> Scripted {
        Scripted::Output(format!(
            "CPU 0 cumulative IPC: {value}\nLLC TOTAL     ACCESS:    100  HIT:     40\n"
        ))
    }

    #[test]
    fn test_aggregate_score() {
        assert_eq!(aggregate_score(&[]), None);
        let obs = |v| Observation {
            benchmark_item: "x".into(),
            candidate_id: "c".into(),
            metric_value: v,
            secondary_metric: None,
            raw_output_excerpt: String::new(),
        };
        let score = aggregate_score(&[obs(1.0), obs(2.0), obs(4.5)]).unwrap();
        assert!((score - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_run_arguments() {
        let params = RunParameters::default();
        let args = params.args(&BenchmarkItem::new("mcf", "traces/mcf.gz", ""));
        assert_eq!(args[1], Arg::from("1000000"));
        assert_eq!(args[3], Arg::from("10000000"));
        assert_eq!(args[5], Arg::Path(PathBuf::from("traces/mcf.gz")));
    }

    #[tokio::test]
    async fn test_every_item_observed_and_recorded_in_order() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ("traces/a", ipc(1.0)),
            ("traces/b", ipc(2.0)),
            ("traces/c", ipc(3.0)),
        ]));
        let store = Arc::new(MemoryStore::new());
        let harness = EvaluationHarness::new(sandbox, store.clone(), RunParameters::default());
        let (candidate, artifact) = candidate();

        let observations = harness.evaluate(&candidate, &artifact, &suite()).await.unwrap();

        assert_eq!(observations.len(), 3);
        assert_eq!(observations[1].secondary_metric, Some(0.4));
        assert_eq!(aggregate_score(&observations), Some(2.0));

        let records = store.records();
        let labels: Vec<_> = records.iter().map(|r| r.benchmark_label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
        assert_eq!(records[2].score_value, 3.0);
        assert_eq!(records[0].candidate_name, "Test Policy");
        assert_eq!(records[0].artifact_locator, "new_policies/000_00_test_policy.cc");
    }

    #[tokio::test]
    async fn test_timeout_drops_only_that_item() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ("traces/a", ipc(1.0)),
            ("traces/b", Scripted::TimedOut),
            ("traces/c", ipc(3.0)),
        ]));
        let store = Arc::new(MemoryStore::new());
        let harness = EvaluationHarness::new(sandbox.clone(), store.clone(), RunParameters::default());
        let (candidate, artifact) = candidate();

        let observations = harness.evaluate(&candidate, &artifact, &suite()).await.unwrap();

        assert_eq!(observations.len(), 2);
        assert_eq!(store.records().len(), 2);
        assert_eq!(sandbox.seen.lock().unwrap().len(), 3);
        assert_eq!(aggregate_score(&observations), Some(2.0));
    }

    #[tokio::test]
    async fn test_missing_metric_aborts_candidate_after_partial_progress() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ("traces/a", ipc(1.0)),
            ("traces/b", Scripted::Output("simulation finished\n".into())),
            ("traces/c", ipc(3.0)),
        ]));
        let store = Arc::new(MemoryStore::new());
        let harness = EvaluationHarness::new(sandbox.clone(), store.clone(), RunParameters::default());
        let (candidate, artifact) = candidate();

        let err = harness
            .evaluate(&candidate, &artifact, &suite())
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluationError::Metric { ref benchmark, .. } if benchmark == "b"));
        assert_eq!(store.records().len(), 1);
        assert_eq!(sandbox.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_all_runs_failing_yields_no_score() {
        let sandbox = Arc::new(ScriptedSandbox::new(Vec::new()));
        let store = Arc::new(MemoryStore::new());
        let harness = EvaluationHarness::new(sandbox, store, RunParameters::default());
        let (candidate, artifact) = candidate();

        let observations = harness.evaluate(&candidate, &artifact, &suite()).await.unwrap();
        assert!(observations.is_empty());
        assert_eq!(aggregate_score(&observations), None);
    }
}
