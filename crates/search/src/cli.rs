//! CLI wiring for PolicyForge.

use crate::controller::{SearchConfig, SearchController};
use crate::export::write_observations_csv;
use crate::generator::{ChatCompletionsClient, SamplingConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use policyforge_harness::{
    aggregate_score, BenchmarkSuite, Candidate, CandidateBuilder, ConfigError, EvaluationHarness,
    RunParameters,
};
use policyforge_sandbox::{DockerConfig, DockerSandbox, PathMapper};
use policyforge_store::{ExperimentStore, HistoryService, MemoryStore, SqliteStore, AGGREGATE_LABEL};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "policyforge", about = "Search and evaluate cache replacement policies")]
pub struct Cli {
    /// Container image holding the simulator toolchain.
    #[arg(long, default_value = "champsim-runner")]
    pub image: String,

    #[arg(long, default_value = "linux/amd64")]
    pub platform: String,

    /// Host directory mounted into the sandbox (defaults to the current directory).
    /// Relative `--db` and `--policy-dir` paths are resolved inside it.
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the generate, build, evaluate, select loop.
    Search {
        #[arg(long, value_delimiter = ',')]
        workloads: Vec<String>,
        #[arg(long, default_value_t = 1_000_000)]
        warmup: u64,
        #[arg(long, default_value_t = 10_000_000)]
        sim: u64,
        #[arg(long, default_value_t = 50)]
        iterations: usize,
        #[arg(long, default_value_t = 3)]
        candidates: usize,
        #[arg(long, default_value_t = 0.2)]
        temperature: f32,
        #[arg(long, default_value = "gpt-4.1")]
        model: String,
        #[arg(long, default_value_t = 1.3)]
        early_exit_ratio: f64,
        #[arg(long, default_value = "DB/funsearch.db")]
        db: PathBuf,
        #[arg(long, default_value = "ChampSim_CRC2/new_policies")]
        policy_dir: PathBuf,
        #[arg(long, default_value_t = 3600)]
        run_timeout_secs: u64,
        /// Write the run summary as JSON.
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long, default_value = AGGREGATE_LABEL)]
        history_workload: String,
        #[arg(long, default_value_t = 5)]
        top_n: usize,
    },
    /// Build one policy source and measure it on the selected workloads.
    Evaluate {
        #[arg(long)]
        policy: PathBuf,
        #[arg(long, value_delimiter = ',')]
        workloads: Vec<String>,
        #[arg(long, default_value_t = 1_000_000)]
        warmup: u64,
        #[arg(long, default_value_t = 10_000_000)]
        sim: u64,
        #[arg(long, default_value_t = 3600)]
        run_timeout_secs: u64,
        #[arg(long, default_value = "results/ipc_results.csv")]
        out: PathBuf,
        /// Also append observations to this experiment database.
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the benchmark suite the search would use.
    ListWorkloads {
        #[arg(long, default_value = "DB/funsearch.db")]
        db: PathBuf,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
    let _ = dotenvy::dotenv();

    let Cli {
        image,
        platform,
        workspace,
        command,
    } = cli;
    let docker = DockerConfig {
        image,
        platform: Some(platform).filter(|p| !p.is_empty()),
        host_root: match workspace {
            Some(root) => root,
            None => std::env::current_dir().context("failed to read current directory")?,
        },
        ..DockerConfig::default()
    };
    let mapper = PathMapper::new(docker.host_root.clone(), docker.container_root.clone());

    match command {
        Command::Search {
            workloads,
            warmup,
            sim,
            iterations,
            candidates,
            temperature,
            model,
            early_exit_ratio,
            db,
            policy_dir,
            run_timeout_secs,
            summary,
            history_workload,
            top_n,
        } => {
            let rt = Runtime::new()?;
            let sandbox = Arc::new(DockerSandbox::new(docker));
            ensure_sandbox(&rt, &sandbox)?;
            let generator = Arc::new(ChatCompletionsClient::from_env()?);
            info!(generator = ?generator.backend(), model = %model, "generator configured");

            let db = mapper.to_host(&db);
            let policy_dir = mapper.to_host(&policy_dir);
            let store = Arc::new(
                SqliteStore::open(&db)
                    .with_context(|| format!("failed to open experiment store {}", db.display()))?,
            );
            let params = RunParameters {
                warmup_instructions: warmup,
                simulation_instructions: sim,
                timeout: Duration::from_secs(run_timeout_secs),
            };
            let config = SearchConfig {
                iterations,
                candidates_per_iteration: candidates,
                sampling: SamplingConfig::new(model, temperature),
                early_exit_ratio,
                workloads,
                history_workload,
                top_n,
            };

            let controller = SearchController::new(
                generator,
                CandidateBuilder::new(sandbox.clone(), policy_dir),
                EvaluationHarness::new(sandbox, store.clone(), params),
                store.clone(),
                store,
                config,
            );
            let report = rt.block_on(controller.run())?;

            println!(
                "iterations={} early_exit={} initial_best={:.4} best={:.4}",
                report.iterations_run, report.early_exit, report.initial_best, report.best_score
            );
            match report.best_chosen() {
                Some(best) => println!("best chosen: {} ({:.4})", best.candidate_id, best.score),
                None => println!("no improvement was recorded"),
            }
            if let Some(path) = summary {
                report.write_json(&path)?;
                info!(path = %path.display(), "run summary written");
            }
        }
        Command::Evaluate {
            policy,
            workloads,
            warmup,
            sim,
            run_timeout_secs,
            out,
            db,
        } => {
            let policy = workspace_policy(&mapper, &policy)?;
            let rt = Runtime::new()?;
            let sandbox = Arc::new(DockerSandbox::new(docker));
            ensure_sandbox(&rt, &sandbox)?;

            let store: Arc<dyn ExperimentStore> = match &db {
                Some(path) => Arc::new(SqliteStore::open(&mapper.to_host(path))?),
                None => Arc::new(MemoryStore::new()),
            };
            let suite = BenchmarkSuite::default_five().select(&workloads)?;
            let candidate = standalone_candidate(&policy)?;

            let builder = CandidateBuilder::new(
                sandbox.clone(),
                policy.parent().map(Path::to_path_buf).unwrap_or_default(),
            );
            let harness = EvaluationHarness::new(
                sandbox,
                store,
                RunParameters {
                    warmup_instructions: warmup,
                    simulation_instructions: sim,
                    timeout: Duration::from_secs(run_timeout_secs),
                },
            );

            let observations = rt.block_on(async {
                let artifact = builder.build_source(&candidate.id, &policy).await?;
                let observations = harness.evaluate(&candidate, &artifact, &suite).await?;
                anyhow::Ok(observations)
            })?;

            for obs in &observations {
                match obs.secondary_metric {
                    Some(hit) => println!("- {}: IPC={:.4}, HitRate={:.4}", obs.benchmark_item, obs.metric_value, hit),
                    None => println!("- {}: IPC={:.4}", obs.benchmark_item, obs.metric_value),
                }
            }
            match aggregate_score(&observations) {
                Some(mean) => println!("mean IPC over {} workloads: {:.4}", observations.len(), mean),
                None => println!("no workload produced an observation"),
            }

            write_observations_csv(&out, &candidate.name, &policy, &observations)?;
            info!(path = %out.display(), rows = observations.len(), "results written");
        }
        Command::ListWorkloads { db } => {
            let db = mapper.to_host(&db);
            let catalogue = if db.exists() {
                SqliteStore::open(&db)?.benchmarks_with_descriptions()?
            } else {
                Default::default()
            };
            let suite = BenchmarkSuite::from_catalogue(&catalogue)
                .unwrap_or_else(BenchmarkSuite::default_five);
            for item in suite.items() {
                println!("{:<10} {}  {}", item.name, item.trace.display(), item.description);
            }
        }
    }
    Ok(())
}

fn ensure_sandbox(rt: &Runtime, sandbox: &DockerSandbox) -> Result<(), ConfigError> {
    let version = rt
        .block_on(sandbox.check_available())
        .map_err(|err| ConfigError::SandboxUnavailable {
            reason: err.to_string(),
        })?;
    info!(version = %version, image = %sandbox.config().image, "sandbox available");
    Ok(())
}

/// Absolute location of a user-supplied policy file, which the sandbox must
/// be able to reach through the workspace mount.
fn workspace_policy(mapper: &PathMapper, policy: &Path) -> Result<PathBuf> {
    let policy = std::path::absolute(policy)
        .with_context(|| format!("failed to resolve {}", policy.display()))?;
    if !policy.is_file() {
        bail!("policy source {} does not exist", policy.display());
    }
    if !mapper.contains(&policy) {
        return Err(ConfigError::InvalidSetting {
            name: "policy".into(),
            reason: format!(
                "{} is outside the workspace {}",
                policy.display(),
                mapper.host_root().display()
            ),
        }
        .into());
    }
    Ok(policy)
}

/// A candidate for a policy file that did not come from the generator.
fn standalone_candidate(policy: &Path) -> Result<Candidate> {
    let name = policy
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "policy".to_string());
    let source_text = fs::read_to_string(policy)
        .with_context(|| format!("failed to read {}", policy.display()))?;
    Ok(Candidate {
        id: name.clone(),
        iteration: 0,
        slot: 0,
        name,
        description: String::new(),
        source_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["policyforge", "search"]).unwrap();
        assert_eq!(cli.image, "champsim-runner");
        match cli.command {
            Command::Search {
                workloads,
                iterations,
                candidates,
                model,
                early_exit_ratio,
                history_workload,
                ..
            } => {
                assert!(workloads.is_empty());
                assert_eq!(iterations, 50);
                assert_eq!(candidates, 3);
                assert_eq!(model, "gpt-4.1");
                assert_eq!(early_exit_ratio, 1.3);
                assert_eq!(history_workload, AGGREGATE_LABEL);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_workloads_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "policyforge",
            "--image",
            "sim:latest",
            "evaluate",
            "--policy",
            "new_policies/ship.cc",
            "--workloads",
            "mcf,lbm",
        ])
        .unwrap();
        assert_eq!(cli.image, "sim:latest");
        match cli.command {
            Command::Evaluate {
                workloads, out, db, ..
            } => {
                assert_eq!(workloads, vec!["mcf", "lbm"]);
                assert_eq!(out, PathBuf::from("results/ipc_results.csv"));
                assert!(db.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_policy_must_live_in_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let mapper = PathMapper::new(workspace.path(), "/app");

        let inside = workspace.path().join("new_policies/ship.cc");
        fs::create_dir_all(inside.parent().unwrap()).unwrap();
        fs::write(&inside, "int x;").unwrap();
        let resolved = workspace_policy(&mapper, &inside).unwrap();
        assert_eq!(
            mapper.to_container(&resolved),
            PathBuf::from("/app/new_policies/ship.cc")
        );

        let outside = elsewhere.path().join("ship.cc");
        fs::write(&outside, "int x;").unwrap();
        let err = workspace_policy(&mapper, &outside).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidSetting { name, .. }) if name == "policy"
        ));

        assert!(workspace_policy(&mapper, &workspace.path().join("missing.cc")).is_err());
    }

    #[test]
    fn test_standalone_candidate_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hawkeye_lite.cc");
        fs::write(&path, "void InitReplacementState() {}\n").unwrap();
        let candidate = standalone_candidate(&path).unwrap();
        assert_eq!(candidate.name, "hawkeye_lite");
        assert_eq!(candidate.id, "hawkeye_lite");
        assert!(candidate.source_text.starts_with("void"));
    }
}
