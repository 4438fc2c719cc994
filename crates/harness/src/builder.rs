//! Turning candidate sources into runnable artifacts.

use crate::candidate::Candidate;
use policyforge_sandbox::{BuildError, Sandbox};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A compiled candidate. Exists only when the build succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub candidate_id: String,
    pub source: PathBuf,
    pub executable: PathBuf,
}

pub struct CandidateBuilder {
    sandbox: Arc<dyn Sandbox>,
    policy_dir: PathBuf,
}

impl CandidateBuilder {
    pub fn new(sandbox: Arc<dyn Sandbox>, policy_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandbox,
            policy_dir: policy_dir.into(),
        }
    }

    pub fn policy_dir(&self) -> &Path {
        &self.policy_dir
    }

    pub fn source_path(&self, candidate_id: &str) -> PathBuf {
        self.policy_dir.join(format!("{candidate_id}.cc"))
    }

    /// Write the candidate source to `<policy_dir>/<id>.cc` and compile it
    /// next to it as `<id>.out`.
    pub async fn build(&self, candidate: &Candidate) -> Result<BuildArtifact, BuildError> {
        let source = self.source_path(&candidate.id);
        fs::create_dir_all(&self.policy_dir).map_err(|error| BuildError::Io {
            path: self.policy_dir.display().to_string(),
            error,
        })?;
        fs::write(&source, &candidate.source_text).map_err(|error| BuildError::Io {
            path: source.display().to_string(),
            error,
        })?;
        self.build_source(&candidate.id, &source).await
    }

    /// Compile an existing source file into `<stem>.out` beside it.
    pub async fn build_source(
        &self,
        candidate_id: &str,
        source: &Path,
    ) -> Result<BuildArtifact, BuildError> {
        let executable = source.with_extension("out");
        match self.sandbox.build(source, &executable).await {
            Ok(()) => {
                info!(
                    candidate = candidate_id,
                    step = "build",
                    status = "ok",
                    executable = %executable.display(),
                    "candidate built"
                );
                Ok(BuildArtifact {
                    candidate_id: candidate_id.to_string(),
                    source: source.to_path_buf(),
                    executable,
                })
            }
            Err(err) => {
                let stderr = err
                    .failure()
                    .map(|f| policyforge_metrics::tail_excerpt(&f.stderr, 2000).to_string())
                    .unwrap_or_default();
                warn!(
                    candidate = candidate_id,
                    step = "build",
                    status = "failed",
                    sandbox = self.sandbox.name(),
                    error = %err,
                    stderr = %stderr,
                    "candidate build failed"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Candidate, ResponseSections};
    use async_trait::async_trait;
    use policyforge_sandbox::{Arg, CapturedOutput, ProcessFailure, RunError};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSandbox {
        fail: bool,
        builds: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    #[async_trait]
    impl Sandbox for RecordingSandbox {
        fn name(&self) -> &str {
            "recording"
        }

        async fn build(&self, source: &Path, output: &Path) -> Result<(), BuildError> {
            self.builds
                .lock()
                .unwrap()
                .push((source.to_path_buf(), output.to_path_buf()));
            if self.fail {
                return Err(BuildError::Failed {
                    source_path: source.display().to_string(),
                    failure: ProcessFailure {
                        exit_code: Some(1),
                        stdout: String::new(),
                        stderr: "error: expected ';'".into(),
                    },
                });
            }
            Ok(())
        }

        async fn run(
            &self,
            _executable: &Path,
            _args: &[Arg],
            _timeout: Duration,
        ) -> Result<CapturedOutput, RunError> {
            Ok(CapturedOutput::default())
        }
    }

    fn candidate() -> Candidate {
        Candidate::new(
            2,
            1,
            ResponseSections {
                name: "Dead Block Hybrid".into(),
                description: "desc".into(),
                code: "int main() {}".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_build_writes_source_and_names_artifact() {
        let dir = TempDir::new().unwrap();
        let sandbox = Arc::new(RecordingSandbox::default());
        let builder = CandidateBuilder::new(sandbox.clone(), dir.path().join("new_policies"));

        let artifact = builder.build(&candidate()).await.unwrap();

        let expected_source = dir.path().join("new_policies/002_01_dead_block_hybrid.cc");
        assert_eq!(artifact.source, expected_source);
        assert_eq!(artifact.executable, expected_source.with_extension("out"));
        assert_eq!(fs::read_to_string(&expected_source).unwrap(), "int main() {}");
        assert_eq!(sandbox.builds.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_build_failure_keeps_diagnostics() {
        let dir = TempDir::new().unwrap();
        let sandbox = Arc::new(RecordingSandbox {
            fail: true,
            ..Default::default()
        });
        let builder = CandidateBuilder::new(sandbox, dir.path());

        let err = builder.build(&candidate()).await.unwrap_err();
        assert_eq!(err.failure().unwrap().stderr, "error: expected ';'");
    }
}
