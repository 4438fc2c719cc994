//! Sandbox contract shared by every execution backend.

use crate::error::{BuildError, ProcessFailure, RunError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One argument handed to an executable inside the sandbox.
///
/// Path arguments are translated to the sandbox view of the filesystem,
/// literal arguments are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Literal(String),
    Path(PathBuf),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Literal(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Literal(value)
    }
}

impl From<PathBuf> for Arg {
    fn from(value: PathBuf) -> Self {
        Arg::Path(value)
    }
}

impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::Path(value.to_path_buf())
    }
}

/// Everything a finished process left behind.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn into_failure(self) -> ProcessFailure {
        ProcessFailure {
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Build-and-run capability for candidate programs.
///
/// Implementations never retry. A non-zero exit is reported as an error that
/// carries the exit code and both streams.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &str;

    /// Compile `source` into an executable at `output`, linking the support
    /// library the backend was configured with.
    async fn build(&self, source: &Path, output: &Path) -> Result<(), BuildError>;

    /// Run `executable` with `args`, giving up after `timeout`.
    async fn run(
        &self,
        executable: &Path,
        args: &[Arg],
        timeout: Duration,
    ) -> Result<CapturedOutput, RunError>;
}
