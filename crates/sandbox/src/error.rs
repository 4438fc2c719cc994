//! Sandbox error types.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Exit status and both streams of a process that did not succeed.
#[derive(Debug, Clone, Default)]
pub struct ProcessFailure {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit code {code}")?,
            None => write!(f, "termination by signal")?,
        }
        write!(
            f,
            " (stdout {} bytes, stderr {} bytes)",
            self.stdout.len(),
            self.stderr.len()
        )
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to launch build of {source_path}: {error}")]
    Spawn {
        source_path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("build of {source_path} failed with {failure}")]
    Failed {
        source_path: String,
        failure: ProcessFailure,
    },

    #[error("build of {source_path} timed out after {timeout:?}")]
    TimedOut {
        source_path: String,
        timeout: Duration,
    },

    #[error("failed to write candidate source {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
}

impl BuildError {
    pub fn failure(&self) -> Option<&ProcessFailure> {
        match self {
            BuildError::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch {executable}: {error}")]
    Spawn {
        executable: String,
        #[source]
        error: std::io::Error,
    },

    #[error("{executable} failed with {failure}")]
    Failed {
        executable: String,
        failure: ProcessFailure,
    },

    #[error("{executable} timed out after {timeout:?}")]
    TimedOut {
        executable: String,
        timeout: Duration,
    },
}

impl RunError {
    pub fn failure(&self) -> Option<&ProcessFailure> {
        match self {
            RunError::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RunError::TimedOut { .. })
    }
}
