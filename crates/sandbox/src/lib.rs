//! Isolated execution for candidate policies.
//!
//! The sandbox compiles a policy source against the simulator support library
//! and runs the resulting executable, capturing both output streams. Callers
//! hand over host paths; the adapter translates them to whatever the sandbox
//! mounts, so nothing above this crate knows about container internals.
//!
//! ```text
//! host path ──▶ PathMapper ──▶ /app/<relative> ──▶ docker run … bash -c "<cmd>"
//! ```

pub mod docker;
pub mod error;
pub mod paths;
pub mod runtime;

pub use docker::{DockerConfig, DockerSandbox};
pub use error::{BuildError, ProcessFailure, RunError};
pub use paths::PathMapper;
pub use runtime::{Arg, CapturedOutput, Sandbox};
