//! Candidate construction and evaluation.
//!
//! A generator response becomes a [`Candidate`] only when all three of its
//! sections parse. The [`CandidateBuilder`] persists and compiles it through
//! the sandbox, and the [`EvaluationHarness`] runs the artifact against every
//! item of a [`BenchmarkSuite`], recording each observation as it goes.

pub mod builder;
pub mod candidate;
pub mod error;
pub mod evaluate;
pub mod suite;

pub use builder::{BuildArtifact, CandidateBuilder};
pub use candidate::{candidate_id, parse_generator_response, sanitize_name, Candidate, ResponseSections};
pub use error::{ConfigError, EvaluationError};
pub use evaluate::{aggregate_score, EvaluationHarness, Observation, RunParameters};
pub use suite::{BenchmarkItem, BenchmarkSuite};
