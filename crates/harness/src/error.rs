use policyforge_metrics::MetricError;
use policyforge_store::StoreError;
use thiserror::Error;

/// Problems detected before the search loop starts. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown benchmark name(s): {}", names.join(", "))]
    UnknownBenchmarks { names: Vec<String> },

    #[error("benchmark suite is empty")]
    EmptySuite,

    #[error("missing required environment variable {variable}")]
    MissingCredentials { variable: String },

    #[error("execution sandbox unavailable: {reason}")]
    SandboxUnavailable { reason: String },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

/// Candidate-level evaluation failure; the candidate receives no score.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("candidate {candidate_id} on {benchmark}: {source}")]
    Metric {
        candidate_id: String,
        benchmark: String,
        #[source]
        source: MetricError,
    },

    #[error("failed to record observation of {candidate_id} on {benchmark}: {source}")]
    Store {
        candidate_id: String,
        benchmark: String,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_benchmarks_lists_names() {
        let err = ConfigError::UnknownBenchmarks {
            names: vec!["gcc".into(), "xalan".into()],
        };
        assert_eq!(err.to_string(), "unknown benchmark name(s): gcc, xalan");
    }
}
