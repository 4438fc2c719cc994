use policyforge_harness::ConfigError;
use policyforge_store::StoreError;
use thiserror::Error;

/// Failures that stop a search before its first iteration.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load search history: {0}")]
    History(#[from] StoreError),
}
