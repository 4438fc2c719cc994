//! Iterative policy search.
//!
//! Each iteration asks the generator for a fixed number of candidates,
//! builds and evaluates the ones that parse, keeps the best, and feeds it
//! back into the next prompt. The only state carried between iterations is
//! [`IterationState`].

#[cfg(feature = "cli")]
pub mod cli;
pub mod controller;
pub mod error;
#[cfg(feature = "cli")]
pub mod export;
pub mod generator;
pub mod prompt;
pub mod state;
pub mod summary;

pub use controller::{SearchConfig, SearchController, SearchSetup};
pub use error::SearchError;
pub use generator::{
    is_o_series, Backend, ChatCompletionsClient, GenerationError, Generator, SamplingConfig,
};
pub use prompt::{PromptContext, PromptFocus, PromptKind, CODE_TEMPLATE, SEED_KNOWLEDGE};
pub use state::{early_exit, ChosenCandidate, IterationState};
pub use summary::{ChosenSummary, IterationReport, RunSummary, SlotOutcome, SlotStatus};
