//! Typed validation errors for the APE experiment.
//!
//! Anything that is a caller mistake (bad configuration, mismatched
//! metric inputs, a gap in the history) is one of these variants.
//! I/O and framework failures stay as `anyhow` errors in the
//! application and infra layers.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApeError {
    /// The batcher cannot split `corpus_len` pairs into `iterations` batches.
    #[error("cannot split {corpus_len} pairs into {iterations} iterations")]
    InvalidBatchPlan { corpus_len: usize, iterations: usize },

    /// Generated, reference and article lists must be parallel.
    #[error(
        "metric inputs are not parallel: {articles} articles, \
         {generated} generated, {references} references"
    )]
    LengthMismatch {
        articles: usize,
        generated: usize,
        references: usize,
    },

    /// History is append-only and contiguous from iteration 0.
    #[error("history expects iteration {expected}, got {got}")]
    HistoryGap { expected: usize, got: usize },

    /// Every iteration carries exactly one value per metric.
    #[error("metric record for iteration {iteration} has no value for '{metric}'")]
    IncompleteRecord { iteration: usize, metric: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("the {0} split is empty")]
    EmptyCorpus(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}
