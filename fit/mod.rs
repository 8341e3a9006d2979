//! # Model Fitting and Evaluation
//!
//! L1-regularized logistic regression, the cross-validated grid search over its
//! inverse regularization strength, classification metrics and the persisted model.

pub mod grid;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod search;

pub use grid::{GridSearch, GridSearchResult, KFold};
pub use logistic::{ClassWeight, FittedLogistic, L1Logistic};
pub use metrics::{ConfusionMatrix, RocCurve, f1_score};
pub use model::{ModelError, PersistedClassifier};
pub use search::{ClassifierSearch, CrossValidation, HeldOutPredictions, L1LogisticSearch, TrainingFit};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Design matrix has {rows} rows but {labels} labels were provided.")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("Cannot fit a model on zero subjects.")]
    EmptyData,

    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),

    #[error("Cannot split {samples} subjects into {folds} folds.")]
    InvalidFolds { folds: usize, samples: usize },

    #[error("Failed to build a worker pool with {threads} threads: {message}")]
    ThreadPool { threads: usize, message: String },
}

/// Runs `op` on a dedicated rayon pool of `n_jobs` threads.
pub(crate) fn install<R, F>(n_jobs: usize, op: F) -> Result<R, FitError>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    let threads = n_jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| FitError::ThreadPool {
            threads,
            message: e.to_string(),
        })?;
    Ok(pool.install(op))
}
