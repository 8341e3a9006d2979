//! # Feature Selection
//!
//! The statistical filter chain that narrows the genotype matrix from every
//! single-gene feature down to the cross-gene interactions worth modelling.

pub mod encoder;
pub mod features;
pub mod screen;
pub mod stability;
pub mod stats;

pub use encoder::{InteractionEncoder, PairwiseEncoder};
pub use features::{FeatureMatrix, SelectionMask};
pub use stability::{RandomizedLogistic, StabilitySelector};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Selection mask has {found} entries, but {expected} features are present.")]
    MaskLength { expected: usize, found: usize },

    #[error("Genotype matrix has {columns} columns, but {identifiers} identifiers were provided.")]
    Misaligned { columns: usize, identifiers: usize },

    #[error("Subject counts differ: {left} versus {right}.")]
    SubjectMismatch { left: usize, right: usize },

    #[error("Interaction encoder cannot expand features of degree {0}.")]
    UnsupportedDegree(usize),

    #[error("Matrix shape error: {0}")]
    Shape(String),

    #[error("Statistical test failed: {0}")]
    Statistics(String),

    #[error("Stability selection fit failed: {0}")]
    Fit(#[from] crate::fit::FitError),
}
