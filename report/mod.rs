//! # Result Reporting
//!
//! Per-feature statistics of the surviving features, the run summary, the output
//! tables and the diagnostic plots.

pub mod assembly;
pub mod curve_fit;
pub mod output;
pub mod plots;

pub use assembly::{FeatureStatistic, GeneAnnotation, RunSummary, assemble};

use crate::select::SelectionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write output file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to write CSV output: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Failed to draw plot: {0}")]
    Plot(String),
    #[error("Curve fit failed: {0}")]
    CurveFit(String),
    #[error("Feature '{0}' is not mapped to any gene.")]
    UnknownFeature(String),
    #[error("Statistics of the final features could not be computed: {0}")]
    Selection(#[from] SelectionError),
}
