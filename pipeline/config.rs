//! Run settings, loadable from TOML and overridable from the command line.

use crate::fit::grid::GridSearch;
use crate::fit::logistic::ClassWeight;
use crate::fit::search::L1LogisticSearch;
use crate::select::stability::RandomizedLogistic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of the randomized logistic stability selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub n_resampling: usize,
    /// Fraction of subjects drawn, without replacement, for every resample.
    pub sample_fraction: f64,
    /// Features are multiplied by `1 - scaling` with probability one half.
    pub scaling: f64,
    pub c: f64,
    pub seed: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            n_resampling: 200,
            sample_fraction: 0.75,
            scaling: 0.5,
            c: 1.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Outer folds of the cross-validated fit.
    pub k_fold: usize,
    pub n_jobs: usize,
    /// Minimum chi-square `-log10(p)`, exclusive.
    pub chi_square_threshold: f64,
    /// Minimum selection frequency, inclusive.
    pub stability_threshold: f64,
    pub shuffle_seed: u64,
    /// The grid searches `C = 2^k` for every `k` listed here, in order.
    pub cost_exponents: Vec<i32>,
    /// Folds of the grid search used to pick `C`.
    pub inner_folds: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Prefix of the plot file names.
    pub method_label: String,
    /// Suffix of the plot file names.
    pub plot_label: String,
    pub stability: StabilityConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k_fold: 2,
            n_jobs: 1,
            chi_square_threshold: 5.0,
            stability_threshold: 0.25,
            shuffle_seed: 0,
            cost_exponents: (-8..=7).collect(),
            inner_folds: 2,
            max_iterations: 100,
            tolerance: 1e-4,
            method_label: "GenEpi".to_string(),
            plot_label: "CV".to_string(),
            stability: StabilityConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads settings from a TOML file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k_fold < 2 {
            return Err(ConfigError::Invalid(format!("k_fold must be at least 2, got {}", self.k_fold)));
        }
        if self.inner_folds < 2 {
            return Err(ConfigError::Invalid(format!(
                "inner_folds must be at least 2, got {}",
                self.inner_folds
            )));
        }
        if self.cost_exponents.is_empty() {
            return Err(ConfigError::Invalid("cost_exponents must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.stability_threshold) {
            return Err(ConfigError::Invalid(format!(
                "stability_threshold must lie in [0, 1], got {}",
                self.stability_threshold
            )));
        }
        let stability = &self.stability;
        if stability.n_resampling == 0 {
            return Err(ConfigError::Invalid("stability.n_resampling must be positive".into()));
        }
        if !(stability.sample_fraction > 0.0 && stability.sample_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "stability.sample_fraction must lie in (0, 1], got {}",
                stability.sample_fraction
            )));
        }
        if !(0.0..1.0).contains(&stability.scaling) {
            return Err(ConfigError::Invalid(format!(
                "stability.scaling must lie in [0, 1), got {}",
                stability.scaling
            )));
        }
        if !(stability.c > 0.0 && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid(
                "stability.c and tolerance must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn grid_search(&self) -> GridSearch {
        GridSearch {
            costs: self.cost_exponents.iter().map(|&k| 2f64.powi(k)).collect(),
            folds: self.inner_folds,
            class_weight: ClassWeight::Balanced,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            n_jobs: self.n_jobs,
        }
    }

    pub fn classifier_search(&self) -> L1LogisticSearch {
        L1LogisticSearch::new(self.grid_search(), self.shuffle_seed)
    }

    pub fn stability_selector(&self) -> RandomizedLogistic {
        RandomizedLogistic {
            config: self.stability.clone(),
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            n_jobs: self.n_jobs,
        }
    }
}
