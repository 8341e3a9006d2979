//! Stability selection by randomized L1 logistic regression.

use super::SelectionError;
use crate::config::StabilityConfig;
use crate::fit::install;
use crate::fit::logistic::{ClassWeight, L1Logistic};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::index};
use rayon::prelude::*;

/// Estimates how often each feature is selected under random perturbation.
pub trait StabilitySelector {
    /// Selection frequency in `[0, 1]` for every column of `x`.
    fn selection_frequency(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<Array1<f64>, SelectionError>;
}

/// Randomized logistic regression.
///
/// Every resample draws `floor(sample_fraction * n)` subjects without replacement,
/// multiplies each feature by `1 - scaling * Bernoulli(0.5)` and fits an unweighted
/// L1 logistic model. A feature is selected by a resample when its coefficient is
/// non-zero. Resample `r` draws from a generator seeded with `seed + r`, so the
/// frequencies do not depend on the number of worker threads.
#[derive(Clone, Debug)]
pub struct RandomizedLogistic {
    pub config: StabilityConfig,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub n_jobs: usize,
}

impl RandomizedLogistic {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            max_iterations: 100,
            tolerance: 1e-4,
            n_jobs: 1,
        }
    }

    fn resample(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>, round: u64) -> Result<Vec<bool>, SelectionError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(round));
        let n = x.nrows();
        let size = ((self.config.sample_fraction * n as f64).floor() as usize).clamp(1, n);
        let mut rows = index::sample(&mut rng, n, size).into_vec();
        rows.sort_unstable();

        let weights: Array1<f64> = (0..x.ncols())
            .map(|_| 1.0 - self.config.scaling * f64::from(u8::from(rng.gen_bool(0.5))))
            .collect();
        let x_sub = x.select(Axis(0), &rows) * &weights;
        let y_sub = labels.select(Axis(0), &rows);

        let model = L1Logistic {
            c: self.config.c,
            class_weight: ClassWeight::Uniform,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
        .fit(x_sub.view(), y_sub.view())?;
        Ok(model.coefficients.iter().map(|&w| w != 0.0).collect())
    }
}

impl StabilitySelector for RandomizedLogistic {
    fn selection_frequency(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<Array1<f64>, SelectionError> {
        if x.nrows() != labels.len() {
            return Err(SelectionError::SubjectMismatch {
                left: x.nrows(),
                right: labels.len(),
            });
        }
        if self.config.n_resampling == 0 || !(self.config.sample_fraction > 0.0 && self.config.sample_fraction <= 1.0) {
            return Err(SelectionError::Statistics(format!(
                "invalid stability settings: {} resamples with sample fraction {}",
                self.config.n_resampling, self.config.sample_fraction
            )));
        }
        if x.nrows() == 0 {
            return Ok(Array1::zeros(x.ncols()));
        }

        let selections = install(self.n_jobs, || {
            (0..self.config.n_resampling as u64)
                .into_par_iter()
                .map(|round| self.resample(x, labels, round))
                .collect::<Result<Vec<_>, SelectionError>>()
        })??;

        let mut counts = Array1::<f64>::zeros(x.ncols());
        for selected in &selections {
            for (count, &hit) in counts.iter_mut().zip(selected) {
                if hit {
                    *count += 1.0;
                }
            }
        }
        Ok(counts / self.config.n_resampling as f64)
    }
}
