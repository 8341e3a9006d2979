//! Exhaustive search over the inverse regularization strength with k-fold scoring.

use super::logistic::{ClassWeight, FittedLogistic, L1Logistic};
use super::metrics::f1_score;
use super::{FitError, install};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Contiguous, unshuffled k-fold partition of `0..n_samples`.
///
/// The first `n_samples % n_splits` folds receive one extra sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KFold {
    folds: Vec<Range<usize>>,
    n_samples: usize,
}

impl KFold {
    pub fn new(n_samples: usize, n_splits: usize) -> Result<Self, FitError> {
        if n_splits < 2 || n_splits > n_samples {
            return Err(FitError::InvalidFolds {
                folds: n_splits,
                samples: n_samples,
            });
        }
        let base = n_samples / n_splits;
        let extra = n_samples % n_splits;
        let mut folds = Vec::with_capacity(n_splits);
        let mut start = 0;
        for fold in 0..n_splits {
            let size = base + usize::from(fold < extra);
            folds.push(start..start + size);
            start += size;
        }
        Ok(Self { folds, n_samples })
    }

    pub fn n_splits(&self) -> usize {
        self.folds.len()
    }

    /// `(train, test)` row indices of every fold.
    pub fn splits(&self) -> impl Iterator<Item = (Vec<usize>, Vec<usize>)> + '_ {
        self.folds.iter().map(move |test| {
            let train = (0..self.n_samples).filter(|i| !test.contains(i)).collect();
            (train, test.clone().collect())
        })
    }
}

/// Settings of the C grid search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSearch {
    /// Candidate inverse regularization strengths, in search order.
    pub costs: Vec<f64>,
    /// Folds used to score each candidate.
    pub folds: usize,
    pub class_weight: ClassWeight,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Worker threads for the (candidate × fold) fits.
    pub n_jobs: usize,
}

impl Default for GridSearch {
    fn default() -> Self {
        Self {
            costs: (-8..=7).map(|k| 2f64.powi(k)).collect(),
            folds: 2,
            class_weight: ClassWeight::Balanced,
            max_iterations: 100,
            tolerance: 1e-4,
            n_jobs: 1,
        }
    }
}

/// Mean fold score of one candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CandidateScore {
    pub c: f64,
    pub mean_f1: f64,
}

/// Outcome of a grid search: the scores of every candidate and the winner refit on all rows.
#[derive(Clone, Debug)]
pub struct GridSearchResult {
    pub scores: Vec<CandidateScore>,
    pub best: CandidateScore,
    pub model: FittedLogistic,
}

impl GridSearch {
    fn estimator(&self, c: f64) -> L1Logistic {
        L1Logistic {
            c,
            class_weight: self.class_weight,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }

    /// Scores every candidate by mean F1 over the folds, keeps the first best one and
    /// refits it on all rows.
    pub fn fit(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<GridSearchResult, FitError> {
        if self.costs.is_empty() {
            return Err(FitError::InvalidParameter("the cost grid is empty".into()));
        }
        if x.nrows() != labels.len() {
            return Err(FitError::LengthMismatch {
                rows: x.nrows(),
                labels: labels.len(),
            });
        }
        let kfold = KFold::new(x.nrows(), self.folds)?;
        let splits: Vec<(Vec<usize>, Vec<usize>)> = kfold.splits().collect();

        let tasks: Vec<(usize, usize)> = (0..self.costs.len())
            .flat_map(|ci| (0..splits.len()).map(move |fi| (ci, fi)))
            .collect();

        let fold_scores: Vec<f64> = install(self.n_jobs, || {
            tasks
                .par_iter()
                .map(|&(ci, fi)| {
                    let (train, test) = &splits[fi];
                    let x_train = x.select(Axis(0), train);
                    let y_train = labels.select(Axis(0), train);
                    let model = self.estimator(self.costs[ci]).fit(x_train.view(), y_train.view())?;
                    let predicted = model.predict(x.select(Axis(0), test).view()).to_vec();
                    let target = labels.select(Axis(0), test).to_vec();
                    Ok(f1_score(&target, &predicted))
                })
                .collect::<Result<Vec<_>, FitError>>()
        })??;

        let n_folds = splits.len() as f64;
        let scores: Vec<CandidateScore> = self
            .costs
            .iter()
            .enumerate()
            .map(|(ci, &c)| {
                let sum: f64 = fold_scores[ci * splits.len()..(ci + 1) * splits.len()].iter().sum();
                CandidateScore {
                    c,
                    mean_f1: sum / n_folds,
                }
            })
            .collect();

        let mut best = scores[0];
        for candidate in &scores[1..] {
            if candidate.mean_f1 > best.mean_f1 {
                best = *candidate;
            }
        }
        log::debug!("Grid search selected C = {} (mean F1 {:.4})", best.c, best.mean_f1);

        let model = self.estimator(best.c).fit(x, labels)?;
        Ok(GridSearchResult { scores, best, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn kfold_sizes_follow_remainder_rule() {
        let kfold = KFold::new(10, 3).unwrap();
        let sizes: Vec<usize> = kfold.splits().map(|(_, test)| test.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        let (train, test) = kfold.splits().nth(1).unwrap();
        assert_eq!(test, vec![4, 5, 6]);
        assert_eq!(train, vec![0, 1, 2, 3, 7, 8, 9]);
    }

    #[test]
    fn kfold_rejects_impossible_splits() {
        assert!(KFold::new(5, 1).is_err());
        assert!(KFold::new(2, 3).is_err());
    }

    #[test]
    fn default_grid_spans_powers_of_two() {
        let grid = GridSearch::default();
        assert_eq!(grid.costs.len(), 16);
        assert_eq!(grid.costs[0], 1.0 / 256.0);
        assert_eq!(grid.costs[15], 128.0);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        // Every subject identical: every candidate predicts the same labels.
        let x = Array2::<f64>::zeros((12, 1));
        let y: Array1<u8> = (0..12).map(|i| u8::from(i % 2 == 0)).collect();
        let grid = GridSearch {
            costs: vec![0.5, 1.0, 2.0],
            ..GridSearch::default()
        };
        let result = grid.fit(x.view(), y.view()).unwrap();
        assert_eq!(result.best.c, 0.5);
        assert_eq!(result.scores.len(), 3);
    }

    #[test]
    fn selects_a_cost_that_recovers_the_signal() {
        let n = 80;
        let x: Array2<f64> = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                f64::from(u8::from(i % 4 == 0))
            } else {
                f64::from(u8::from(i % 5 == 0))
            }
        });
        let y: Array1<u8> = (0..n).map(|i| u8::from(i % 4 == 0)).collect();
        let grid = GridSearch {
            n_jobs: 2,
            ..GridSearch::default()
        };
        let result = grid.fit(x.view(), y.view()).unwrap();
        assert_eq!(result.best.mean_f1, 1.0);
        assert!(result.model.coefficients[0] > 0.0);
        assert_eq!(result.model.predict(x.view()), y);
    }
}
