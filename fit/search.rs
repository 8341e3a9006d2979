//! Cross-validated and in-sample classifier fits over a shuffled design.
//!
//! Both fits permute the rows with the same seeded generator before any split is made,
//! so the grid-search folds are identical across runs on the same input.

use super::FitError;
use super::grid::{GridSearch, KFold};
use super::logistic::FittedLogistic;
use super::metrics::f1_score;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Held-out predictions of every subject, aggregated over the outer folds.
///
/// Entries follow the shuffled row order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeldOutPredictions {
    pub target: Vec<u8>,
    pub predicted: Vec<u8>,
    /// Probability of the positive class.
    pub probability: Vec<f64>,
}

impl HeldOutPredictions {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn f1(&self) -> f64 {
        f1_score(&self.target, &self.predicted)
    }
}

#[derive(Clone, Debug)]
pub struct CrossValidation {
    /// F1 of the aggregated held-out predictions.
    pub f1: f64,
    /// Coefficients of the grid-search winner refit on every row.
    pub coefficients: Array1<f64>,
    pub predictions: HeldOutPredictions,
    pub best_c: f64,
}

#[derive(Clone, Debug)]
pub struct TrainingFit {
    /// In-sample F1 of the grid-search winner.
    pub f1: f64,
    pub model: FittedLogistic,
}

/// The classifier fits the pipeline needs once the features are fixed.
pub trait ClassifierSearch {
    /// Outer k-fold evaluation of the hyperparameter search.
    fn cross_validate(
        &self,
        x: ArrayView2<f64>,
        labels: ArrayView1<u8>,
        folds: usize,
    ) -> Result<CrossValidation, FitError>;

    /// Hyperparameter search on every row, scored on the same rows.
    fn fit_training(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<TrainingFit, FitError>;
}

/// L1 logistic regression tuned by `GridSearch` on a seeded row permutation.
#[derive(Clone, Debug, Default)]
pub struct L1LogisticSearch {
    pub grid: GridSearch,
    pub shuffle_seed: u64,
}

impl L1LogisticSearch {
    pub fn new(grid: GridSearch, shuffle_seed: u64) -> Self {
        Self { grid, shuffle_seed }
    }

    fn shuffled(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<(Array2<f64>, Array1<u8>), FitError> {
        if x.nrows() != labels.len() {
            return Err(FitError::LengthMismatch {
                rows: x.nrows(),
                labels: labels.len(),
            });
        }
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.shuffle_seed);
        order.shuffle(&mut rng);
        Ok((x.select(Axis(0), &order), labels.select(Axis(0), &order)))
    }
}

impl ClassifierSearch for L1LogisticSearch {
    fn cross_validate(
        &self,
        x: ArrayView2<f64>,
        labels: ArrayView1<u8>,
        folds: usize,
    ) -> Result<CrossValidation, FitError> {
        let (x, labels) = self.shuffled(x, labels)?;
        let kfold = KFold::new(x.nrows(), folds)?;

        let mut predictions = HeldOutPredictions::default();
        for (fold, (train, test)) in kfold.splits().enumerate() {
            let result = self.grid.fit(
                x.select(Axis(0), &train).view(),
                labels.select(Axis(0), &train).view(),
            )?;
            let x_test = x.select(Axis(0), &test);
            log::debug!(
                "Outer fold {}: C = {}, {} non-zero coefficients",
                fold + 1,
                result.best.c,
                result.model.n_nonzero()
            );
            predictions.target.extend(test.iter().map(|&i| labels[i]));
            predictions.predicted.extend(result.model.predict(x_test.view()));
            predictions.probability.extend(result.model.predict_proba(x_test.view()));
        }

        let refit = self.grid.fit(x.view(), labels.view())?;
        Ok(CrossValidation {
            f1: predictions.f1(),
            coefficients: refit.model.coefficients,
            predictions,
            best_c: refit.best.c,
        })
    }

    fn fit_training(&self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<TrainingFit, FitError> {
        let (x, labels) = self.shuffled(x, labels)?;
        let result = self.grid.fit(x.view(), labels.view())?;
        let predicted = result.model.predict(x.view()).to_vec();
        let f1 = f1_score(&labels.to_vec(), &predicted);
        Ok(TrainingFit {
            f1,
            model: result.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Array2<f64>, Array1<u8>) {
        let y: Array1<u8> = (0..n).map(|i| u8::from(i % 3 == 0)).collect();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 { f64::from(y[i]) } else { f64::from(u8::from(i % 2 == 0)) }
        });
        (x, y)
    }

    #[test]
    fn held_out_predictions_cover_every_subject() {
        let (x, y) = separable(60);
        let search = L1LogisticSearch::default();
        let cv = search.cross_validate(x.view(), y.view(), 3).unwrap();
        assert_eq!(cv.predictions.len(), 60);
        assert_eq!(cv.predictions.probability.len(), 60);
        assert_eq!(cv.coefficients.len(), 2);

        let mut target = cv.predictions.target.clone();
        target.sort_unstable();
        let mut expected = y.to_vec();
        expected.sort_unstable();
        assert_eq!(target, expected);
        assert_eq!(cv.f1, 1.0);
        assert!(cv.coefficients[0] > 0.0);
    }

    #[test]
    fn same_seed_reproduces_the_fit() {
        let (x, y) = separable(48);
        let search = L1LogisticSearch::new(GridSearch::default(), 7);
        let first = search.cross_validate(x.view(), y.view(), 2).unwrap();
        let second = search.cross_validate(x.view(), y.view(), 2).unwrap();
        assert_eq!(first.predictions, second.predictions);
        assert_eq!(first.coefficients, second.coefficients);
        assert_eq!(first.f1, second.f1);
    }

    #[test]
    fn training_fit_scores_in_sample() {
        let (x, y) = separable(40);
        let fit = L1LogisticSearch::default().fit_training(x.view(), y.view()).unwrap();
        assert_eq!(fit.f1, 1.0);
        assert_eq!(fit.model.predict(x.view()), y);
    }

    #[test]
    fn too_many_folds_is_an_error() {
        let (x, y) = separable(3);
        assert!(matches!(
            L1LogisticSearch::default().cross_validate(x.view(), y.view(), 5),
            Err(FitError::InvalidFolds { folds: 5, samples: 3 })
        ));
    }
}
