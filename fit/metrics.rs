//! Binary classification metrics over held-out predictions.

/// Counts of a binary confusion matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(target: &[u8], predicted: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&t, &p) in target.iter().zip(predicted) {
            match (t != 0, p != 0) {
                (false, false) => matrix.true_negative += 1,
                (false, true) => matrix.false_positive += 1,
                (true, false) => matrix.false_negative += 1,
                (true, true) => matrix.true_positive += 1,
            }
        }
        matrix
    }

    /// `tn / (tn + fp)`; `NaN` without negatives.
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    /// `tp / (tp + fn)`; `NaN` without positives.
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// Harmonic mean of precision and recall. Zero when it is undefined.
    pub fn f1(&self) -> f64 {
        let denominator = 2 * self.true_positive + self.false_positive + self.false_negative;
        if denominator == 0 {
            0.0
        } else {
            2.0 * self.true_positive as f64 / denominator as f64
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn f1_score(target: &[u8], predicted: &[u8]) -> f64 {
    ConfusionMatrix::from_labels(target, predicted).f1()
}

/// Points of a receiver operating characteristic curve.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RocCurve {
    pub false_positive_rate: Vec<f64>,
    pub true_positive_rate: Vec<f64>,
}

impl RocCurve {
    /// One point per distinct score, from the highest threshold down, starting at (0, 0).
    pub fn compute(target: &[u8], scores: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..scores.len().min(target.len())).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let positives = order.iter().filter(|&&i| target[i] != 0).count() as f64;
        let negatives = order.len() as f64 - positives;

        let mut curve = Self {
            false_positive_rate: vec![0.0],
            true_positive_rate: vec![0.0],
        };
        let mut tp = 0.0;
        let mut fp = 0.0;
        for (rank, &i) in order.iter().enumerate() {
            if target[i] != 0 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            let is_last_of_tie = order
                .get(rank + 1)
                .is_none_or(|&next| scores[next] != scores[i]);
            if is_last_of_tie {
                curve.false_positive_rate.push(fp / negatives);
                curve.true_positive_rate.push(tp / positives);
            }
        }
        curve
    }

    /// Trapezoidal area under the curve.
    pub fn auc(&self) -> f64 {
        self.false_positive_rate
            .windows(2)
            .zip(self.true_positive_rate.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn confusion_matrix_counts_and_rates() {
        let target = [1, 1, 1, 0, 0, 0, 0, 1];
        let predicted = [1, 0, 1, 0, 1, 0, 0, 1];
        let matrix = ConfusionMatrix::from_labels(&target, &predicted);
        assert_eq!(
            matrix,
            ConfusionMatrix {
                true_negative: 3,
                false_positive: 1,
                false_negative: 1,
                true_positive: 3,
            }
        );
        assert_abs_diff_eq!(matrix.specificity(), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.sensitivity(), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.f1(), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn f1_without_positive_predictions_is_zero() {
        assert_eq!(f1_score(&[1, 0, 1], &[0, 0, 0]), 0.0);
        assert_eq!(f1_score(&[0, 0], &[0, 0]), 0.0);
        assert!(ConfusionMatrix::from_labels(&[0, 0], &[0, 0]).sensitivity().is_nan());
    }

    #[test]
    fn roc_auc_matches_reference_example() {
        let target = [0, 0, 1, 1];
        let scores = [0.1, 0.4, 0.35, 0.8];
        let roc = RocCurve::compute(&target, &scores);
        assert_abs_diff_eq!(roc.auc(), 0.75, epsilon = 1e-12);
        assert_eq!(roc.false_positive_rate.first(), Some(&0.0));
        assert_eq!(roc.true_positive_rate.last(), Some(&1.0));
    }

    #[test]
    fn tied_scores_form_a_single_step() {
        let target = [1, 0, 1, 0];
        let scores = [0.5, 0.5, 0.5, 0.5];
        let roc = RocCurve::compute(&target, &scores);
        assert_eq!(roc.false_positive_rate, vec![0.0, 1.0]);
        assert_eq!(roc.true_positive_rate, vec![0.0, 1.0]);
        assert_abs_diff_eq!(roc.auc(), 0.5, epsilon = 1e-12);
    }
}
