//! The column filters of the selection chain.
//!
//! Every filter takes a `FeatureMatrix` and returns a narrowed one built through a
//! `SelectionMask`, together with any per-feature vector it computed, re-sliced by
//! the same mask. An empty result means no feature survived the filter; deciding
//! what to do about that is left to the caller.

use super::SelectionError;
use super::encoder::InteractionEncoder;
use super::features::{FeatureMatrix, SelectionMask};
use super::stability::StabilitySelector;
use super::stats::chi_square_scores;
use ahash::AHashSet;
use ndarray::{Array1, ArrayView1};

/// Features that survived a scoring filter and their scores.
#[derive(Clone, Debug)]
pub struct Screened {
    pub features: FeatureMatrix,
    pub scores: Array1<f64>,
}

/// Keeps the features whose chi-square `-log10(p)` is strictly above `threshold`.
pub fn chi_square_screen(
    features: &FeatureMatrix,
    labels: ArrayView1<u8>,
    threshold: f64,
) -> Result<Screened, SelectionError> {
    let scores = chi_square_scores(features.genotype(), labels)?;
    let mask = SelectionMask::from_values(scores.iter(), |&s| s > threshold);
    let (features, mut aux) = features.select_with(&mask, &[scores.view()])?;
    log::info!(
        "Chi-square screen kept {} of {} features",
        features.n_features(),
        mask.len()
    );
    Ok(Screened {
        features,
        scores: aux.remove(0),
    })
}

/// Single-gene features and already-composite features, each in their original order.
#[derive(Clone, Debug)]
pub struct DegreeSplit {
    pub single: FeatureMatrix,
    pub composite: FeatureMatrix,
}

pub fn split_by_degree(features: &FeatureMatrix) -> Result<DegreeSplit, SelectionError> {
    let single_mask = features.degree_mask(1);
    Ok(DegreeSplit {
        single: features.select(&single_mask)?,
        composite: features.select(&single_mask.inverted())?,
    })
}

/// Collapses columns with identical values across all subjects to their first occurrence.
pub fn remove_redundant(features: &FeatureMatrix) -> Result<FeatureMatrix, SelectionError> {
    let columns: Vec<Vec<i8>> = features
        .genotype()
        .columns()
        .into_iter()
        .map(|col| col.to_vec())
        .collect();
    let mut seen: AHashSet<&[i8]> = AHashSet::with_capacity(columns.len());
    let mask = SelectionMask::from_values(columns.iter(), |col| seen.insert(col.as_slice()));
    let unique = features.select(&mask)?;
    if unique.n_features() < features.n_features() {
        log::debug!(
            "Removed {} redundant columns",
            features.n_features() - unique.n_features()
        );
    }
    Ok(unique)
}

/// Replaces the single-gene features by their pairwise interactions.
///
/// The result is the composite columns followed by the encoder's new columns. Raw
/// single-gene columns are not carried forward.
pub fn expand_interactions(
    split: DegreeSplit,
    encoder: &impl InteractionEncoder,
    labels: ArrayView1<u8>,
) -> Result<FeatureMatrix, SelectionError> {
    if split.single.is_empty() {
        return Ok(split.composite);
    }
    let interactions = encoder.encode(&split.single, labels, 1)?;
    log::info!(
        "Generated {} interaction features from {} single-gene features",
        interactions.n_features(),
        split.single.n_features()
    );
    split.composite.concat(interactions)
}

/// Keeps the features selected at least `threshold` of the time.
pub fn stability_screen(
    features: &FeatureMatrix,
    selector: &impl StabilitySelector,
    labels: ArrayView1<u8>,
    threshold: f64,
) -> Result<Screened, SelectionError> {
    if features.is_empty() {
        return Ok(Screened {
            features: features.clone(),
            scores: Array1::zeros(0),
        });
    }
    let frequency = selector.selection_frequency(features.to_design().view(), labels)?;
    if frequency.len() != features.n_features() {
        return Err(SelectionError::MaskLength {
            expected: features.n_features(),
            found: frequency.len(),
        });
    }
    let mask = SelectionMask::from_values(frequency.iter(), |&f| f >= threshold);
    let (features, mut aux) = features.select_with(&mask, &[frequency.view()])?;
    log::info!(
        "Stability selection kept {} of {} features",
        features.n_features(),
        mask.len()
    );
    Ok(Screened {
        features,
        scores: aux.remove(0),
    })
}

/// Drops the features whose fitted weight is exactly zero.
pub fn weight_screen(features: &FeatureMatrix, weights: ArrayView1<f64>) -> Result<Screened, SelectionError> {
    let mask = SelectionMask::from_values(weights.iter(), |&w| w != 0.0);
    if mask.len() != features.n_features() {
        return Err(SelectionError::MaskLength {
            expected: features.n_features(),
            found: mask.len(),
        });
    }
    let (features, mut aux) = features.select_with(&mask, &[weights])?;
    Ok(Screened {
        features,
        scores: aux.remove(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::encoder::PairwiseEncoder;
    use ndarray::{Array1, Array2, ArrayView2};

    fn labels() -> Array1<u8> {
        (0..20).map(|i| u8::from(i < 10)).collect()
    }

    /// rs1 = label, rs2 = alternating noise, rs3*rs4 = label, rs5 = duplicate of rs1.
    fn features() -> FeatureMatrix {
        let y = labels();
        let mut genotype = Array2::<i8>::zeros((20, 4));
        for i in 0..20 {
            genotype[[i, 0]] = y[i] as i8;
            genotype[[i, 1]] = (i % 2) as i8;
            genotype[[i, 2]] = y[i] as i8;
            genotype[[i, 3]] = y[i] as i8;
        }
        FeatureMatrix::new(
            genotype,
            vec!["rs1".into(), "rs2".into(), "rs3*rs4".into(), "rs5".into()],
        )
        .unwrap()
    }

    /// Identifies every column by its content to detect silent permutations.
    fn assert_columns_follow_ids(before: &FeatureMatrix, after: &FeatureMatrix) {
        assert_eq!(after.ids().len(), after.genotype().ncols());
        for (j, id) in after.ids().iter().enumerate() {
            let source = before.ids().iter().position(|b| b == id).unwrap();
            assert_eq!(after.column(j), before.column(source));
        }
    }

    #[test]
    fn chi_square_screen_keeps_associated_columns_aligned() {
        let input = features();
        let screened = chi_square_screen(&input, labels().view(), 5.0).unwrap();
        assert_eq!(
            screened.features.ids(),
            &["rs1".to_string(), "rs3*rs4".to_string(), "rs5".to_string()]
        );
        assert_eq!(screened.scores.len(), 3);
        assert!(screened.scores.iter().all(|&s| s > 5.0));
        assert_columns_follow_ids(&input, &screened.features);
    }

    #[test]
    fn degree_split_partitions_by_identifier() {
        let split = split_by_degree(&features()).unwrap();
        assert_eq!(split.single.ids(), &["rs1".to_string(), "rs2".to_string(), "rs5".to_string()]);
        assert_eq!(split.composite.ids(), &["rs3*rs4".to_string()]);
    }

    #[test]
    fn redundancy_removal_keeps_first_occurrence_and_is_idempotent() {
        let input = features();
        let once = remove_redundant(&input).unwrap();
        assert_eq!(once.ids(), &["rs1".to_string(), "rs2".to_string()]);
        let twice = remove_redundant(&once).unwrap();
        assert_eq!(once, twice);
        assert_columns_follow_ids(&input, &once);
    }

    #[test]
    fn expansion_drops_raw_single_gene_columns() {
        let split = split_by_degree(&features()).unwrap();
        let single = remove_redundant(&split.single).unwrap();
        let expanded = expand_interactions(
            DegreeSplit {
                single,
                composite: split.composite,
            },
            &PairwiseEncoder,
            labels().view(),
        )
        .unwrap();
        assert_eq!(expanded.ids(), &["rs3*rs4".to_string(), "rs1*rs2".to_string()]);
        assert!(expanded.ids().iter().all(|id| id.contains('*')));
    }

    #[test]
    fn expansion_without_single_features_keeps_composites() {
        let input = features();
        let composite = input.select(&input.degree_mask(1).inverted()).unwrap();
        let expanded = expand_interactions(
            DegreeSplit {
                single: FeatureMatrix::empty(20),
                composite: composite.clone(),
            },
            &PairwiseEncoder,
            labels().view(),
        )
        .unwrap();
        assert_eq!(expanded, composite);
    }

    struct FixedFrequency(Vec<f64>);

    impl StabilitySelector for FixedFrequency {
        fn selection_frequency(&self, _x: ArrayView2<f64>, _labels: ArrayView1<u8>) -> Result<Array1<f64>, SelectionError> {
            Ok(Array1::from_vec(self.0.clone()))
        }
    }

    #[test]
    fn stability_threshold_is_inclusive() {
        let input = features();
        let screened = stability_screen(
            &input,
            &FixedFrequency(vec![0.25, 0.2, 0.9, 0.0]),
            labels().view(),
            0.25,
        )
        .unwrap();
        assert_eq!(screened.features.ids(), &["rs1".to_string(), "rs3*rs4".to_string()]);
        assert_eq!(screened.scores.to_vec(), vec![0.25, 0.9]);
        assert_columns_follow_ids(&input, &screened.features);
    }

    #[test]
    fn weight_screen_drops_exact_zeros_only() {
        let input = features();
        let weights = ndarray::array![0.0, -1e-12, 2.0, 0.0];
        let screened = weight_screen(&input, weights.view()).unwrap();
        assert_eq!(screened.features.ids(), &["rs2".to_string(), "rs3*rs4".to_string()]);
        assert_eq!(screened.scores.to_vec(), vec![-1e-12, 2.0]);

        let short = ndarray::array![1.0];
        assert!(weight_screen(&input, short.view()).is_err());
    }
}
