//! Expansion of single-gene features into two-locus interaction features.

use super::SelectionError;
use super::features::{FeatureMatrix, interaction_id};
use ahash::AHashSet;
use itertools::Itertools;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

/// Produces interaction columns from a set of features of a given degree.
pub trait InteractionEncoder {
    /// Returns only the newly generated columns; the inputs are not carried over.
    fn encode(
        &self,
        features: &FeatureMatrix,
        labels: ArrayView1<u8>,
        source_degree: usize,
    ) -> Result<FeatureMatrix, SelectionError>;
}

/// Element-wise products of every unordered pair of degree-1 columns.
///
/// Pairs are enumerated as `(i, j)` with `i < j` in column order and named
/// `"id_i*id_j"`. Products without variance across subjects are dropped, and a
/// product identical to an earlier one keeps only the earlier identifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairwiseEncoder;

impl InteractionEncoder for PairwiseEncoder {
    fn encode(
        &self,
        features: &FeatureMatrix,
        _labels: ArrayView1<u8>,
        source_degree: usize,
    ) -> Result<FeatureMatrix, SelectionError> {
        if source_degree != 1 {
            return Err(SelectionError::UnsupportedDegree(source_degree));
        }
        let n = features.n_subjects();
        let pairs: Vec<(usize, usize)> = (0..features.n_features()).tuple_combinations().collect();

        // Products saturate at the i8 bounds; dosages in 0..=2 never reach them.
        let products: Vec<Vec<i8>> = pairs
            .par_iter()
            .map(|&(i, j)| {
                features
                    .column(i)
                    .iter()
                    .zip(features.column(j))
                    .map(|(&a, &b)| a.saturating_mul(b))
                    .collect()
            })
            .collect();

        let mut seen: AHashSet<&[i8]> = AHashSet::with_capacity(products.len());
        let mut kept: Vec<usize> = Vec::new();
        for (idx, column) in products.iter().enumerate() {
            let constant = column.iter().all_equal();
            if !constant && seen.insert(column.as_slice()) {
                kept.push(idx);
            }
        }

        let ids = features.ids();
        let kept_ids: Vec<String> = kept
            .iter()
            .map(|&idx| {
                let (i, j) = pairs[idx];
                interaction_id(&ids[i], &ids[j])
            })
            .collect();
        let genotype = Array2::from_shape_fn((n, kept.len()), |(row, col)| products[kept[col]][row]);

        log::debug!(
            "Encoded {} of {} feature pairs into interaction columns",
            kept.len(),
            pairs.len()
        );
        FeatureMatrix::new(genotype, kept_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    fn labels(n: usize) -> Array1<u8> {
        Array1::zeros(n)
    }

    #[test]
    fn pairs_are_named_in_column_order() {
        let features = FeatureMatrix::new(
            array![[1, 1, 0], [1, 0, 1], [0, 1, 1], [1, 1, 1]],
            vec!["rs1".into(), "rs2".into(), "rs3".into()],
        )
        .unwrap();
        let encoded = PairwiseEncoder.encode(&features, labels(4).view(), 1).unwrap();
        assert_eq!(
            encoded.ids(),
            &["rs1*rs2".to_string(), "rs1*rs3".to_string(), "rs2*rs3".to_string()]
        );
        assert_eq!(encoded.column(0), array![1i8, 0, 0, 1]);
        assert_eq!(encoded.column(2), array![0i8, 0, 1, 1]);
    }

    #[test]
    fn constant_and_duplicate_products_are_dropped() {
        // rs1*rs2 is all zero; rs1*rs3 and rs3*rs4 are identical.
        let features = FeatureMatrix::new(
            array![[1, 0, 1, 1], [0, 1, 1, 0], [1, 0, 0, 1], [1, 0, 1, 1]],
            vec!["rs1".into(), "rs2".into(), "rs3".into(), "rs4".into()],
        )
        .unwrap();
        let encoded = PairwiseEncoder.encode(&features, labels(4).view(), 1).unwrap();
        assert!(!encoded.ids().contains(&"rs1*rs2".to_string()));
        assert!(encoded.ids().contains(&"rs1*rs3".to_string()));
        assert!(!encoded.ids().contains(&"rs3*rs4".to_string()));
        assert_eq!(encoded.n_features(), encoded.genotype().ncols());
    }

    #[test]
    fn single_feature_yields_no_pairs() {
        let features = FeatureMatrix::new(array![[1], [0]], vec!["rs1".into()]).unwrap();
        let encoded = PairwiseEncoder.encode(&features, labels(2).view(), 1).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(encoded.n_subjects(), 2);
    }

    #[test]
    fn higher_degrees_are_rejected() {
        let features = FeatureMatrix::empty(3);
        assert!(matches!(
            PairwiseEncoder.encode(&features, labels(3).view(), 2),
            Err(SelectionError::UnsupportedDegree(2))
        ));
    }
}
