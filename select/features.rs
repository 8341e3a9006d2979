//! # Aligned Feature Storage
//!
//! Every filter in the selection chain narrows the genotype matrix by columns. The
//! identifiers of those columns, and any per-feature statistic computed along the
//! way, must be narrowed with exactly the same selection or the output silently
//! attributes weights to the wrong variants.
//!
//! `FeatureMatrix` owns the matrix and its identifiers together and can only be
//! narrowed through a `SelectionMask`, which re-slices both (and any auxiliary
//! vectors handed to it) in one operation.

use super::SelectionError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate};

/// Separator joining single-gene identifiers into an interaction identifier.
pub const INTERACTION_DELIMITER: char = '*';

/// Number of single-gene features combined into `id`.
pub fn degree(id: &str) -> usize {
    id.matches(INTERACTION_DELIMITER).count() + 1
}

/// Joins two identifiers into the canonical interaction identifier `left*right`.
pub fn interaction_id(left: &str, right: &str) -> String {
    let mut id = String::with_capacity(left.len() + right.len() + 1);
    id.push_str(left);
    id.push(INTERACTION_DELIMITER);
    id.push_str(right);
    id
}

/// A boolean keep/drop decision for every column of a `FeatureMatrix`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionMask {
    keep: Vec<bool>,
}

impl SelectionMask {
    pub fn new(keep: Vec<bool>) -> Self {
        Self { keep }
    }

    /// Builds a mask by applying `predicate` to each per-feature value.
    pub fn from_values<T>(values: impl IntoIterator<Item = T>, predicate: impl FnMut(T) -> bool) -> Self {
        Self {
            keep: values.into_iter().map(predicate).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keep.is_empty()
    }

    pub fn kept(&self) -> usize {
        self.keep.iter().filter(|&&k| k).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.keep
    }

    /// Column indices retained by this mask, in their original order.
    pub fn indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter_map(|(idx, &k)| k.then_some(idx))
            .collect()
    }

    /// The complementary selection.
    pub fn inverted(&self) -> Self {
        Self {
            keep: self.keep.iter().map(|k| !k).collect(),
        }
    }

    /// Re-slices an auxiliary per-feature vector with this mask.
    pub fn apply<T: Clone>(&self, values: ArrayView1<T>) -> Result<Array1<T>, SelectionError> {
        if values.len() != self.keep.len() {
            return Err(SelectionError::MaskLength {
                expected: self.keep.len(),
                found: values.len(),
            });
        }
        Ok(values
            .iter()
            .zip(&self.keep)
            .filter_map(|(v, &k)| k.then(|| v.clone()))
            .collect())
    }
}

/// A genotype matrix (subjects × features) together with one identifier per column.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    genotype: Array2<i8>,
    ids: Vec<String>,
}

impl FeatureMatrix {
    pub fn new(genotype: Array2<i8>, ids: Vec<String>) -> Result<Self, SelectionError> {
        if genotype.ncols() != ids.len() {
            return Err(SelectionError::Misaligned {
                columns: genotype.ncols(),
                identifiers: ids.len(),
            });
        }
        Ok(Self { genotype, ids })
    }

    /// An empty feature set for `n_subjects` subjects.
    pub fn empty(n_subjects: usize) -> Self {
        Self {
            genotype: Array2::zeros((n_subjects, 0)),
            ids: Vec::new(),
        }
    }

    pub fn n_subjects(&self) -> usize {
        self.genotype.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn genotype(&self) -> ArrayView2<'_, i8> {
        self.genotype.view()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn column(&self, idx: usize) -> ArrayView1<'_, i8> {
        self.genotype.column(idx)
    }

    /// Dense `f64` copy of the matrix for the model fitting routines.
    pub fn to_design(&self) -> Array2<f64> {
        self.genotype.mapv(f64::from)
    }

    /// Keeps the columns selected by `mask`, together with their identifiers.
    pub fn select(&self, mask: &SelectionMask) -> Result<Self, SelectionError> {
        if mask.len() != self.n_features() {
            return Err(SelectionError::MaskLength {
                expected: self.n_features(),
                found: mask.len(),
            });
        }
        let indices = mask.indices();
        let genotype = self.genotype.select(Axis(1), &indices);
        let ids = indices.iter().map(|&idx| self.ids[idx].clone()).collect();
        Ok(Self { genotype, ids })
    }

    /// Keeps the columns selected by `mask` and re-slices every auxiliary vector
    /// with the same mask.
    pub fn select_with(
        &self,
        mask: &SelectionMask,
        aux: &[ArrayView1<f64>],
    ) -> Result<(Self, Vec<Array1<f64>>), SelectionError> {
        let aux = aux
            .iter()
            .map(|values| mask.apply(*values))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.select(mask)?, aux))
    }

    /// Appends the columns of `other` after the columns of `self`.
    pub fn concat(self, other: Self) -> Result<Self, SelectionError> {
        if self.n_subjects() != other.n_subjects() {
            return Err(SelectionError::SubjectMismatch {
                left: self.n_subjects(),
                right: other.n_subjects(),
            });
        }
        let genotype = concatenate(Axis(1), &[self.genotype.view(), other.genotype.view()])
            .map_err(|e| SelectionError::Shape(e.to_string()))?;
        let mut ids = self.ids;
        ids.extend(other.ids);
        Self::new(genotype, ids)
    }

    /// Mask selecting features of exactly `target` degree.
    pub fn degree_mask(&self, target: usize) -> SelectionMask {
        SelectionMask::from_values(self.ids.iter(), |id| degree(id) == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> FeatureMatrix {
        FeatureMatrix::new(
            array![[0, 1, 2], [1, 1, 0], [0, 0, 1], [1, 0, 1]],
            vec!["rs1".into(), "rs2*rs3".into(), "rs4".into()],
        )
        .unwrap()
    }

    #[test]
    fn degree_counts_delimiters() {
        assert_eq!(degree("rs1"), 1);
        assert_eq!(degree("rs1*rs2"), 2);
        assert_eq!(degree("rs1*rs2*rs3"), 3);
        assert_eq!(interaction_id("rs1", "rs2"), "rs1*rs2");
    }

    #[test]
    fn construction_rejects_misaligned_ids() {
        let err = FeatureMatrix::new(Array2::zeros((3, 2)), vec!["a".into()]).unwrap_err();
        assert!(matches!(
            err,
            SelectionError::Misaligned {
                columns: 2,
                identifiers: 1
            }
        ));
    }

    #[test]
    fn select_keeps_ids_with_their_columns() {
        let features = sample();
        let mask = SelectionMask::new(vec![true, false, true]);
        let weights = array![0.5, -1.0, 2.0];
        let (narrowed, aux) = features.select_with(&mask, &[weights.view()]).unwrap();

        assert_eq!(narrowed.ids(), &["rs1".to_string(), "rs4".to_string()]);
        assert_eq!(narrowed.n_features(), narrowed.genotype().ncols());
        assert_eq!(narrowed.column(0), features.column(0));
        assert_eq!(narrowed.column(1), features.column(2));
        assert_eq!(aux[0], array![0.5, 2.0]);
    }

    #[test]
    fn mask_length_is_checked() {
        let features = sample();
        let mask = SelectionMask::new(vec![true, false]);
        assert!(matches!(
            features.select(&mask),
            Err(SelectionError::MaskLength {
                expected: 3,
                found: 2
            })
        ));
        assert!(mask.apply(array![1.0, 2.0, 3.0].view()).is_err());
    }

    #[test]
    fn degree_mask_and_inversion_partition_columns() {
        let features = sample();
        let single = features.degree_mask(1);
        assert_eq!(single.indices(), vec![0, 2]);
        assert_eq!(single.inverted().indices(), vec![1]);
        assert_eq!(single.kept() + single.inverted().kept(), features.n_features());
    }

    #[test]
    fn concat_appends_columns_in_order() {
        let features = sample();
        let left = features.select(&SelectionMask::new(vec![false, true, false])).unwrap();
        let right = features.select(&SelectionMask::new(vec![true, false, false])).unwrap();
        let joined = left.concat(right).unwrap();
        assert_eq!(joined.ids(), &["rs2*rs3".to_string(), "rs1".to_string()]);
        assert_eq!(joined.column(1), features.column(0));

        let short = FeatureMatrix::empty(2);
        assert!(matches!(
            features.concat(short),
            Err(SelectionError::SubjectMismatch { left: 4, right: 2 })
        ));
    }
}
