//! Association statistics between one genotype column and the binary phenotype.

use super::SelectionError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF, Discrete, Hypergeometric};
use std::collections::BTreeMap;

/// Relative tolerance used when collecting tables "at least as extreme" as the observed one.
const FISHER_RELATIVE_TOLERANCE: f64 = 1.0 + 1e-7;

/// 2×2 genotype-by-phenotype counts.
///
/// Subjects are first counted into `[genotype][phenotype]` and the table is then rotated
/// by 180°, so the stored layout is:
///
/// ```text
///                 case (1)   control (0)
/// carrier (1)     [0][0]     [0][1]
/// non-carrier (0) [1][0]     [1][1]
/// ```
///
/// The odds ratio and the two-sided exact p-value do not depend on this rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContingencyTable {
    pub cells: [[u64; 2]; 2],
}

impl ContingencyTable {
    /// Counts a genotype column against binary labels. Any non-zero dosage counts as a carrier.
    pub fn from_column(genotype: ArrayView1<i8>, labels: ArrayView1<u8>) -> Self {
        let mut counts = [[0u64; 2]; 2];
        for (&g, &y) in genotype.iter().zip(labels.iter()) {
            let row = usize::from(g != 0);
            let col = usize::from(y != 0);
            counts[row][col] += 1;
        }
        Self {
            cells: [
                [counts[1][1], counts[1][0]],
                [counts[0][1], counts[0][0]],
            ],
        }
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    /// Sample odds ratio `(a*d)/(b*c)`.
    ///
    /// Follows the usual exact-test convention for degenerate tables: an empty row or
    /// column margin gives `NaN`, and a zero in `b` or `c` otherwise gives infinity.
    pub fn odds_ratio(&self) -> f64 {
        let [[a, b], [c, d]] = self.cells;
        if a + b == 0 || c + d == 0 || a + c == 0 || b + d == 0 {
            return f64::NAN;
        }
        if b > 0 && c > 0 {
            (a as f64 * d as f64) / (b as f64 * c as f64)
        } else {
            f64::INFINITY
        }
    }

    /// Two-sided Fisher exact test p-value.
    pub fn fisher_p_value(&self) -> f64 {
        let [[a, b], [c, d]] = self.cells;
        if a + b == 0 || c + d == 0 || a + c == 0 || b + d == 0 {
            return 1.0;
        }
        let population = a + b + c + d;
        let draws = a + b;
        let successes = a + c;
        let distribution = match Hypergeometric::new(population, successes, draws) {
            Ok(distribution) => distribution,
            Err(e) => {
                log::warn!("Hypergeometric distribution rejected table {:?}: {e}", self.cells);
                return f64::NAN;
            }
        };
        let observed = distribution.pmf(a);
        let lo = (draws + successes).saturating_sub(population);
        let hi = draws.min(successes);
        let threshold = observed * FISHER_RELATIVE_TOLERANCE;
        let p: f64 = (lo..=hi)
            .map(|k| distribution.pmf(k))
            .filter(|&pk| pk <= threshold)
            .sum();
        p.min(1.0)
    }
}

/// Result of the exact association test on one feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FisherExact {
    pub odds_ratio: f64,
    pub p_value: f64,
}

pub fn fisher_exact(table: &ContingencyTable) -> FisherExact {
    FisherExact {
        odds_ratio: table.odds_ratio(),
        p_value: table.fisher_p_value(),
    }
}

/// Pearson chi-square test of independence between one genotype column and the labels.
///
/// The table has one row per distinct dosage value and one column per phenotype class.
/// No continuity correction is applied. A table with zero degrees of freedom (constant
/// column or a single phenotype class) has p-value 1.
pub fn chi_square_p_value(genotype: ArrayView1<i8>, labels: ArrayView1<u8>) -> Result<f64, SelectionError> {
    let mut rows: BTreeMap<i8, [u64; 2]> = BTreeMap::new();
    let mut class_totals = [0u64; 2];
    for (&g, &y) in genotype.iter().zip(labels.iter()) {
        let class = usize::from(y != 0);
        rows.entry(g).or_insert([0, 0])[class] += 1;
        class_totals[class] += 1;
    }

    let n = class_totals[0] + class_totals[1];
    let present_classes = class_totals.iter().filter(|&&t| t > 0).count();
    if n == 0 || rows.len() < 2 || present_classes < 2 {
        return Ok(1.0);
    }

    let n = n as f64;
    let mut statistic = 0.0;
    for counts in rows.values() {
        let row_total = (counts[0] + counts[1]) as f64;
        for (class, &observed) in counts.iter().enumerate() {
            let expected = row_total * class_totals[class] as f64 / n;
            let diff = observed as f64 - expected;
            statistic += diff * diff / expected;
        }
    }

    let dof = (rows.len() - 1) as f64;
    let distribution = ChiSquared::new(dof).map_err(|e| SelectionError::Statistics(e.to_string()))?;
    Ok(distribution.sf(statistic))
}

/// `-log10(p)` of the chi-square test for every column, computed in parallel.
///
/// A p-value that underflows to zero yields `+inf`.
pub fn chi_square_scores(genotype: ArrayView2<i8>, labels: ArrayView1<u8>) -> Result<Array1<f64>, SelectionError> {
    if genotype.nrows() != labels.len() {
        return Err(SelectionError::SubjectMismatch {
            left: genotype.nrows(),
            right: labels.len(),
        });
    }
    let scores = (0..genotype.ncols())
        .into_par_iter()
        .map(|j| chi_square_p_value(genotype.column(j), labels).map(|p| 0.0 - p.log10()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Array1::from_vec(scores))
}

/// Fraction of subjects carrying each feature, i.e. the column mean.
pub fn genotype_frequency(genotype: ArrayView2<i8>) -> Array1<f64> {
    let n = genotype.nrows();
    genotype
        .columns()
        .into_iter()
        .map(|col| {
            if n == 0 {
                f64::NAN
            } else {
                col.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64
            }
        })
        .collect()
}
