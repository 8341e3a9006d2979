//! Per-feature statistics of the final model and the run summary.

use super::ReportError;
use crate::data::{GeneMap, ScoreMap, gene_symbol};
use crate::fit::metrics::{ConfusionMatrix, RocCurve};
use crate::fit::search::CrossValidation;
use crate::select::SelectionError;
use crate::select::features::{FeatureMatrix, INTERACTION_DELIMITER};
use crate::select::stats::{ContingencyTable, chi_square_scores, fisher_exact, genotype_frequency};
use ndarray::ArrayView1;

/// Gene attribution of a surviving feature.
#[derive(Clone, Debug, PartialEq)]
pub enum GeneAnnotation {
    /// A feature listed verbatim in one gene's feature table.
    SingleGene { symbol: String, score: Option<f64> },
    /// An interaction whose parts come from the listed genes, in identifier order.
    CrossGene { symbols: Vec<String> },
}

impl GeneAnnotation {
    /// Single-gene features keep their gene's score; interactions are matched part by part.
    pub fn resolve(feature_id: &str, genes: &GeneMap, scores: &ScoreMap) -> Result<Self, ReportError> {
        if let Some(key) = genes.gene_key(feature_id) {
            return Ok(Self::SingleGene {
                symbol: gene_symbol(key).to_string(),
                score: scores.get(key),
            });
        }
        let symbols = feature_id
            .split(INTERACTION_DELIMITER)
            .map(|part| {
                genes
                    .gene_symbol(part)
                    .map(str::to_string)
                    .ok_or_else(|| ReportError::UnknownFeature(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::CrossGene { symbols })
    }

    /// `geneSymbol` column value.
    pub fn symbol(&self) -> String {
        match self {
            Self::SingleGene { symbol, .. } => symbol.clone(),
            Self::CrossGene { symbols } => symbols.join(&INTERACTION_DELIMITER.to_string()),
        }
    }

    /// `singleGeneScore` column value; interactions have none.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::SingleGene { score, .. } => *score,
            Self::CrossGene { .. } => None,
        }
    }
}

/// One row of the result table.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureStatistic {
    pub rsid: String,
    pub weight: f64,
    /// `-log10(p)` of the chi-square test on the final matrix.
    pub chi_square_log_p: f64,
    pub odds_ratio: f64,
    pub genotype_frequency: f64,
    pub gene: GeneAnnotation,
}

/// Builds the result rows of the final features, in column order.
pub fn assemble(
    features: &FeatureMatrix,
    weights: ArrayView1<f64>,
    labels: ArrayView1<u8>,
    genes: &GeneMap,
    scores: &ScoreMap,
) -> Result<Vec<FeatureStatistic>, ReportError> {
    if weights.len() != features.n_features() {
        return Err(SelectionError::MaskLength {
            expected: features.n_features(),
            found: weights.len(),
        }
        .into());
    }
    let chi_square = chi_square_scores(features.genotype(), labels)?;
    let frequency = genotype_frequency(features.genotype());
    let odds_ratios: Vec<f64> = (0..features.n_features())
        .map(|j| fisher_exact(&ContingencyTable::from_column(features.column(j), labels)).odds_ratio)
        .collect();

    (0..features.n_features())
        .map(|j| {
            let rsid = &features.ids()[j];
            Ok(FeatureStatistic {
                rsid: rsid.clone(),
                weight: weights[j],
                chi_square_log_p: chi_square[j],
                odds_ratio: odds_ratios[j],
                genotype_frequency: frequency[j],
                gene: GeneAnnotation::resolve(rsid, genes, scores)?,
            })
        })
        .collect()
}

/// Headline numbers of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub train_f1: f64,
    pub test_f1: f64,
    pub k_fold: usize,
    pub auc: f64,
    pub specificity: f64,
    pub sensitivity: f64,
    pub n_features: usize,
}

impl RunSummary {
    pub fn new(train_f1: f64, cv: &CrossValidation, k_fold: usize, n_features: usize) -> Self {
        let held_out = &cv.predictions;
        let confusion = ConfusionMatrix::from_labels(&held_out.target, &held_out.predicted);
        let roc = RocCurve::compute(&held_out.target, &held_out.probability);
        Self {
            train_f1,
            test_f1: cv.f1,
            k_fold,
            auc: roc.auc(),
            specificity: confusion.specificity(),
            sensitivity: confusion.sensitivity(),
            n_features,
        }
    }

    /// The two console lines printed at the end of a successful run.
    pub fn console_lines(&self) -> [String; 2] {
        [
            format!(
                "Detect cross gene epistasis. DONE! (Training score:{:.2}; {}-fold Test Score:{:.2})",
                self.train_f1, self.k_fold, self.test_f1
            ),
            format!(
                "AUC: {:.2}; Specificity: {:.2}; Sensitivity: {:.2}",
                self.auc, self.specificity, self.sensitivity
            ),
        ]
    }
}
