//! # Cross-gene epistasis run
//!
//! Sequences the selection chain, the classifier fits and the reporting:
//!
//! 1. chi-square screen of every loaded feature
//! 2. redundancy removal among single-gene features and pairwise expansion
//! 3. stability selection
//! 4. cross-validated and training fits, then removal of zero-weight features
//! 5. result rows, tables, plots and the persisted classifier
//!
//! A step that leaves no feature ends the run with `PipelineOutcome::Aborted`
//! before anything is written to the output directory.

use crate::config::{ConfigError, PipelineConfig};
use crate::data::{self, DataError, InputData};
use crate::fit::FitError;
use crate::fit::model::{ModelError, PersistedClassifier};
use crate::fit::search::{ClassifierSearch, L1LogisticSearch};
use crate::progress::{PipelineStage, ProgressObserver};
use crate::report::output::{CLASSIFIER_FILE, FEATURE_FILE, RESULT_FILE, write_feature_table, write_result_table};
use crate::report::plots::plot_predictions;
use crate::report::{ReportError, RunSummary, assemble};
use crate::select::SelectionError;
use crate::select::encoder::{InteractionEncoder, PairwiseEncoder};
use crate::select::features::FeatureMatrix;
use crate::select::screen::{
    DegreeSplit, chi_square_screen, expand_interactions, remove_redundant, split_by_degree, stability_screen,
    weight_screen,
};
use crate::select::stability::{RandomizedLogistic, StabilitySelector};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("Model fitting failed: {0}")]
    Fit(#[from] FitError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The filter that left no feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    ChiSquare,
    Stability,
    ZeroWeights,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChiSquare => "There is no variant past the chi-square test selection.",
            Self::Stability => "There is no variant past the random logistic feature selection.",
            Self::ZeroWeights => "There is no variant with a non-zero weight in the L1 logistic model.",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineOutcome {
    Completed(RunSummary),
    Aborted(AbortReason),
}

impl PipelineOutcome {
    /// `(train_f1, test_f1)`; an aborted run reports `(0.0, 0.0)`.
    pub fn scores(&self) -> (f64, f64) {
        match self {
            Self::Completed(summary) => (summary.train_f1, summary.test_f1),
            Self::Aborted(_) => (0.0, 0.0),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Input and output locations of a run. Unset paths fall back to the defaults
/// found next to the feature directory.
#[derive(Clone, Debug)]
pub struct RunPaths {
    pub feature_dir: PathBuf,
    pub phenotype: PathBuf,
    pub score_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl RunPaths {
    pub fn new(feature_dir: impl Into<PathBuf>, phenotype: impl Into<PathBuf>) -> Self {
        Self {
            feature_dir: feature_dir.into(),
            phenotype: phenotype.into(),
            score_file: None,
            output_dir: None,
        }
    }

    pub fn score_file(&self) -> Result<PathBuf, DataError> {
        match &self.score_file {
            Some(path) => Ok(path.clone()),
            None => data::default_score_file(&self.feature_dir),
        }
    }

    pub fn output_dir(&self) -> Result<PathBuf, DataError> {
        match &self.output_dir {
            Some(path) => Ok(path.clone()),
            None => data::default_output_dir(&self.feature_dir),
        }
    }
}

/// The run, generic over its three replaceable collaborators.
pub struct CrossGenePipeline<E, S, M> {
    pub config: PipelineConfig,
    pub encoder: E,
    pub selector: S,
    pub search: M,
}

impl CrossGenePipeline<PairwiseEncoder, RandomizedLogistic, L1LogisticSearch> {
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            selector: config.stability_selector(),
            search: config.classifier_search(),
            encoder: PairwiseEncoder,
            config,
        })
    }
}

impl<E, S, M> CrossGenePipeline<E, S, M>
where
    E: InteractionEncoder,
    S: StabilitySelector,
    M: ClassifierSearch,
{
    pub fn new(config: PipelineConfig, encoder: E, selector: S, search: M) -> Self {
        Self {
            config,
            encoder,
            selector,
            search,
        }
    }

    /// Loads the inputs named by `paths` and runs every step.
    pub fn run(
        &self,
        paths: &RunPaths,
        progress: &mut impl ProgressObserver,
    ) -> Result<PipelineOutcome, PipelineError> {
        let score_file = paths.score_file()?;
        let output_dir = paths.output_dir()?;
        log::info!("Using single-gene scores from {}", score_file.display());
        let input = data::load_inputs(&paths.feature_dir, &paths.phenotype, &score_file)?;
        self.run_on(&input, &output_dir, progress)
    }

    /// Runs every step on loaded inputs, writing into `output_dir` only on success.
    pub fn run_on(
        &self,
        input: &InputData,
        output_dir: &Path,
        progress: &mut impl ProgressObserver,
    ) -> Result<PipelineOutcome, PipelineError> {
        let labels = input.labels.view();
        let config = &self.config;

        progress.on_stage_start(PipelineStage::ChiSquareScreen, input.features.n_features());
        let screened = chi_square_screen(&input.features, labels, config.chi_square_threshold)?;
        progress.on_stage_finish(PipelineStage::ChiSquareScreen, screened.features.n_features());
        if screened.features.is_empty() {
            return Ok(abort(AbortReason::ChiSquare));
        }

        progress.on_stage_start(PipelineStage::InteractionExpansion, screened.features.n_features());
        let split = split_by_degree(&screened.features)?;
        let split = DegreeSplit {
            single: remove_redundant(&split.single)?,
            composite: split.composite,
        };
        let expanded = expand_interactions(split, &self.encoder, labels)?;
        progress.on_stage_finish(PipelineStage::InteractionExpansion, expanded.n_features());

        progress.on_stage_start(PipelineStage::StabilitySelection, expanded.n_features());
        let stable = stability_screen(&expanded, &self.selector, labels, config.stability_threshold)?;
        progress.on_stage_finish(PipelineStage::StabilitySelection, stable.features.n_features());
        if stable.features.is_empty() {
            return Ok(abort(AbortReason::Stability));
        }

        progress.on_stage_start(PipelineStage::ModelFitting, stable.features.n_features());
        let design = stable.features.to_design();
        let cv = self.search.cross_validate(design.view(), labels, config.k_fold)?;
        let training = self.search.fit_training(design.view(), labels)?;
        log::info!(
            "Held-out F1 {:.4} with C = {}; training F1 {:.4}",
            cv.f1,
            cv.best_c,
            training.f1
        );
        let weighted = weight_screen(&stable.features, cv.coefficients.view())?;
        progress.on_stage_finish(PipelineStage::ModelFitting, weighted.features.n_features());
        if weighted.features.is_empty() {
            return Ok(abort(AbortReason::ZeroWeights));
        }

        progress.on_stage_start(PipelineStage::ResultAssembly, weighted.features.n_features());
        let rows = assemble(
            &weighted.features,
            weighted.scores.view(),
            labels,
            &input.gene_map,
            &input.scores,
        )?;
        let summary = RunSummary::new(training.f1, &cv, config.k_fold, weighted.features.n_features());
        progress.on_stage_finish(PipelineStage::ResultAssembly, rows.len());

        progress.on_stage_start(PipelineStage::Output, weighted.features.n_features());
        fs::create_dir_all(output_dir).map_err(|source| PipelineError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;
        write_result_table(&output_dir.join(RESULT_FILE), &rows)?;
        write_feature_table(&output_dir.join(FEATURE_FILE), &weighted.features)?;
        let plots = plot_predictions(output_dir, &config.method_label, &config.plot_label, &cv.predictions)?;
        log::debug!("Wrote plots {}", plots.distribution.display());
        self.persist_classifier(&weighted.features, labels, &output_dir.join(CLASSIFIER_FILE))?;
        progress.on_stage_finish(PipelineStage::Output, weighted.features.n_features());

        for line in summary.console_lines() {
            println!("{line}");
        }
        Ok(PipelineOutcome::Completed(summary))
    }

    /// Refits the grid search on the final features and saves the winner.
    fn persist_classifier(
        &self,
        features: &FeatureMatrix,
        labels: ndarray::ArrayView1<u8>,
        path: &Path,
    ) -> Result<(), PipelineError> {
        let fit = self.search.fit_training(features.to_design().view(), labels)?;
        let classifier = PersistedClassifier::from_fit(
            features.ids().to_vec(),
            &fit.model,
            self.config.grid_search().class_weight,
            self.config.clone(),
        )?;
        classifier.save(path)?;
        log::info!("Saved classifier to {}", path.display());
        Ok(())
    }
}

fn abort(reason: AbortReason) -> PipelineOutcome {
    println!("{reason}");
    PipelineOutcome::Aborted(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GeneMap, ScoreMap};
    use crate::fit::logistic::FittedLogistic;
    use crate::fit::search::{CrossValidation, HeldOutPredictions, TrainingFit};
    use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

    /// Selects every feature.
    struct KeepAll;

    impl StabilitySelector for KeepAll {
        fn selection_frequency(&self, x: ArrayView2<f64>, _: ArrayView1<u8>) -> Result<Array1<f64>, SelectionError> {
            Ok(Array1::ones(x.ncols()))
        }
    }

    /// Selects no feature often enough to pass the default threshold.
    struct RarelySelected;

    impl StabilitySelector for RarelySelected {
        fn selection_frequency(&self, x: ArrayView2<f64>, _: ArrayView1<u8>) -> Result<Array1<f64>, SelectionError> {
            Ok(Array1::from_elem(x.ncols(), 0.2))
        }
    }

    /// Weights that are zero for every feature.
    struct ZeroWeights;

    impl ClassifierSearch for ZeroWeights {
        fn cross_validate(
            &self,
            x: ArrayView2<f64>,
            labels: ArrayView1<u8>,
            _: usize,
        ) -> Result<CrossValidation, FitError> {
            Ok(CrossValidation {
                f1: 0.5,
                coefficients: Array1::zeros(x.ncols()),
                predictions: HeldOutPredictions {
                    target: labels.to_vec(),
                    predicted: vec![1; labels.len()],
                    probability: vec![0.5; labels.len()],
                },
                best_c: 1.0,
            })
        }

        fn fit_training(&self, x: ArrayView2<f64>, _: ArrayView1<u8>) -> Result<TrainingFit, FitError> {
            Ok(TrainingFit {
                f1: 0.5,
                model: FittedLogistic {
                    coefficients: Array1::zeros(x.ncols()),
                    intercept: 0.0,
                    c: 1.0,
                    iterations: 0,
                    converged: true,
                },
            })
        }
    }

    /// With `signal`, rs1 is the label and rs2 the label plus one false positive.
    fn input(signal: bool) -> InputData {
        let labels: Array1<u8> = (0..40).map(|i| u8::from(i % 2 == 0)).collect();
        let mut genotype = Array2::<i8>::zeros((40, 3));
        for i in 0..40 {
            let y = i8::from(i % 2 == 0);
            genotype[[i, 0]] = if signal { y } else { i8::from(i < 20) };
            genotype[[i, 1]] = if signal { y.max(i8::from(i == 1)) } else { i8::from(i % 4 < 2) };
            genotype[[i, 2]] = i8::from(i % 3 == 0);
        }
        let ids = vec!["rs1".to_string(), "rs2".to_string(), "rs3".to_string()];
        let mut gene_map = GeneMap::default();
        for id in &ids {
            gene_map.insert(id.clone(), "GENEA");
        }
        InputData {
            features: FeatureMatrix::new(genotype, ids).unwrap(),
            labels,
            gene_map,
            scores: ScoreMap::default(),
        }
    }

    #[test]
    fn unassociated_features_abort_at_chi_square() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let pipeline = CrossGenePipeline::from_config(PipelineConfig::default()).unwrap();
        let outcome = pipeline
            .run_on(&input(false), &output, &mut crate::progress::NoopProgress)
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::Aborted(AbortReason::ChiSquare));
        assert_eq!(outcome.scores(), (0.0, 0.0));
        assert!(!output.exists());
    }

    #[test]
    fn zero_weights_abort_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let pipeline = CrossGenePipeline::new(PipelineConfig::default(), PairwiseEncoder, KeepAll, ZeroWeights);
        let outcome = pipeline
            .run_on(&input(true), &output, &mut crate::progress::NoopProgress)
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::Aborted(AbortReason::ZeroWeights));
        assert!(outcome.is_aborted());
        assert!(!output.exists());
    }

    #[test]
    fn unstable_features_abort_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let config = PipelineConfig::default();
        let search = config.classifier_search();
        let pipeline = CrossGenePipeline::new(config, PairwiseEncoder, RarelySelected, search);
        let outcome = pipeline
            .run_on(&input(true), &output, &mut crate::progress::NoopProgress)
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::Aborted(AbortReason::Stability));
        assert_eq!(outcome.scores(), (0.0, 0.0));
        assert!(!output.exists());
    }

    #[test]
    fn explicit_paths_override_defaults() {
        let mut paths = RunPaths::new("/data/features", "/data/pheno.csv");
        paths.score_file = Some(PathBuf::from("/data/scores.csv"));
        paths.output_dir = Some(PathBuf::from("/tmp/out"));
        assert_eq!(paths.score_file().unwrap(), PathBuf::from("/data/scores.csv"));
        assert_eq!(paths.output_dir().unwrap(), PathBuf::from("/tmp/out"));
    }
}
