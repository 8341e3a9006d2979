//! # Input Loading
//!
//! Reads the per-gene feature tables, the phenotype file and the single-gene score
//! file written by the earlier stages, and turns them into the aligned structures
//! the selection chain works on.
//!
//! - Feature tables are CSV files whose name contains `Feature.csv`. The header
//!   lists the feature identifiers; every row holds one subject's dosages. The gene
//!   key of a table is the part of its file name before the first `_`.
//! - The phenotype file has no header; the last column is the binary outcome.
//! - The score file maps gene keys to single-gene scores. Rows whose score is
//!   `MemErr`, zero or not a number are skipped.

use crate::select::features::{FeatureMatrix, INTERACTION_DELIMITER};
use crate::select::SelectionError;
use ahash::AHashMap;
use ndarray::{Array1, Array2, Axis, concatenate};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker in the file name of a feature table.
pub const FEATURE_FILE_MARKER: &str = "Feature.csv";
/// Prefix of the score file looked up when none is given.
pub const SCORE_FILE_PREFIX: &str = "All_Logistic";
/// Score entry written for genes whose single-gene stage ran out of memory.
pub const SCORE_ERROR_MARKER: &str = "MemErr";
/// Directory created next to the feature directory when no output directory is given.
pub const DEFAULT_OUTPUT_DIR: &str = "crossGeneResult";

const GENE_KEY_SEPARATOR: char = '_';
const GENE_SYMBOL_SEPARATOR: char = '@';

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to read score file: {0}")]
    CsvError(#[from] csv::Error),
    #[error("No feature file (name containing 'Feature.csv') was found in '{0}'.")]
    NoFeatureFiles(PathBuf),
    #[error("No score file (name starting with 'All_Logistic') was found in '{0}'.")]
    ScoreFileNotFound(PathBuf),
    #[error("The phenotype file '{0}' has no rows.")]
    EmptyPhenotype(PathBuf),
    #[error(
        "Column '{column}' of '{file}' could not be converted to a number. (Found type: {found_type})"
    )]
    ColumnWrongType {
        file: PathBuf,
        column: String,
        found_type: String,
    },
    #[error("Missing values were found in column '{column}' of '{file}'.")]
    MissingValuesFound { file: PathBuf, column: String },
    #[error("Phenotype row {row} has outcome {value}, but only 0 and 1 are allowed.")]
    NonBinaryPhenotype { row: usize, value: f64 },
    #[error("Column '{column}' of '{file}' holds dosage {value}, which does not fit in a signed byte.")]
    DosageOutOfRange {
        file: PathBuf,
        column: String,
        value: f64,
    },
    #[error("'{file}' has {found} subjects, but the phenotype file has {expected}.")]
    SubjectCountMismatch {
        file: PathBuf,
        found: usize,
        expected: usize,
    },
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Feature identifier to gene key, built once from the feature table names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneMap {
    genes: AHashMap<String, String>,
}

impl GeneMap {
    pub fn insert(&mut self, feature_id: impl Into<String>, gene_key: impl Into<String>) {
        self.genes.insert(feature_id.into(), gene_key.into());
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn contains(&self, feature_id: &str) -> bool {
        self.genes.contains_key(feature_id)
    }

    /// Gene key of a single-gene feature, as used by the score file.
    pub fn gene_key(&self, feature_id: &str) -> Option<&str> {
        self.genes.get(feature_id).map(String::as_str)
    }

    /// Gene symbol of a single-gene feature: the gene key up to the first `@`.
    pub fn gene_symbol(&self, feature_id: &str) -> Option<&str> {
        self.gene_key(feature_id).map(gene_symbol)
    }
}

/// Gene symbol of a gene key.
pub fn gene_symbol(gene_key: &str) -> &str {
    gene_key.split(GENE_SYMBOL_SEPARATOR).next().unwrap_or(gene_key)
}

/// Gene key of a feature table, derived from its file name.
pub fn gene_key_from_path(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.split(GENE_KEY_SEPARATOR).next().unwrap_or_default().to_string()
}

/// Gene key to single-gene score.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreMap {
    scores: AHashMap<String, f64>,
}

impl ScoreMap {
    pub fn insert(&mut self, gene_key: impl Into<String>, score: f64) {
        self.scores.insert(gene_key.into(), score);
    }

    pub fn get(&self, gene_key: &str) -> Option<f64> {
        self.scores.get(gene_key).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Everything the selection chain needs from disk.
#[derive(Debug)]
pub struct InputData {
    pub features: FeatureMatrix,
    pub labels: Array1<u8>,
    pub gene_map: GeneMap,
    pub scores: ScoreMap,
}

/// Feature tables in `dir`, in natural file-name order.
pub fn discover_feature_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().contains(FEATURE_FILE_MARKER))
        })
        .collect();
    if files.is_empty() {
        return Err(DataError::NoFeatureFiles(dir.to_path_buf()));
    }
    files.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(files)
}

/// The first file in `dir`, in natural order, whose name starts with `All_Logistic`.
pub fn default_score_file(dir: &Path) -> Result<PathBuf, DataError> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(SCORE_FILE_PREFIX))
        })
        .collect();
    candidates.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| DataError::ScoreFileNotFound(dir.to_path_buf()))
}

/// `<parent of feature_dir>/crossGeneResult`.
pub fn default_output_dir(feature_dir: &Path) -> Result<PathBuf, DataError> {
    let absolute = fs::canonicalize(feature_dir)?;
    let parent = absolute.parent().map(Path::to_path_buf).unwrap_or(absolute);
    Ok(parent.join(DEFAULT_OUTPUT_DIR))
}

fn numeric_column(df: &DataFrame, name: &str, file: &Path) -> Result<Vec<f64>, DataError> {
    let column = df.column(name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound {
            file: file.to_path_buf(),
            column: name.to_string(),
        });
    }
    let wrong_type = || DataError::ColumnWrongType {
        file: file.to_path_buf(),
        column: name.to_string(),
        found_type: format!("{:?}", column.dtype()),
    };
    let casted = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }
    Ok(casted.f64()?.rechunk().into_no_null_iter().collect())
}

fn read_csv(path: &Path, has_header: bool) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(CsvReadOptions::default().with_has_header(has_header))
        .finish()?;
    Ok(df)
}

/// Binary outcome from the last column of a header-less phenotype file.
pub fn load_phenotype(path: &Path) -> Result<Array1<u8>, DataError> {
    let df = read_csv(path, false)?;
    let last = df
        .get_column_names()
        .last()
        .map(|name| name.to_string())
        .ok_or_else(|| DataError::EmptyPhenotype(path.to_path_buf()))?;
    let values = numeric_column(&df, &last, path)?;
    if values.is_empty() {
        return Err(DataError::EmptyPhenotype(path.to_path_buf()));
    }
    values
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            if value == 0.0 {
                Ok(0)
            } else if value == 1.0 {
                Ok(1)
            } else {
                Err(DataError::NonBinaryPhenotype { row, value })
            }
        })
        .collect()
}

/// Reads one feature table into its identifiers and dosage matrix.
///
/// Dosages are parsed as numbers and truncated toward zero.
pub fn load_feature_table(path: &Path) -> Result<(Vec<String>, Array2<i8>), DataError> {
    let df = read_csv(path, true)?;
    let ids: Vec<String> = df.get_column_names().iter().map(|name| name.to_string()).collect();
    let mut genotype = Array2::<i8>::zeros((df.height(), ids.len()));
    for (j, id) in ids.iter().enumerate() {
        let values = numeric_column(&df, id, path)?;
        for (i, value) in values.into_iter().enumerate() {
            let truncated = value.trunc();
            if !(f64::from(i8::MIN)..=f64::from(i8::MAX)).contains(&truncated) {
                return Err(DataError::DosageOutOfRange {
                    file: path.to_path_buf(),
                    column: id.clone(),
                    value,
                });
            }
            genotype[[i, j]] = truncated as i8;
        }
    }
    Ok((ids, genotype))
}

/// Loads every feature table in `dir` side by side, in natural file-name order.
pub fn load_features(dir: &Path, n_subjects: usize) -> Result<(FeatureMatrix, GeneMap), DataError> {
    let files = discover_feature_files(dir)?;
    let mut gene_map = GeneMap::default();
    let mut ids: Vec<String> = Vec::new();
    let mut blocks: Vec<Array2<i8>> = Vec::with_capacity(files.len());

    for path in &files {
        let (table_ids, genotype) = load_feature_table(path)?;
        if genotype.nrows() != n_subjects {
            return Err(DataError::SubjectCountMismatch {
                file: path.clone(),
                found: genotype.nrows(),
                expected: n_subjects,
            });
        }
        let gene_key = gene_key_from_path(path);
        for id in &table_ids {
            if id.contains(INTERACTION_DELIMITER) {
                log::debug!("'{id}' in {} is an existing interaction feature", path.display());
            }
            gene_map.insert(id.clone(), gene_key.clone());
        }
        log::debug!("Loaded {} features of gene key '{gene_key}'", table_ids.len());
        ids.extend(table_ids);
        blocks.push(genotype);
    }

    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    let genotype = concatenate(Axis(1), &views).map_err(|e| SelectionError::Shape(e.to_string()))?;
    log::info!(
        "Loaded {} features for {} subjects from {} feature files",
        ids.len(),
        n_subjects,
        files.len()
    );
    Ok((FeatureMatrix::new(genotype, ids)?, gene_map))
}

/// Parses the single-gene score file. The header row is ignored.
pub fn load_scores(path: &Path) -> Result<ScoreMap, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut scores = ScoreMap::default();
    for record in reader.records() {
        let record = record?;
        let (Some(key), Some(raw)) = (record.get(0), record.get(1)) else {
            continue;
        };
        if raw == SCORE_ERROR_MARKER {
            continue;
        }
        match raw.parse::<f64>() {
            Ok(score) if score != 0.0 => scores.insert(key, score),
            Ok(_) => {}
            Err(_) => log::debug!("Skipping non-numeric score '{raw}' of gene key '{key}'"),
        }
    }
    log::info!("Loaded {} single-gene scores", scores.len());
    Ok(scores)
}

/// Loads the phenotype, every feature table and the score file.
pub fn load_inputs(feature_dir: &Path, phenotype: &Path, score_file: &Path) -> Result<InputData, DataError> {
    let labels = load_phenotype(phenotype)?;
    let (features, gene_map) = load_features(feature_dir, labels.len())?;
    let scores = load_scores(score_file)?;
    Ok(InputData {
        features,
        labels,
        gene_map,
        scores,
    })
}
