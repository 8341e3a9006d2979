use super::logistic::{ClassWeight, FittedLogistic, sigmoid};
use crate::config::PipelineConfig;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write classifier file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML classifier file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize classifier to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Prediction data has {found} feature columns, but the classifier was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("Feature column {position} is '{found}', but the classifier expects '{expected}'.")]
    MismatchedFeature {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("Classifier file is inconsistent: {0}")]
    Malformed(String),
}

/// The classifier artifact written next to the result tables.
///
/// Coefficients are stored in the column order of `feature_ids`; prediction data
/// must present its columns in exactly that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedClassifier {
    pub feature_ids: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Inverse regularization strength chosen by the grid search.
    pub c: f64,
    pub class_weight: ClassWeight,
    /// Settings of the run that produced this classifier.
    pub config: PipelineConfig,
}

impl PersistedClassifier {
    pub fn from_fit(
        feature_ids: Vec<String>,
        model: &FittedLogistic,
        class_weight: ClassWeight,
        config: PipelineConfig,
    ) -> Result<Self, ModelError> {
        let classifier = Self {
            feature_ids,
            coefficients: model.coefficients.to_vec(),
            intercept: model.intercept,
            c: model.c,
            class_weight,
            config,
        };
        classifier.validate()?;
        Ok(classifier)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.coefficients.len() != self.feature_ids.len() {
            return Err(ModelError::Malformed(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.feature_ids.len()
            )));
        }
        Ok(())
    }

    /// Checks a feature table header against the trained feature order.
    pub fn check_header(&self, header: &[String]) -> Result<(), ModelError> {
        if header.len() != self.feature_ids.len() {
            return Err(ModelError::MismatchedFeatureCount {
                found: header.len(),
                expected: self.feature_ids.len(),
            });
        }
        if let Some((position, (expected, found))) = self
            .feature_ids
            .iter()
            .zip(header)
            .enumerate()
            .find(|(_, (expected, found))| expected != found)
        {
            return Err(ModelError::MismatchedFeature {
                position,
                expected: expected.clone(),
                found: found.clone(),
            });
        }
        Ok(())
    }

    /// Probability of the positive class for every row of `x`.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.coefficients.len() {
            return Err(ModelError::MismatchedFeatureCount {
                found: x.ncols(),
                expected: self.coefficients.len(),
            });
        }
        let w = ArrayView1::from(&self.coefficients);
        Ok((x.dot(&w) + self.intercept).mapv(sigmoid))
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>, ModelError> {
        Ok(self.predict_proba(x)?.mapv(|p| u8::from(p > 0.5)))
    }

    /// Saves the classifier to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a classifier from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let classifier: Self = toml::from_str(&toml_string)?;
        classifier.validate()?;
        Ok(classifier)
    }
}
