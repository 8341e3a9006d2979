//! Writers for the result table, the reduced feature table and applied predictions.

use super::ReportError;
use super::assembly::FeatureStatistic;
use crate::select::features::FeatureMatrix;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const RESULT_FILE: &str = "Result.csv";
pub const FEATURE_FILE: &str = "Feature.csv";
pub const CLASSIFIER_FILE: &str = "Classifier.toml";
pub const PREDICTION_FILE: &str = "predictions.tsv";

pub const RESULT_HEADER: [&str; 7] = [
    "rsid",
    "weight",
    "chi-square_log_p-value",
    "odds_ratio",
    "genotype_frequency",
    "geneSymbol",
    "singleGeneScore",
];

/// Shortest round-tripping decimal; non-finite values as `nan`, `inf` and `-inf`.
fn format_float(buffer: &mut ryu::Buffer, value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        buffer.format_finite(value).to_string()
    }
}

/// Writes one row per surviving feature. Interactions leave `singleGeneScore` empty.
pub fn write_result_table(path: &Path, rows: &[FeatureStatistic]) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(RESULT_HEADER)?;
    let mut buffer = ryu::Buffer::new();
    for row in rows {
        let score = row
            .gene
            .score()
            .map(|s| format_float(&mut buffer, s))
            .unwrap_or_default();
        writer.write_record([
            row.rsid.clone(),
            format_float(&mut buffer, row.weight),
            format_float(&mut buffer, row.chi_square_log_p),
            format_float(&mut buffer, row.odds_ratio),
            format_float(&mut buffer, row.genotype_frequency),
            row.gene.symbol(),
            score,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the surviving identifiers as the header and one dosage row per subject.
pub fn write_feature_table(path: &Path, features: &FeatureMatrix) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", features.ids().join(","))?;
    let mut line = String::with_capacity(features.n_features() * 3);
    for row in features.genotype().rows() {
        line.clear();
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                line.push(',');
            }
            line.push_str(&value.to_string());
        }
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `probability` and `label` for every subject of an applied classifier.
pub fn write_predictions(path: &Path, probability: &[f64], label: &[u8]) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "probability\tlabel")?;
    let mut buffer = ryu::Buffer::new();
    for (&p, &l) in probability.iter().zip(label) {
        writeln!(writer, "{}\t{l}", format_float(&mut buffer, p))?;
    }
    writer.flush()?;
    Ok(())
}
