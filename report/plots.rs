//! SVG diagnostics of the cross-validated predictions.
//!
//! Three figures are written per run, all named `<method>_<kind>_<label>.svg`:
//! the predicted-probability distribution of cases and controls, the prevalence of
//! cases across probability percentiles, and the ROC curve.

use super::ReportError;
use super::curve_fit::{fit_gaussian, fit_sigmoid};
use crate::fit::metrics::RocCurve;
use crate::fit::search::HeldOutPredictions;
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const HISTOGRAM_BINS: usize = 25;
const PERCENTILE_STEP: usize = 5;
const FIGURE_SIZE: (u32, u32) = (600, 600);
const CURVE_POINTS: usize = 500;

const CASE_BAR: RGBColor = RGBColor(230, 143, 172);
const CASE_CURVE: RGBColor = RGBColor(179, 68, 108);
const CONTROL_BAR: RGBColor = RGBColor(73, 151, 208);
const CONTROL_CURVE: RGBColor = RGBColor(0, 65, 106);
const LOW_RISK: RGBColor = RGBColor(214, 236, 222);
const HIGH_RISK: RGBColor = RGBColor(28, 52, 76);

fn plot_error(e: impl std::fmt::Display) -> ReportError {
    ReportError::Plot(e.to_string())
}

fn linspace(start: f64, end: f64, points: usize) -> impl Iterator<Item = f64> {
    let step = (end - start) / (points.max(2) - 1) as f64;
    (0..points).map(move |i| start + step * i as f64)
}

/// Equal-width histogram normalised to the fraction of values per bin.
///
/// The last bin includes its upper edge. A constant sample is binned over
/// `[v - 0.5, v + 0.5]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub fractions: Vec<f64>,
}

impl Histogram {
    pub fn new(values: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let (mut lo, mut hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if values.is_empty() {
            (lo, hi) = (0.0, 1.0);
        } else if lo == hi {
            (lo, hi) = (lo - 0.5, hi + 0.5);
        }
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0usize; bins];
        for &v in values {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        let n = values.len().max(1) as f64;
        Self {
            edges,
            fractions: counts.iter().map(|&c| c as f64 / n).collect(),
        }
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    pub fn max_fraction(&self) -> f64 {
        self.fractions.iter().copied().fold(0.0, f64::max)
    }
}

/// Subjects grouped by the percentile step their probability falls into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PercentileBin {
    pub percentile: f64,
    /// Fraction of cases in the bin.
    pub prevalence: f64,
    pub mean_probability: f64,
    /// Bin prevalence over overall prevalence.
    pub relative_risk: f64,
}

/// Linear-interpolation percentile of sorted values.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Assigns every subject the percentile `step * k`, where `k` counts the percentile
/// cut points strictly below its probability, and summarises each group.
pub fn percentile_bins(target: &[u8], probability: &[f64], step: usize) -> Vec<PercentileBin> {
    if probability.is_empty() || step == 0 {
        return Vec::new();
    }
    let mut sorted = probability.to_vec();
    sorted.sort_by(f64::total_cmp);
    let cuts: Vec<f64> = (0..=100)
        .step_by(step)
        .map(|q| percentile(&sorted, q as f64))
        .collect();

    let mut groups: BTreeMap<usize, (f64, f64, f64)> = BTreeMap::new();
    for (&t, &p) in target.iter().zip(probability) {
        let rank = cuts.partition_point(|&c| c < p) * step;
        let group = groups.entry(rank).or_insert((0.0, 0.0, 0.0));
        group.0 += f64::from(t);
        group.1 += 1.0;
        group.2 += p;
    }
    let overall = target.iter().map(|&t| f64::from(t)).sum::<f64>() / target.len() as f64;
    groups
        .into_iter()
        .map(|(rank, (cases, count, proba_sum))| {
            let prevalence = cases / count;
            PercentileBin {
                percentile: rank as f64,
                prevalence,
                mean_probability: proba_sum / count,
                relative_risk: prevalence / overall,
            }
        })
        .collect()
}

fn risk_color(relative_risk: f64, lo: f64, hi: f64) -> RGBColor {
    let t = if hi > lo && relative_risk.is_finite() {
        ((relative_risk - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    RGBColor(
        mix(LOW_RISK.0, HIGH_RISK.0),
        mix(LOW_RISK.1, HIGH_RISK.1),
        mix(LOW_RISK.2, HIGH_RISK.2),
    )
}

/// Paths of the figures written for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlotFiles {
    pub distribution: PathBuf,
    pub prevalence: PathBuf,
    pub roc: PathBuf,
}

impl PlotFiles {
    pub fn new(dir: &Path, method: &str, label: &str) -> Self {
        Self {
            distribution: dir.join(format!("{method}_PGS_{label}.svg")),
            prevalence: dir.join(format!("{method}_Prevalence_{label}.svg")),
            roc: dir.join(format!("{method}_ROC_{label}.svg")),
        }
    }
}

/// Writes the three figures of the held-out predictions.
pub fn plot_predictions(
    dir: &Path,
    method: &str,
    label: &str,
    predictions: &HeldOutPredictions,
) -> Result<PlotFiles, ReportError> {
    let files = PlotFiles::new(dir, method, label);
    let f1 = predictions.f1();
    plot_score_distribution(&files.distribution, method, f1, predictions)?;
    plot_prevalence(&files.prevalence, method, f1, predictions)?;
    let roc = RocCurve::compute(&predictions.target, &predictions.probability);
    plot_roc(&files.roc, &roc)?;
    Ok(files)
}

fn plot_score_distribution(
    path: &Path,
    method: &str,
    f1: f64,
    predictions: &HeldOutPredictions,
) -> Result<(), ReportError> {
    let class_scores = |class: u8| -> Vec<f64> {
        predictions
            .target
            .iter()
            .zip(&predictions.probability)
            .filter(|&(&t, _)| t == class)
            .map(|(_, &p)| p)
            .collect()
    };
    let groups = [
        ("Case", class_scores(1), CASE_BAR, CASE_CURVE),
        ("Control", class_scores(0), CONTROL_BAR, CONTROL_CURVE),
    ];
    let histograms: Vec<Option<Histogram>> = groups
        .iter()
        .map(|(_, scores, _, _)| (!scores.is_empty()).then(|| Histogram::new(scores, HISTOGRAM_BINS)))
        .collect();
    let y_max = histograms
        .iter()
        .flatten()
        .map(Histogram::max_fraction)
        .fold(0.5, f64::max);

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{method} Predicting F1 Score: {f1:.4}"), ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..1f64, 0f64..y_max)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .x_desc("Polygenic Score")
        .y_desc("Fraction of samples by group")
        .draw()
        .map_err(plot_error)?;

    for ((name, _, bar, curve), histogram) in groups.iter().zip(&histograms) {
        let Some(histogram) = histogram else {
            log::warn!("No {} subjects to plot in {}", name.to_lowercase(), path.display());
            continue;
        };
        let bar_style = bar.mix(0.6).filled();
        chart
            .draw_series(
                histogram
                    .edges
                    .windows(2)
                    .zip(&histogram.fractions)
                    .map(|(edge, &fraction)| Rectangle::new([(edge[0], 0.0), (edge[1], fraction)], bar_style)),
            )
            .map_err(plot_error)?
            .label(*name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], bar_style));

        match fit_gaussian(&histogram.centers(), &histogram.fractions) {
            Ok(gaussian) => {
                let (start, end) = (histogram.edges[0], histogram.edges[HISTOGRAM_BINS]);
                chart
                    .draw_series(LineSeries::new(
                        linspace(start, end, CURVE_POINTS).map(|x| (x, gaussian.eval(x))),
                        curve.stroke_width(2),
                    ))
                    .map_err(plot_error)?;
            }
            Err(e) => log::warn!("Skipping the {} density curve: {e}", name.to_lowercase()),
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

fn plot_prevalence(
    path: &Path,
    method: &str,
    f1: f64,
    predictions: &HeldOutPredictions,
) -> Result<(), ReportError> {
    let bins = percentile_bins(&predictions.target, &predictions.probability, PERCENTILE_STEP);
    let (rr_lo, rr_hi) = bins
        .iter()
        .map(|b| b.relative_risk)
        .filter(|rr| rr.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), rr| (lo.min(rr), hi.max(rr)));

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{method} Predicting F1 Score: {f1:.4}"), ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..100f64, 0f64..1f64)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .x_desc("Polygenic Score Percentile")
        .y_desc("Prevalence of Percentile Group")
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(bins.iter().map(|b| {
            Circle::new(
                (b.percentile, b.prevalence),
                5,
                risk_color(b.relative_risk, rr_lo, rr_hi).filled(),
            )
        }))
        .map_err(plot_error)?
        .label("Observed prevalence (shade: relative risk)")
        .legend(|(x, y)| Circle::new((x + 6, y), 5, HIGH_RISK.filled()));

    let x: Vec<f64> = bins.iter().map(|b| b.percentile).collect();
    let y: Vec<f64> = bins.iter().map(|b| b.mean_probability).collect();
    match fit_sigmoid(&x, &y) {
        Ok(sigmoid) => {
            chart
                .draw_series(LineSeries::new(
                    linspace(0.0, 100.0, CURVE_POINTS).map(|x| (x, sigmoid.eval(x))),
                    BLACK.stroke_width(2),
                ))
                .map_err(plot_error)?
                .label("Fitted mean probability")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 12, y)], BLACK));
        }
        Err(e) => log::warn!("Skipping the prevalence sigmoid: {e}"),
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

fn plot_roc(path: &Path, roc: &RocCurve) -> Result<(), ReportError> {
    let auc = roc.auc();
    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Receiver operating characteristic", ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..1f64, 0f64..1f64)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .x_desc("False Positive Rate")
        .y_desc("True Positive Rate")
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            roc.false_positive_rate
                .iter()
                .copied()
                .zip(roc.true_positive_rate.iter().copied())
                .filter(|(x, y)| x.is_finite() && y.is_finite()),
            CASE_BAR.stroke_width(2),
        ))
        .map_err(plot_error)?
        .label(format!("Class 1 ROC curve (area = {auc:.2})"))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 12, y)], CASE_BAR.stroke_width(2)));
    chart
        .draw_series(LineSeries::new([(0.0, 0.0), (1.0, 1.0)], BLACK.stroke_width(1)))
        .map_err(plot_error)?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn histogram_fractions_sum_to_one() {
        let values = [0.1, 0.2, 0.2, 0.9, 1.0];
        let histogram = Histogram::new(&values, 4);
        assert_eq!(histogram.edges.len(), 5);
        assert_abs_diff_eq!(histogram.fractions.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        // the maximum lands in the last bin
        assert_abs_diff_eq!(histogram.fractions[3], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn constant_sample_gets_unit_range() {
        let histogram = Histogram::new(&[0.3, 0.3], 25);
        assert_abs_diff_eq!(histogram.edges[0], -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(histogram.edges[25], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(histogram.fractions[12], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn percentile_bins_follow_left_search() {
        let probability: Vec<f64> = (0..20).map(|i| f64::from(i) / 19.0).collect();
        let target: Vec<u8> = (0..20).map(|i| u8::from(i >= 10)).collect();
        let bins = percentile_bins(&target, &probability, 5);
        // the smallest value sits on the 0th cut point
        assert_eq!(bins[0].percentile, 0.0);
        assert_eq!(bins.last().unwrap().percentile, 100.0);
        let low: f64 = bins.iter().filter(|b| b.percentile <= 50.0).map(|b| b.prevalence).sum();
        assert_eq!(low, 0.0);
        let top = bins.last().unwrap();
        assert_abs_diff_eq!(top.relative_risk, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn risk_color_spans_the_palette() {
        assert_eq!(risk_color(1.0, 1.0, 2.0), LOW_RISK);
        assert_eq!(risk_color(2.0, 1.0, 2.0), HIGH_RISK);
        assert_eq!(risk_color(f64::NAN, 1.0, 2.0), risk_color(1.5, 1.0, 2.0));
    }

    #[test]
    fn writes_three_svg_files() {
        let dir = tempfile::tempdir().unwrap();
        let n = 60;
        let target: Vec<u8> = (0..n).map(|i| u8::from(i % 2 == 0)).collect();
        let probability: Vec<f64> = (0..n)
            .map(|i| {
                let base = if i % 2 == 0 { 0.7 } else { 0.3 };
                base + 0.004 * f64::from(i as u8) - 0.12
            })
            .collect();
        let predicted = probability.iter().map(|&p| u8::from(p > 0.5)).collect();
        let predictions = HeldOutPredictions {
            target,
            predicted,
            probability,
        };
        let files = plot_predictions(dir.path(), "GenEpi", "CV", &predictions).unwrap();
        for path in [&files.distribution, &files.prevalence, &files.roc] {
            let svg = std::fs::read_to_string(path).unwrap();
            assert!(svg.contains("<svg"));
        }
        assert!(files.roc.ends_with("GenEpi_ROC_CV.svg"));
    }
}
