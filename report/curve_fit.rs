//! Least-squares curve fits drawn over the diagnostic plots.
//!
//! Both fits minimise the sum of squared residuals with BFGS. Bounded or positive
//! parameters are optimised in an unconstrained transform and mapped back.

use super::ReportError;
use crate::fit::logistic::sigmoid;
use ndarray::{Array1, array};
use wolfe_bfgs::{Bfgs, BfgsSolution};

const TOLERANCE: f64 = 1e-6;
const MAX_ITERATIONS: usize = 500;

/// `amplitude * exp(-((x - mean) / width)^2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianCurve {
    pub mean: f64,
    pub amplitude: f64,
    pub width: f64,
}

impl GaussianCurve {
    pub fn eval(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.width;
        self.amplitude * (-z * z).exp()
    }
}

/// `1 / (1 + exp(-slope * (x - midpoint)))` with `slope` in `[0, 1]` and `midpoint` in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SigmoidCurve {
    pub slope: f64,
    pub midpoint: f64,
}

impl SigmoidCurve {
    pub const MAX_SLOPE: f64 = 1.0;
    pub const MAX_MIDPOINT: f64 = 100.0;

    pub fn eval(&self, x: f64) -> f64 {
        sigmoid(self.slope * (x - self.midpoint))
    }
}

fn check_points(x: &[f64], y: &[f64], required: usize) -> Result<(), ReportError> {
    if x.len() != y.len() {
        return Err(ReportError::CurveFit(format!(
            "{} abscissae for {} ordinates",
            x.len(),
            y.len()
        )));
    }
    if x.len() < required {
        return Err(ReportError::CurveFit(format!(
            "{} points cannot determine {required} parameters",
            x.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(ReportError::CurveFit("non-finite input point".into()));
    }
    Ok(())
}

fn minimise(
    start: Array1<f64>,
    cost_and_grad: impl Fn(&Array1<f64>) -> (f64, Array1<f64>),
) -> Result<Array1<f64>, ReportError> {
    let BfgsSolution {
        final_point,
        final_value,
        iterations,
        ..
    } = Bfgs::new(start, cost_and_grad)
        .with_tolerance(TOLERANCE)
        .with_max_iterations(MAX_ITERATIONS)
        .run()
        .map_err(|e| ReportError::CurveFit(format!("BFGS failed: {e:?}")))?;
    log::debug!("Curve fit converged in {iterations} iterations, residual {final_value:.3e}");
    Ok(final_point)
}

/// Fits a Gaussian bump to histogram heights at the given bin centres.
pub fn fit_gaussian(x: &[f64], y: &[f64]) -> Result<GaussianCurve, ReportError> {
    check_points(x, y, 3)?;
    let total: f64 = y.iter().sum();
    let peak = y.iter().copied().fold(0.0, f64::max);
    if total <= 0.0 || peak <= 0.0 {
        return Err(ReportError::CurveFit("histogram has no mass".into()));
    }
    let mean = x.iter().zip(y).map(|(xi, yi)| xi * yi).sum::<f64>() / total;
    let variance = x.iter().zip(y).map(|(xi, yi)| yi * (xi - mean).powi(2)).sum::<f64>() / total;
    let spacing = (x[x.len() - 1] - x[0]).abs() / (x.len() - 1) as f64;
    let width = (2.0 * variance).sqrt().max(spacing).max(f64::EPSILON);

    // Parameters: mean, amplitude, ln(width).
    let cost_and_grad = |theta: &Array1<f64>| -> (f64, Array1<f64>) {
        let (mu, amp, width) = (theta[0], theta[1], theta[2].exp());
        let mut cost = 0.0;
        let mut grad = Array1::zeros(3);
        for (&xi, &yi) in x.iter().zip(y) {
            let z = (xi - mu) / width;
            let bump = (-z * z).exp();
            let residual = amp * bump - yi;
            cost += residual * residual;
            grad[0] += 2.0 * residual * amp * bump * 2.0 * z / width;
            grad[1] += 2.0 * residual * bump;
            grad[2] += 2.0 * residual * amp * bump * 2.0 * z * z;
        }
        (cost, grad)
    };
    let theta = minimise(array![mean, peak, width.ln()], cost_and_grad)?;
    let curve = GaussianCurve {
        mean: theta[0],
        amplitude: theta[1],
        width: theta[2].exp(),
    };
    if [curve.mean, curve.amplitude, curve.width].iter().all(|v| v.is_finite()) {
        Ok(curve)
    } else {
        Err(ReportError::CurveFit(format!("non-finite Gaussian parameters {curve:?}")))
    }
}

/// Fits the bounded sigmoid to `(percentile, mean probability)` points.
pub fn fit_sigmoid(x: &[f64], y: &[f64]) -> Result<SigmoidCurve, ReportError> {
    check_points(x, y, 2)?;

    // Parameters: logit(slope / MAX_SLOPE), logit(midpoint / MAX_MIDPOINT).
    let unpack = |theta: &Array1<f64>| SigmoidCurve {
        slope: SigmoidCurve::MAX_SLOPE * sigmoid(theta[0]),
        midpoint: SigmoidCurve::MAX_MIDPOINT * sigmoid(theta[1]),
    };
    let cost_and_grad = |theta: &Array1<f64>| -> (f64, Array1<f64>) {
        let curve = unpack(theta);
        let slope_scale = curve.slope * (1.0 - curve.slope / SigmoidCurve::MAX_SLOPE);
        let midpoint_scale = curve.midpoint * (1.0 - curve.midpoint / SigmoidCurve::MAX_MIDPOINT);
        let mut cost = 0.0;
        let mut grad = Array1::zeros(2);
        for (&xi, &yi) in x.iter().zip(y) {
            let f = curve.eval(xi);
            let residual = f - yi;
            let df = f * (1.0 - f);
            cost += residual * residual;
            grad[0] += 2.0 * residual * df * (xi - curve.midpoint) * slope_scale;
            grad[1] -= 2.0 * residual * df * curve.slope * midpoint_scale;
        }
        (cost, grad)
    };
    let theta = minimise(array![0.0, 0.0], cost_and_grad)?;
    Ok(unpack(&theta))
}
