//! RMA background correction
//!
//! Each sample is modeled as a normal background plus an exponential signal.
//! The background mode and spread come from the lower half of the intensity
//! density, the signal rate from the mode of the values above it; intensities
//! are replaced by the conditional expectation of the signal.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};
use crate::stats::density_mode;

/// Background correction method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMethod {
    None,
    /// Normal + exponential convolution model
    Rma,
}

/// Fitted convolution parameters for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundParams {
    /// Background mean
    pub mu: f64,
    /// Background standard deviation
    pub sigma: f64,
    /// Rate of the exponential signal
    pub alpha: f64,
}

/// Estimate the convolution parameters from the finite values of one sample
pub fn estimate_background(values: &[f64]) -> Option<BackgroundParams> {
    let pm: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if pm.len() < 3 {
        return None;
    }

    let first_mode = density_mode(&pm);
    let below: Vec<f64> = pm.iter().copied().filter(|&v| v < first_mode).collect();
    let mode = density_mode(&below);
    if !mode.is_finite() {
        return None;
    }

    let bg: Vec<f64> = pm.iter().filter(|&&v| v < mode).map(|&v| v - mode).collect();
    if bg.len() < 2 {
        return None;
    }
    let sigma = (bg.iter().map(|v| v * v).sum::<f64>() / (bg.len() as f64 - 1.0)).sqrt() * 2.0_f64.sqrt();

    let signal: Vec<f64> = pm.iter().filter(|&&v| v > mode).map(|&v| v - mode).collect();
    let exp_mean = density_mode(&signal);
    if !(exp_mean > 0.0) || !(sigma > 0.0) {
        return None;
    }

    Some(BackgroundParams {
        mu: mode,
        sigma,
        alpha: 1.0 / exp_mean,
    })
}

/// Ratio dnorm(z) / pnorm(z), stable in the lower tail
fn mills_ratio(z: f64) -> f64 {
    if z < -30.0 {
        return -z / (1.0 - 1.0 / (z * z));
    }
    let pdf = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let cdf = 0.5 * erfc(-z / std::f64::consts::SQRT_2);
    pdf / cdf
}

/// Background-adjusted values for one sample; missing values stay missing
pub fn adjust_background(values: &[f64], params: &BackgroundParams) -> Vec<f64> {
    let BackgroundParams { mu, sigma, alpha } = *params;
    values
        .iter()
        .map(|&pm| {
            if pm.is_nan() {
                return f64::NAN;
            }
            let a = pm - mu - alpha * sigma * sigma;
            a + sigma * mills_ratio(a / sigma)
        })
        .collect()
}

/// RMA background correction of every sample
pub fn rma_background(matrix: &IntensityMatrix) -> Result<IntensityMatrix> {
    let values = matrix.values();
    let sample_ids = matrix.sample_ids();

    let columns: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| {
            let column: Vec<f64> = values.column(j).to_vec();
            match estimate_background(&column) {
                Some(params) => {
                    log::debug!(
                        "background {}: mu={:.4} sigma={:.4} alpha={:.6}",
                        sample_ids[j],
                        params.mu,
                        params.sigma,
                        params.alpha
                    );
                    adjust_background(&column, &params)
                }
                None => {
                    log::warn!(
                        "Background parameters not estimable for sample '{}'; values left uncorrected",
                        sample_ids[j]
                    );
                    column
                }
            }
        })
        .collect();

    let mut corrected = Array2::zeros(values.dim());
    for (j, column) in columns.into_iter().enumerate() {
        for (i, v) in column.into_iter().enumerate() {
            corrected[[i, j]] = v;
        }
    }

    if corrected.iter().any(|v| v.is_infinite()) {
        return Err(ArrayError::InvalidMatrix {
            reason: "background correction produced non-finite values".to_string(),
        });
    }
    matrix.with_values(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Exp, Normal as NormalDist};

    fn convolution_sample(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let bg = NormalDist::new(100.0, 15.0).unwrap();
        let signal = Exp::new(1.0 / 300.0).unwrap();
        (0..n).map(|_| bg.sample(&mut rng) + signal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_adjusted_values_are_positive() {
        let values = convolution_sample(5000, 7);
        let params = estimate_background(&values).unwrap();
        assert!(params.mu > 50.0 && params.mu < 200.0, "mu = {}", params.mu);
        let adjusted = adjust_background(&values, &params);
        assert!(adjusted.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_adjustment_preserves_order() {
        let values = convolution_sample(2000, 11);
        let params = estimate_background(&values).unwrap();
        let adjusted = adjust_background(&values, &params);

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        for w in order.windows(2) {
            assert!(adjusted[w[0]] <= adjusted[w[1]] + 1e-9);
        }
    }

    #[test]
    fn test_missing_values_stay_missing() {
        let mut values = convolution_sample(500, 3);
        values[10] = f64::NAN;
        let params = estimate_background(&values).unwrap();
        let adjusted = adjust_background(&values, &params);
        assert!(adjusted[10].is_nan());
        assert!(adjusted[11].is_finite());
    }
}
