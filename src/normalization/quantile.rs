//! Quantile normalization
//!
//! Every sample is mapped onto one reference distribution, the mean of the
//! per-sample quantile functions. Missing values are left missing: each
//! sample's quantile function is built from its observed values only, and the
//! reference is read back by interpolation. Tied values receive the mean of
//! the reference targets their ranks span.

use ndarray::Array2;
use rayon::prelude::*;

use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};
use crate::stats::quantile_type7;

/// Interpolated value of `reference` at fractional position `p` in [0, 1]
fn reference_at(reference: &[f64], p: f64) -> f64 {
    quantile_type7(reference, p)
}

/// Quantile function evaluated on `n` evenly spaced points (sorted input, no NaN)
fn resample_quantiles(sorted: &[f64], n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![quantile_type7(sorted, 0.5)];
    }
    (0..n)
        .map(|i| quantile_type7(sorted, i as f64 / (n - 1) as f64))
        .collect()
}

/// Reference distribution: mean across samples of each resampled quantile
pub fn reference_distribution(matrix: &IntensityMatrix) -> Result<Vec<f64>> {
    let n = matrix.n_probes();
    let values = matrix.values();

    let per_sample: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| {
            let mut observed: Vec<f64> = values.column(j).iter().copied().filter(|v| !v.is_nan()).collect();
            observed.sort_by(f64::total_cmp);
            observed
        })
        .collect();

    if let Some(j) = per_sample.iter().position(|s| s.is_empty()) {
        return Err(ArrayError::InvalidMatrix {
            reason: format!("sample '{}' has no observed values", matrix.sample_ids()[j]),
        });
    }

    let mut reference = vec![0.0; n];
    for sorted in &per_sample {
        let quantiles = if sorted.len() == n {
            sorted.clone()
        } else {
            resample_quantiles(sorted, n)
        };
        for (r, q) in reference.iter_mut().zip(quantiles) {
            *r += q;
        }
    }
    let m = per_sample.len() as f64;
    reference.iter_mut().for_each(|r| *r /= m);
    Ok(reference)
}

/// Normalized values of one sample given the reference distribution
fn normalize_column(column: &[f64], reference: &[f64]) -> Vec<f64> {
    let mut observed: Vec<(usize, f64)> = column
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, &v)| (i, v))
        .collect();
    observed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let m = observed.len();
    let n = reference.len();
    let target = |rank: usize| -> f64 {
        if m == n {
            reference[rank]
        } else if m == 1 {
            reference_at(reference, 0.5)
        } else {
            reference_at(reference, rank as f64 / (m - 1) as f64)
        }
    };

    let mut out = vec![f64::NAN; column.len()];
    let mut start = 0;
    while start < m {
        let mut end = start + 1;
        while end < m && observed[end].1 == observed[start].1 {
            end += 1;
        }
        let value = if end - start == 1 {
            target(start)
        } else {
            (start..end).map(target).sum::<f64>() / (end - start) as f64
        };
        for &(i, _) in &observed[start..end] {
            out[i] = value;
        }
        start = end;
    }
    out
}

/// Quantile-normalize all samples to a common distribution
pub fn quantile_normalize(matrix: &IntensityMatrix) -> Result<IntensityMatrix> {
    if matrix.n_probes() == 0 {
        return Err(ArrayError::EmptyData {
            reason: "cannot quantile-normalize an empty matrix".to_string(),
        });
    }
    let reference = reference_distribution(matrix)?;
    let values = matrix.values();

    let columns: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| normalize_column(&values.column(j).to_vec(), &reference))
        .collect();

    let mut normalized = Array2::zeros(values.dim());
    for (j, column) in columns.into_iter().enumerate() {
        for (i, v) in column.into_iter().enumerate() {
            normalized[[i, j]] = v;
        }
    }
    matrix.with_values(normalized)
}
