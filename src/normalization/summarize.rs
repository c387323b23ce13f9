//! Probe set summarization by Tukey's median polish

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};
use crate::stats::median;

const MEDPOLISH_MAXITER: usize = 10;
const MEDPOLISH_EPS: f64 = 0.01;

/// Fit of an additive model `x[i, j] = overall + row[i] + col[j] + residual`
#[derive(Debug, Clone)]
pub struct MedianPolish {
    pub overall: f64,
    pub row_effects: Vec<f64>,
    pub col_effects: Vec<f64>,
    pub residuals: Array2<f64>,
}

/// Median polish of a (probes x samples) block; missing values are ignored
pub fn median_polish(block: ArrayView2<'_, f64>) -> MedianPolish {
    let (nr, nc) = block.dim();
    let mut z = block.to_owned();
    let mut t = 0.0;
    let mut r = vec![0.0; nr];
    let mut c = vec![0.0; nc];
    let mut old_sum = 0.0;

    for _ in 0..MEDPOLISH_MAXITER {
        let row_delta: Vec<f64> = (0..nr)
            .map(|i| median(&z.row(i).to_vec()))
            .map(|m| if m.is_nan() { 0.0 } else { m })
            .collect();
        for i in 0..nr {
            for j in 0..nc {
                z[[i, j]] -= row_delta[i];
            }
            r[i] += row_delta[i];
        }
        let delta = median(&c);
        c.iter_mut().for_each(|v| *v -= delta);
        t += delta;

        let col_delta: Vec<f64> = (0..nc)
            .map(|j| median(&z.column(j).to_vec()))
            .map(|m| if m.is_nan() { 0.0 } else { m })
            .collect();
        for j in 0..nc {
            for i in 0..nr {
                z[[i, j]] -= col_delta[j];
            }
            c[j] += col_delta[j];
        }
        let delta = median(&r);
        r.iter_mut().for_each(|v| *v -= delta);
        t += delta;

        let new_sum: f64 = z.iter().filter(|v| !v.is_nan()).map(|v| v.abs()).sum();
        let converged = new_sum == 0.0 || (new_sum - old_sum).abs() < MEDPOLISH_EPS * new_sum;
        old_sum = new_sum;
        if converged {
            break;
        }
    }

    MedianPolish {
        overall: t,
        row_effects: r,
        col_effects: c,
        residuals: z,
    }
}

/// Summarize probes into one value per probe set (overall + sample effect).
///
/// `groups[i]` names the probe set of row `i`; output rows follow the order
/// of first appearance and are identified by the group name.
pub fn summarize_probe_groups(matrix: &IntensityMatrix, groups: &[String]) -> Result<IntensityMatrix> {
    if groups.len() != matrix.n_probes() {
        return Err(ArrayError::DimensionMismatch {
            expected: format!("{} probe groups", matrix.n_probes()),
            got: format!("{} probe groups", groups.len()),
        });
    }

    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        members
            .entry(group.as_str())
            .or_insert_with(|| {
                order.push(group.clone());
                Vec::new()
            })
            .push(i);
    }

    let values = matrix.values();
    let n_samples = matrix.n_samples();
    let summaries: Vec<Vec<f64>> = order
        .par_iter()
        .map(|group| {
            let rows = &members[group.as_str()];
            if rows.len() == 1 {
                return values.row(rows[0]).to_vec();
            }
            let block = values.select(ndarray::Axis(0), rows);
            let fit = median_polish(block.view());
            (0..n_samples)
                .map(|j| {
                    let observed = block.column(j).iter().any(|v| !v.is_nan());
                    if observed {
                        fit.overall + fit.col_effects[j]
                    } else {
                        f64::NAN
                    }
                })
                .collect()
        })
        .collect();

    let mut summarized = Array2::zeros((order.len(), n_samples));
    for (g, row) in summaries.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            summarized[[g, j]] = v;
        }
    }

    log::info!("Summarized {} probes into {} probe sets", matrix.n_probes(), order.len());
    IntensityMatrix::new(summarized, order, matrix.sample_ids().to_vec())
}
