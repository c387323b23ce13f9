//! Per-row ordinary least squares against a design matrix

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::contrast::ContrastSpec;
use super::design::DesignMatrix;
use super::linalg::{invert_spd, quadratic_form};
use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};
use crate::stats::mean_finite;

/// Least squares fit of every row
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub probe_ids: Vec<String>,
    /// Coefficients (rows x design columns); NaN rows were not estimable
    pub coefficients: Array2<f64>,
    /// Residual standard deviation
    pub sigma: Vec<f64>,
    /// Residual degrees of freedom (0 when not estimable)
    pub df_residual: Vec<f64>,
    /// Mean of the observed values of each row
    pub ave: Vec<f64>,
    /// (X'X)^-1 of the full design, shared by complete rows
    cov_unscaled: Vec<f64>,
    /// Per-row (X'X)^-1 for rows fitted on a subset of samples
    row_cov_unscaled: Vec<Option<Vec<f64>>>,
}

/// A contrast evaluated on every row of a fit
#[derive(Debug, Clone)]
pub struct ContrastFit {
    pub probe_ids: Vec<String>,
    pub contrast: String,
    pub estimate: Vec<f64>,
    /// sqrt(c' (X'X)^-1 c)
    pub stdev_unscaled: Vec<f64>,
    pub sigma: Vec<f64>,
    pub df_residual: Vec<f64>,
    pub ave: Vec<f64>,
}

impl ContrastFit {
    pub fn n_probes(&self) -> usize {
        self.probe_ids.len()
    }
}

struct RowFit {
    beta: Vec<f64>,
    sigma: f64,
    df: f64,
    cov: Option<Vec<f64>>,
}

impl RowFit {
    fn not_estimable(n_coefs: usize) -> Self {
        Self {
            beta: vec![f64::NAN; n_coefs],
            sigma: f64::NAN,
            df: 0.0,
            cov: None,
        }
    }
}

fn xtx(design: ArrayView2<'_, f64>, rows: &[usize]) -> Vec<f64> {
    let p = design.ncols();
    let mut a = vec![0.0; p * p];
    for &s in rows {
        for j in 0..p {
            let xj = design[[s, j]];
            if xj == 0.0 {
                continue;
            }
            for k in 0..p {
                a[j * p + k] += xj * design[[s, k]];
            }
        }
    }
    a
}

fn solve_row(design: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, rows: &[usize], inv: &[f64]) -> (Vec<f64>, f64, f64) {
    let p = design.ncols();
    let mut xty = vec![0.0; p];
    for &s in rows {
        for j in 0..p {
            xty[j] += design[[s, j]] * y[s];
        }
    }
    let beta: Vec<f64> = (0..p).map(|j| (0..p).map(|k| inv[j * p + k] * xty[k]).sum()).collect();

    let rss: f64 = rows
        .iter()
        .map(|&s| {
            let fitted: f64 = (0..p).map(|j| design[[s, j]] * beta[j]).sum();
            let r = y[s] - fitted;
            r * r
        })
        .sum();
    let df = (rows.len() - p) as f64;
    let sigma = if df > 0.0 { (rss / df).sqrt() } else { f64::NAN };
    (beta, sigma, df)
}

/// Fit every row of `matrix` by ordinary least squares.
///
/// The design rows must follow the matrix columns exactly. Rows with missing
/// values are fitted on their observed samples; a row whose observed design
/// is rank deficient is reported as not estimable.
pub fn lm_fit(matrix: &IntensityMatrix, design: &DesignMatrix) -> Result<LinearFit> {
    design.check_sample_order(matrix.sample_ids())?;

    let x = design.matrix();
    let (n_samples, p) = x.dim();
    let all_rows: Vec<usize> = (0..n_samples).collect();
    let full_inv = invert_spd(&xtx(x, &all_rows), p)
        .ok_or_else(|| ArrayError::config("the design matrix is not full rank"))?;

    let values = matrix.values();
    let fits: Vec<RowFit> = (0..matrix.n_probes())
        .into_par_iter()
        .map(|i| {
            let y = values.row(i);
            let observed: Vec<usize> = (0..n_samples).filter(|&s| !y[s].is_nan()).collect();
            if observed.len() == n_samples {
                let (beta, sigma, df) = solve_row(x, y, &all_rows, &full_inv);
                return RowFit { beta, sigma, df, cov: None };
            }
            if observed.len() < p {
                return RowFit::not_estimable(p);
            }
            match invert_spd(&xtx(x, &observed), p) {
                Some(inv) => {
                    let (beta, sigma, df) = solve_row(x, y, &observed, &inv);
                    RowFit {
                        beta,
                        sigma,
                        df,
                        cov: Some(inv),
                    }
                }
                None => RowFit::not_estimable(p),
            }
        })
        .collect();

    let n = fits.len();
    let mut coefficients = Array2::zeros((n, p));
    let mut sigma = Vec::with_capacity(n);
    let mut df_residual = Vec::with_capacity(n);
    let mut row_cov_unscaled = Vec::with_capacity(n);
    for (i, fit) in fits.into_iter().enumerate() {
        for (j, b) in fit.beta.into_iter().enumerate() {
            coefficients[[i, j]] = b;
        }
        sigma.push(fit.sigma);
        df_residual.push(fit.df);
        row_cov_unscaled.push(fit.cov);
    }

    let ave = (0..n).map(|i| mean_finite(&values.row(i).to_vec())).collect();
    let not_estimable = df_residual.iter().filter(|&&d| d == 0.0).count();
    if not_estimable > 0 {
        log::warn!("{} rows have no residual degrees of freedom and will be reported as NaN", not_estimable);
    }
    log::info!("Fitted linear model to {} rows", n);

    Ok(LinearFit {
        probe_ids: matrix.probe_ids().to_vec(),
        coefficients,
        sigma,
        df_residual,
        ave,
        cov_unscaled: full_inv,
        row_cov_unscaled,
    })
}

impl LinearFit {
    pub fn n_probes(&self) -> usize {
        self.probe_ids.len()
    }

    /// Unscaled covariance of the coefficients of row `i`
    pub fn cov_unscaled(&self, i: usize) -> &[f64] {
        self.row_cov_unscaled[i].as_deref().unwrap_or(&self.cov_unscaled)
    }

    /// Evaluate a contrast on every row
    pub fn contrast(&self, design: &DesignMatrix, contrast: &ContrastSpec) -> Result<ContrastFit> {
        contrast.check_design(design)?;
        let c = &contrast.weights;

        let (estimate, stdev_unscaled): (Vec<f64>, Vec<f64>) = (0..self.n_probes())
            .map(|i| {
                let beta = self.coefficients.row(i);
                let est: f64 = beta.iter().zip(c).map(|(b, w)| b * w).sum();
                let var = quadratic_form(self.cov_unscaled(i), c);
                let sd = if est.is_nan() { f64::NAN } else { var.max(0.0).sqrt() };
                (est, sd)
            })
            .unzip();

        Ok(ContrastFit {
            probe_ids: self.probe_ids.clone(),
            contrast: contrast.name.clone(),
            estimate,
            stdev_unscaled,
            sigma: self.sigma.clone(),
            df_residual: self.df_residual.clone(),
            ave: self.ave.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleAnnotation;
    use crate::model::DesignBuilder;
    use ndarray::array;

    fn setup() -> (IntensityMatrix, DesignMatrix) {
        let samples: Vec<String> = (1..=6).map(|i| format!("s{}", i)).collect();
        let mut ann = SampleAnnotation::new(samples.clone()).unwrap();
        ann.add_levels("group", ["ctl", "ctl", "ctl", "trt", "trt", "trt"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let design = DesignBuilder::new(&ann).group("group").build().unwrap();
        let matrix = IntensityMatrix::new(
            array![
                [1.0, 2.0, 3.0, 5.0, 6.0, 7.0],
                [4.0, 4.0, 4.0, 4.0, 4.0, 4.0],
                [1.0, f64::NAN, 3.0, 5.0, 6.0, 7.0],
                [1.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, 7.0],
            ],
            vec!["p1".into(), "p2".into(), "p3".into(), "p4".into()],
            samples,
        )
        .unwrap();
        (matrix, design)
    }

    #[test]
    fn test_group_means_and_sigma() {
        let (matrix, design) = setup();
        let fit = lm_fit(&matrix, &design).unwrap();
        assert!((fit.coefficients[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((fit.coefficients[[0, 1]] - 6.0).abs() < 1e-12);
        assert!((fit.sigma[0] - 1.0).abs() < 1e-12);
        assert_eq!(fit.df_residual[0], 4.0);
        assert!((fit.ave[0] - 4.0).abs() < 1e-12);
        assert!(fit.sigma[1] < 1e-12);
    }

    #[test]
    fn test_missing_values_use_observed_samples() {
        let (matrix, design) = setup();
        let fit = lm_fit(&matrix, &design).unwrap();
        assert!((fit.coefficients[[2, 0]] - 2.0).abs() < 1e-12);
        assert_eq!(fit.df_residual[2], 3.0);
        // one sample per group leaves no residual df
        assert_eq!(fit.df_residual[3], 0.0);
        assert!(fit.sigma[3].is_nan());
    }

    #[test]
    fn test_contrast_estimate_and_stdev() {
        let (matrix, design) = setup();
        let fit = lm_fit(&matrix, &design).unwrap();
        let contrast = ContrastSpec::difference(&design, "trt", "ctl").unwrap();
        let cfit = fit.contrast(&design, &contrast).unwrap();
        assert!((cfit.estimate[0] - 4.0).abs() < 1e-12);
        assert!((cfit.stdev_unscaled[0] - (2.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        // p3 has two control samples
        assert!((cfit.stdev_unscaled[2] - (0.5_f64 + 1.0 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_reordered_samples_rejected() {
        let (matrix, _) = setup();
        let mut shuffled: Vec<String> = matrix.sample_ids().to_vec();
        shuffled.reverse();
        let mut ann = SampleAnnotation::new(shuffled).unwrap();
        ann.add_levels("group", ["trt", "trt", "trt", "ctl", "ctl", "ctl"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let design = DesignBuilder::new(&ann).group("group").build().unwrap();
        let err = lm_fit(&matrix, &design).unwrap_err();
        assert!(matches!(err, ArrayError::DimensionMismatch { .. }));
    }
}
