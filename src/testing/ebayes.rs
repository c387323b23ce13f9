//! Empirical Bayes moderation of per-row variances
//!
//! The residual variances are modeled as scaled chi-square draws around a
//! common prior; the prior degrees of freedom and scale are estimated by the
//! method of moments on log variances. Posterior variances replace the raw
//! ones in the t-statistic, and a log-odds statistic compares a mixture of
//! differential and null rows.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::pvalue::{pvalue_t, t_cdf, t_quantile};
use crate::model::ContrastFit;
use crate::stats::{digamma, median, trigamma, trigamma_inverse};

/// A residual standard deviation this small relative to the row mean counts as zero
const ZERO_VARIANCE_TOL: f64 = 1e-9;

/// Prior df beyond this are handled as infinite in the log-odds kernel
const INFINITE_DF: f64 = 1e6;

/// Parameters of the moderation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EbayesParams {
    /// Assumed proportion of differential rows, for the B statistic
    pub proportion: f64,
    /// Bounds on the standard deviation of true log fold changes, relative to the prior sd
    pub stdev_coef_lim: (f64, f64),
}

impl Default for EbayesParams {
    fn default() -> Self {
        Self {
            proportion: 0.01,
            stdev_coef_lim: (0.1, 4.0),
        }
    }
}

/// Scaled F prior on the residual variances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariancePrior {
    /// Prior degrees of freedom, may be infinite
    pub df: f64,
    /// Prior variance
    pub s2: f64,
}

/// Moderated statistics, one entry per row
#[derive(Debug, Clone)]
pub struct EbayesFit {
    pub prior: VariancePrior,
    pub s2_post: Vec<f64>,
    pub t: Vec<f64>,
    pub df_total: Vec<f64>,
    pub p_value: Vec<f64>,
    /// Log-odds of differential expression
    pub b: Vec<f64>,
}

fn is_usable(sigma: f64, df: f64, ave: f64) -> bool {
    sigma.is_finite() && df > 0.0 && sigma > ZERO_VARIANCE_TOL * ave.abs().max(1.0)
}

/// Method-of-moments fit of the prior to variances `s2` with `df` degrees of freedom
pub fn fit_f_dist(s2: &[f64], df: &[f64]) -> VariancePrior {
    let n = s2.len();
    if n == 0 {
        log::warn!("No rows with residual variance; variances are not moderated");
        return VariancePrior { df: 0.0, s2: f64::NAN };
    }
    if n == 1 {
        return VariancePrior { df: 0.0, s2: s2[0] };
    }

    let m = median(s2);
    let floor = 1e-5 * m;
    let e: Vec<f64> = s2
        .iter()
        .zip(df)
        .map(|(&x, &d)| x.max(floor).ln() - digamma(d / 2.0) + (d / 2.0).ln())
        .collect();
    let emean = e.iter().sum::<f64>() / n as f64;
    let evar_raw = e.iter().map(|v| (v - emean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let evar = evar_raw - df.iter().map(|&d| trigamma(d / 2.0)).sum::<f64>() / n as f64;

    if evar > 0.0 {
        let df_prior = 2.0 * trigamma_inverse(evar);
        let s2_prior = (emean + digamma(df_prior / 2.0) - (df_prior / 2.0).ln()).exp();
        VariancePrior {
            df: df_prior,
            s2: s2_prior,
        }
    } else {
        VariancePrior {
            df: f64::INFINITY,
            s2: emean.exp(),
        }
    }
}

/// Posterior variance of one row
fn squeeze(s2: f64, df: f64, prior: &VariancePrior) -> f64 {
    if prior.df.is_infinite() {
        prior.s2
    } else if prior.df > 0.0 {
        (prior.df * prior.s2 + df * s2) / (prior.df + df)
    } else {
        s2
    }
}

/// Prior variance of the true effects from the largest moderated t-statistics
fn tmixture(t: &[f64], stdev_unscaled: &[f64], df: &[f64], proportion: f64, v0_lim: (f64, f64)) -> f64 {
    let keep: Vec<usize> = (0..t.len()).filter(|&i| t[i].is_finite()).collect();
    let n = keep.len();
    let ntarget = (proportion / 2.0 * n as f64).ceil() as usize;
    if ntarget < 1 {
        return f64::NAN;
    }
    let p = (ntarget as f64 / n as f64).max(proportion);

    let max_df = keep.iter().map(|&i| df[i]).fold(f64::NEG_INFINITY, f64::max);
    let mut abs_t: Vec<(f64, f64)> = keep
        .iter()
        .map(|&i| {
            let mut tt = t[i].abs();
            if df[i] < max_df {
                let tail = t_cdf(-tt, df[i]);
                tt = -t_quantile(tail, max_df);
            }
            (tt, stdev_unscaled[i] * stdev_unscaled[i])
        })
        .collect();
    abs_t.sort_by(|a, b| b.0.total_cmp(&a.0));

    let v0: Vec<f64> = abs_t
        .iter()
        .take(ntarget)
        .enumerate()
        .map(|(r, &(tt, v1))| {
            let p0 = 2.0 * t_cdf(-tt, max_df);
            let ptarget = ((r as f64 + 0.5) / n as f64 - (1.0 - p) * p0) / p;
            let v = if ptarget > p0 {
                let qtarget = -t_quantile(ptarget / 2.0, max_df);
                v1 * ((tt / qtarget).powi(2) - 1.0)
            } else {
                0.0
            };
            v.clamp(v0_lim.0, v0_lim.1)
        })
        .collect();
    v0.iter().sum::<f64>() / v0.len() as f64
}

/// Empirical Bayes moderated statistics for a contrast fit
pub fn ebayes(fit: &ContrastFit, params: &EbayesParams) -> EbayesFit {
    let n = fit.n_probes();
    let usable: Vec<bool> = (0..n)
        .map(|i| fit.estimate[i].is_finite() && is_usable(fit.sigma[i], fit.df_residual[i], fit.ave[i]))
        .collect();
    let excluded = usable.iter().filter(|&&u| !u).count();
    if excluded > 0 {
        log::warn!(
            "{} rows have zero or non-estimable variance; they are excluded from the prior and reported as NaN",
            excluded
        );
    }

    let s2: Vec<f64> = (0..n).filter(|&i| usable[i]).map(|i| fit.sigma[i].powi(2)).collect();
    let df: Vec<f64> = (0..n).filter(|&i| usable[i]).map(|i| fit.df_residual[i]).collect();
    let prior = fit_f_dist(&s2, &df);
    let df_pooled: f64 = df.iter().sum();
    log::debug!("Variance prior: df = {:.4}, s2 = {:.6}", prior.df, prior.s2);

    let rows: Vec<(f64, f64, f64, f64)> = (0..n)
        .into_par_iter()
        .map(|i| {
            if !usable[i] {
                return (f64::NAN, f64::NAN, f64::NAN, f64::NAN);
            }
            let d = fit.df_residual[i];
            let post = squeeze(fit.sigma[i].powi(2), d, &prior);
            let t = fit.estimate[i] / (fit.stdev_unscaled[i] * post.sqrt());
            let df_total = (d + prior.df).min(df_pooled);
            (post, t, df_total, pvalue_t(t, df_total))
        })
        .collect();

    let mut s2_post = Vec::with_capacity(n);
    let mut t = Vec::with_capacity(n);
    let mut df_total = Vec::with_capacity(n);
    let mut p_value = Vec::with_capacity(n);
    for (post, tt, dft, p) in rows {
        s2_post.push(post);
        t.push(tt);
        df_total.push(dft);
        p_value.push(p);
    }

    let b = log_odds(&t, &fit.stdev_unscaled, &df_total, &prior, params);

    EbayesFit {
        prior,
        s2_post,
        t,
        df_total,
        p_value,
        b,
    }
}

fn log_odds(t: &[f64], stdev_unscaled: &[f64], df_total: &[f64], prior: &VariancePrior, params: &EbayesParams) -> Vec<f64> {
    if !(prior.s2 > 0.0 && prior.s2.is_finite()) {
        return vec![f64::NAN; t.len()];
    }
    let proportion = params.proportion;
    let lim = (
        params.stdev_coef_lim.0.powi(2) / prior.s2,
        params.stdev_coef_lim.1.powi(2) / prior.s2,
    );
    let mut var_prior = tmixture(t, stdev_unscaled, df_total, proportion, lim);
    if !var_prior.is_finite() {
        var_prior = 1.0 / prior.s2;
        log::warn!("Estimation of the effect prior variance failed; using 1/s2_prior");
    }
    log::debug!("Effect prior variance: {:.6}", var_prior);

    let infinite_df = prior.df > INFINITE_DF;
    let base = (proportion / (1.0 - proportion)).ln();
    (0..t.len())
        .map(|i| {
            if !t[i].is_finite() {
                return f64::NAN;
            }
            let su2 = stdev_unscaled[i] * stdev_unscaled[i];
            let r = (su2 + var_prior) / su2;
            let t2 = t[i] * t[i];
            let kernel = if infinite_df {
                t2 * (1.0 - 1.0 / r) / 2.0
            } else {
                let d = df_total[i];
                (1.0 + d) / 2.0 * ((t2 + d) / (t2 / r + d)).ln()
            };
            base - r.ln() / 2.0 + kernel
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{ChiSquared, Distribution};

    fn contrast_fit(estimate: Vec<f64>, sigma: Vec<f64>, df: f64) -> ContrastFit {
        let n = estimate.len();
        ContrastFit {
            probe_ids: (0..n).map(|i| format!("p{}", i)).collect(),
            contrast: "B-A".to_string(),
            estimate,
            stdev_unscaled: vec![(2.0_f64 / 5.0).sqrt(); n],
            sigma,
            df_residual: vec![df; n],
            ave: vec![8.0; n],
        }
    }

    #[test]
    fn test_prior_recovers_scaled_chisq() {
        // sigma^2 ~ s0^2 d0 / chisq(d0), observed with d = 4 residual df
        let mut rng = StdRng::seed_from_u64(42);
        let d0 = 6.0;
        let s0_sq = 0.25_f64;
        let prior_chisq = ChiSquared::new(d0).unwrap();
        let resid_chisq = ChiSquared::new(4.0).unwrap();
        let s2: Vec<f64> = (0..5000)
            .map(|_| {
                let sigma2 = s0_sq * d0 / prior_chisq.sample(&mut rng);
                sigma2 * resid_chisq.sample(&mut rng) / 4.0
            })
            .collect();
        let df = vec![4.0; s2.len()];
        let prior = fit_f_dist(&s2, &df);
        assert!(prior.df > 3.0 && prior.df < 12.0, "df0 = {}", prior.df);
        assert!(prior.s2 > 0.15 && prior.s2 < 0.35, "s0^2 = {}", prior.s2);
    }

    #[test]
    fn test_equal_variances_give_infinite_df() {
        let prior = fit_f_dist(&[0.5; 50], &[8.0; 50]);
        assert!(prior.df.is_infinite());
        assert!(prior.s2 > 0.0);
    }

    #[test]
    fn test_posterior_between_raw_and_prior() {
        let prior = VariancePrior { df: 4.0, s2: 1.0 };
        let post = squeeze(4.0, 4.0, &prior);
        assert!((post - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_rows_are_nan() {
        let mut sigma: Vec<f64> = (0..40).map(|i| 0.2 + 0.01 * i as f64).collect();
        sigma[3] = 0.0;
        let mut estimate = vec![0.1; 40];
        estimate[0] = 3.0;
        let moderated = ebayes(&contrast_fit(estimate, sigma, 8.0), &EbayesParams::default());
        assert!(moderated.t[3].is_nan());
        assert!(moderated.p_value[3].is_nan());
        assert!(moderated.b[3].is_nan());
        assert!(moderated.t[0] > 5.0);
        assert!(moderated.p_value[0] < 1e-3);
        assert!(moderated.b[0] > moderated.b[1]);
    }

    #[test]
    fn test_df_total_capped_by_pooled_df() {
        let sigma = vec![0.5, 0.5, 0.5];
        let moderated = ebayes(&contrast_fit(vec![1.0, 0.0, -1.0], sigma, 2.0), &EbayesParams::default());
        assert!(moderated.prior.df.is_infinite());
        for &d in &moderated.df_total {
            assert_eq!(d, 6.0);
        }
    }
}
