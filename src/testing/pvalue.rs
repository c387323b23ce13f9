//! Student-t tail probabilities and quantiles

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Lower tail probability P(T <= x) with `df` degrees of freedom (normal for infinite df)
pub fn t_cdf(x: f64, df: f64) -> f64 {
    if x.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    if df.is_infinite() {
        return Normal::new(0.0, 1.0).map(|n| n.cdf(x)).unwrap_or(f64::NAN);
    }
    StudentsT::new(0.0, 1.0, df).map(|t| t.cdf(x)).unwrap_or(f64::NAN)
}

/// Quantile function of the t distribution
pub fn t_quantile(p: f64, df: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) || !(df > 0.0) {
        return f64::NAN;
    }
    if df.is_infinite() {
        return Normal::new(0.0, 1.0).map(|n| n.inverse_cdf(p)).unwrap_or(f64::NAN);
    }
    StudentsT::new(0.0, 1.0, df).map(|t| t.inverse_cdf(p)).unwrap_or(f64::NAN)
}

/// Two-sided p-value of a t-statistic
pub fn pvalue_t(stat: f64, df: f64) -> f64 {
    if !stat.is_finite() {
        return if stat.is_nan() { f64::NAN } else { 0.0 };
    }
    let p = 2.0 * t_cdf(-stat.abs(), df);
    if p.is_nan() {
        p
    } else {
        p.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvalue_symmetric() {
        let p1 = pvalue_t(2.0, 5.0);
        let p2 = pvalue_t(-2.0, 5.0);
        assert!((p1 - p2).abs() < 1e-12);
        assert!((pvalue_t(0.0, 5.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_value() {
        // 2 * pt(-2, 5) = 0.1019395
        assert!((pvalue_t(2.0, 5.0) - 0.101_939_5).abs() < 1e-6);
    }

    #[test]
    fn test_infinite_df_is_normal() {
        // 2 * pnorm(-1.96) = 0.04999579
        assert!((pvalue_t(1.96, f64::INFINITY) - 0.049_995_79).abs() < 1e-7);
        let large = pvalue_t(1.96, 1e6);
        assert!((large - pvalue_t(1.96, f64::INFINITY)).abs() < 1e-5);
    }

    #[test]
    fn test_quantile_inverts_cdf() {
        let q = t_quantile(0.975, 10.0);
        // qt(0.975, 10) = 2.228139
        assert!((q - 2.228_139).abs() < 1e-5);
        assert!((t_cdf(q, 10.0) - 0.975).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(pvalue_t(f64::NAN, 5.0).is_nan());
        assert!(pvalue_t(1.0, 0.0).is_nan());
        assert!(pvalue_t(1.0, -3.0).is_nan());
        assert!(pvalue_t(1.0, f64::NAN).is_nan());
    }
}
