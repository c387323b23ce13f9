//! Statistical utility functions shared across modules
//!
//! Contains robust location estimates, type-7 quantiles, polygamma helpers
//! used by the empirical-Bayes prior and the kernel density mode used by
//! background correction.

use statrs::function::gamma::digamma as statrs_digamma;

/// Number of grid points in the kernel density estimate (R's density() default)
const DENSITY_GRID: usize = 512;

/// Median of the finite values, NaN when none are finite.
pub fn median(values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(f64::total_cmp);
    median_sorted(&finite)
}

/// Median of an already sorted, NaN-free slice.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Mean of the finite values, NaN when none are finite.
pub fn mean_finite(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation (n - 1 denominator) of the finite values.
pub fn sd_finite(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let ss: f64 = finite.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (finite.len() as f64 - 1.0)).sqrt()
}

/// R's quantile type=7 (default): h = (n-1)*p, linear interpolation between
/// the neighbouring order statistics. `sorted_x` must be sorted ascending.
pub fn quantile_type7(sorted_x: &[f64], p: f64) -> f64 {
    let n = sorted_x.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted_x[0];
    }

    let h = (n as f64 - 1.0) * p.clamp(0.0, 1.0);
    let lo = (h.floor() as usize).min(n - 1);
    let hi = (h.ceil() as usize).min(n - 1);

    if lo == hi {
        sorted_x[lo]
    } else {
        let frac = h - lo as f64;
        sorted_x[lo] + frac * (sorted_x[hi] - sorted_x[lo])
    }
}

/// Digamma function
pub fn digamma(x: f64) -> f64 {
    statrs_digamma(x)
}

/// Trigamma function (derivative of digamma)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    if x >= 8.0 {
        let x2 = x * x;
        let mut result = 1.0 / x + 0.5 / x2;
        result += 1.0 / (6.0 * x2 * x);
        result -= 1.0 / (30.0 * x2 * x2 * x);
        result += 1.0 / (42.0 * x2 * x2 * x2 * x);
        return result;
    }

    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    result + trigamma(z)
}

/// Tetragamma function (second derivative of digamma), x > 0
pub fn tetragamma(x: f64) -> f64 {
    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result -= 2.0 / (z * z * z);
        z += 1.0;
    }
    let z2 = z * z;
    let z3 = z2 * z;
    let z4 = z2 * z2;
    result
        - 1.0 / z2
        - 1.0 / z3
        - 1.0 / (2.0 * z4)
        + 1.0 / (6.0 * z4 * z2)
        - 1.0 / (6.0 * z4 * z4)
        + 3.0 / (10.0 * z4 * z4 * z2)
}

/// Inverse of the trigamma function by Newton iteration on 1/trigamma.
///
/// Starting value 0.5 + 1/y; converges in a handful of steps for y > 0.
pub fn trigamma_inverse(y: f64) -> f64 {
    if !y.is_finite() || y <= 0.0 {
        return f64::NAN;
    }
    if y > 1e7 {
        return 1.0 / y.sqrt();
    }
    if y < 1e-6 {
        return 1.0 / y;
    }

    let mut x = 0.5 + 1.0 / y;
    for _ in 0..50 {
        let tri = trigamma(x);
        let dif = tri * (1.0 - tri / y) / tetragamma(x);
        x += dif;
        if -dif / x < 1e-8 {
            break;
        }
    }
    x
}

/// Bandwidth by Silverman's rule of thumb (R's bw.nrd0).
fn bandwidth_nrd0(sorted: &[f64]) -> f64 {
    let n = sorted.len() as f64;
    let sd = sd_finite(sorted);
    let iqr = quantile_type7(sorted, 0.75) - quantile_type7(sorted, 0.25);
    let mut lo = sd.min(iqr / 1.34);
    if !(lo > 0.0) {
        lo = if sd > 0.0 {
            sd
        } else if sorted[0] != 0.0 {
            sorted[0].abs()
        } else {
            1.0
        };
    }
    0.9 * lo * n.powf(-0.2)
}

/// Location of the maximum of a Gaussian kernel density estimate.
///
/// Values are linearly binned onto a 512-point grid spanning
/// `[min - 3 bw, max + 3 bw]` and the kernel is applied on the grid.
/// Returns NaN for an empty input.
pub fn density_mode(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 || sorted[0] == sorted[sorted.len() - 1] {
        return sorted[0];
    }

    let bw = bandwidth_nrd0(&sorted);
    let lo = sorted[0] - 3.0 * bw;
    let hi = sorted[sorted.len() - 1] + 3.0 * bw;
    let step = (hi - lo) / (DENSITY_GRID - 1) as f64;

    let mut bins = vec![0.0; DENSITY_GRID];
    for &v in &sorted {
        let pos = (v - lo) / step;
        let left = (pos.floor() as usize).min(DENSITY_GRID - 1);
        let frac = pos - left as f64;
        bins[left] += 1.0 - frac;
        if left + 1 < DENSITY_GRID {
            bins[left + 1] += frac;
        }
    }

    let reach = ((4.0 * bw) / step).ceil() as usize;
    let mut best_idx = 0;
    let mut best_density = f64::NEG_INFINITY;
    for i in 0..DENSITY_GRID {
        let start = i.saturating_sub(reach);
        let end = (i + reach + 1).min(DENSITY_GRID);
        let density: f64 = (start..end)
            .map(|j| {
                let u = (i as f64 - j as f64) * step / bw;
                bins[j] * (-0.5 * u * u).exp()
            })
            .sum();
        if density > best_density {
            best_density = density;
            best_idx = i;
        }
    }

    lo + best_idx as f64 * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[f64::NAN, 5.0]), 5.0);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_quantile_type7() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_type7(&x, 0.0), 1.0);
        assert_eq!(quantile_type7(&x, 0.5), 3.0);
        assert_eq!(quantile_type7(&x, 1.0), 5.0);
        assert!((quantile_type7(&x, 0.1) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_trigamma_known_values() {
        // trigamma(1) = pi^2 / 6
        let expected = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - expected).abs() < 1e-8);
        // trigamma(x) - trigamma(x + 1) = 1 / x^2
        assert!((trigamma(2.5) - trigamma(3.5) - 1.0 / 6.25).abs() < 1e-10);
    }

    #[test]
    fn test_trigamma_inverse_roundtrip() {
        for x in [0.3, 1.0, 2.5, 10.0, 80.0] {
            let y = trigamma(x);
            let back = trigamma_inverse(y);
            assert!((back - x).abs() / x < 1e-6, "x={} back={}", x, back);
        }
    }

    #[test]
    fn test_tetragamma_recurrence() {
        // psi''(x + 1) = psi''(x) + 2 / x^3
        let x = 1.7;
        assert!((tetragamma(x + 1.0) - tetragamma(x) - 2.0 / (x * x * x)).abs() < 1e-8);
    }

    #[test]
    fn test_density_mode_unimodal() {
        let values: Vec<f64> = (0..200)
            .map(|i| 10.0 + ((i as f64) / 199.0 - 0.5) * 2.0 * ((i % 7) as f64 / 7.0))
            .collect();
        let mode = density_mode(&values);
        assert!((mode - 10.0).abs() < 0.5, "mode = {}", mode);
    }
}
