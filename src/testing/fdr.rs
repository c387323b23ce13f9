//! P-value adjustment for multiple testing
//!
//! NaN p-values are ignored: they do not count towards the number of tests
//! and stay NaN in the output.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Adjustment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMethod {
    /// Benjamini-Hochberg false discovery rate
    #[serde(alias = "fdr")]
    Bh,
    /// Benjamini-Yekutieli, FDR under arbitrary dependence
    By,
    Bonferroni,
    Holm,
    /// No adjustment
    None,
}

impl std::str::FromStr for AdjustMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bh" | "fdr" => Ok(AdjustMethod::Bh),
            "by" => Ok(AdjustMethod::By),
            "bonferroni" => Ok(AdjustMethod::Bonferroni),
            "holm" => Ok(AdjustMethod::Holm),
            "none" => Ok(AdjustMethod::None),
            other => Err(format!("unknown adjustment method '{}'", other)),
        }
    }
}

/// Adjust p-values with the given method
pub fn adjust_pvalues(pvalues: &[f64], method: AdjustMethod) -> Vec<f64> {
    match method {
        AdjustMethod::Bh => benjamini_hochberg(pvalues),
        AdjustMethod::By => benjamini_yekutieli(pvalues),
        AdjustMethod::Bonferroni => bonferroni(pvalues),
        AdjustMethod::Holm => holm(pvalues),
        AdjustMethod::None => pvalues.to_vec(),
    }
}

/// Indices of the non-NaN p-values sorted ascending
fn sorted_finite(pvalues: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..pvalues.len()).filter(|&i| !pvalues[i].is_nan()).collect();
    indices.sort_by(|&a, &b| pvalues[a].partial_cmp(&pvalues[b]).unwrap_or(Ordering::Equal));
    indices
}

/// Step-up adjustment `p * m * scale / rank` with a right-to-left running minimum
fn step_up(pvalues: &[f64], scale: f64) -> Vec<f64> {
    let indices = sorted_finite(pvalues);
    let m = indices.len();
    let mut padj = vec![f64::NAN; pvalues.len()];
    let mut cummin = f64::INFINITY;

    for (rank0, &i) in indices.iter().enumerate().rev() {
        let rank = rank0 + 1;
        let adj = (pvalues[i] * m as f64 * scale / rank as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
    }
    padj
}

/// Benjamini-Hochberg FDR correction
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    step_up(pvalues, 1.0)
}

/// Benjamini-Yekutieli correction: BH scaled by the harmonic sum of m
pub fn benjamini_yekutieli(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.iter().filter(|p| !p.is_nan()).count();
    let harmonic: f64 = (1..=m).map(|i| 1.0 / i as f64).sum();
    step_up(pvalues, harmonic.max(1.0))
}

/// Bonferroni family-wise error rate correction
pub fn bonferroni(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.iter().filter(|p| !p.is_nan()).count() as f64;
    pvalues.iter().map(|&p| if p.is_nan() { p } else { (p * m).min(1.0) }).collect()
}

/// Holm step-down correction
pub fn holm(pvalues: &[f64]) -> Vec<f64> {
    let indices = sorted_finite(pvalues);
    let m = indices.len();
    let mut padj = vec![f64::NAN; pvalues.len()];
    let mut cummax: f64 = 0.0;

    for (rank0, &i) in indices.iter().enumerate() {
        let adj = (pvalues[i] * (m - rank0) as f64).min(1.0);
        cummax = cummax.max(adj);
        padj[i] = cummax;
    }
    padj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_known_values() {
        // p.adjust(c(0.01, 0.04, 0.03, 0.005), "BH")
        let adj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005]);
        let expected = [0.02, 0.04, 0.04, 0.02];
        for (a, e) in adj.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12, "{} vs {}", a, e);
        }
    }

    #[test]
    fn test_bh_monotone_and_not_below_raw() {
        let pvalues: Vec<f64> = (0..200).map(|i| ((i * 7919) % 1000) as f64 / 1000.0 + 1e-4).collect();
        let adj = benjamini_hochberg(&pvalues);

        for (p, a) in pvalues.iter().zip(&adj) {
            assert!(a >= p);
            assert!(*a <= 1.0);
        }
        let order = sorted_finite(&pvalues);
        for w in order.windows(2) {
            assert!(adj[w[0]] <= adj[w[1]]);
        }
    }

    #[test]
    fn test_nan_ignored() {
        let adj = benjamini_hochberg(&[0.01, f64::NAN, 0.02]);
        assert!(adj[1].is_nan());
        assert!((adj[0] - 0.02).abs() < 1e-12);
        assert!((adj[2] - 0.02).abs() < 1e-12);
        assert_eq!(bonferroni(&[0.2, f64::NAN])[0], 0.2);
    }

    #[test]
    fn test_holm_and_by() {
        // p.adjust(c(0.01, 0.02, 0.03), "holm") = 0.03 0.04 0.04
        let adj = holm(&[0.01, 0.02, 0.03]);
        assert!((adj[0] - 0.03).abs() < 1e-12);
        assert!((adj[1] - 0.04).abs() < 1e-12);
        assert!((adj[2] - 0.04).abs() < 1e-12);

        let p = [0.01, 0.02, 0.03];
        let bh = benjamini_hochberg(&p);
        let by = benjamini_yekutieli(&p);
        let h3 = 1.0 + 0.5 + 1.0 / 3.0;
        for (b, y) in bh.iter().zip(&by) {
            assert!((y - (b * h3).min(1.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("BH".parse::<AdjustMethod>().unwrap(), AdjustMethod::Bh);
        assert_eq!("fdr".parse::<AdjustMethod>().unwrap(), AdjustMethod::Bh);
        assert!("hommel".parse::<AdjustMethod>().is_err());
    }
}
