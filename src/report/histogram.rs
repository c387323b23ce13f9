//! Fixed-width histograms of result columns

use serde::{Deserialize, Serialize};

/// Number of p-value bins on [0, 1]
pub const PVALUE_BINS: usize = 20;
/// Number of log fold change bins across the observed range
pub const LOGFC_BINS: usize = 40;

/// One histogram bin; the last bin of a histogram also holds its upper edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub variable: String,
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: usize,
}

/// Histogram of the finite `values` over `[lo, hi]` in `n_bins` equal bins.
///
/// Values outside the range are not counted. An empty input or a degenerate
/// range yields a single bin holding every finite value.
pub fn histogram(variable: &str, values: &[f64], n_bins: usize, lo: f64, hi: f64) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if n_bins == 0 || !(hi > lo) {
        return vec![HistogramBin {
            variable: variable.to_string(),
            bin_start: lo,
            bin_end: hi,
            count: finite.len(),
        }];
    }

    let width = (hi - lo) / n_bins as f64;
    let mut counts = vec![0usize; n_bins];
    for v in finite {
        if v < lo || v > hi {
            continue;
        }
        let bin = (((v - lo) / width).floor() as usize).min(n_bins - 1);
        counts[bin] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            variable: variable.to_string(),
            bin_start: lo + i as f64 * width,
            bin_end: if i + 1 == n_bins { hi } else { lo + (i + 1) as f64 * width },
            count,
        })
        .collect()
}

/// Raw p-value histogram on [0, 1]
pub fn pvalue_histogram(pvalues: &[f64]) -> Vec<HistogramBin> {
    histogram("p_value", pvalues, PVALUE_BINS, 0.0, 1.0)
}

/// Log fold change histogram over the observed range
pub fn logfc_histogram(log_fc: &[f64]) -> Vec<HistogramBin> {
    let (lo, hi) = log_fc
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return histogram("log_fc", log_fc, LOGFC_BINS, 0.0, 0.0);
    }
    histogram("log_fc", log_fc, LOGFC_BINS, lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvalue_bins_cover_unit_interval() {
        let pvalues = vec![0.0, 0.01, 0.049, 0.06, 0.52, 0.99, 1.0, f64::NAN];
        let bins = pvalue_histogram(&pvalues);
        assert_eq!(bins.len(), PVALUE_BINS);
        assert_eq!(bins[0].count, 3);
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[10].count, 1);
        assert_eq!(bins[19].count, 2);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 7);
        assert_eq!(bins[19].bin_end, 1.0);
    }

    #[test]
    fn test_logfc_range() {
        let bins = logfc_histogram(&[-2.0, 0.05, 2.0]);
        assert_eq!(bins.len(), LOGFC_BINS);
        assert_eq!(bins[0].bin_start, -2.0);
        assert_eq!(bins[LOGFC_BINS - 1].count, 1);
        assert_eq!(bins[LOGFC_BINS / 2].count, 1);
    }

    #[test]
    fn test_degenerate_input() {
        let bins = logfc_histogram(&[f64::NAN]);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 0);
        let bins = logfc_histogram(&[1.0, 1.0]);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 2);
    }
}
