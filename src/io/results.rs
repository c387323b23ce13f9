//! Differential analysis results

use serde::{Deserialize, Serialize};

/// Statistics for one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub probe_id: String,
    /// Contrast estimate (log2 fold change, or M-value difference)
    pub log_fc: f64,
    /// Average value across samples
    pub ave_expr: f64,
    /// Moderated t-statistic
    pub t: f64,
    pub p_value: f64,
    pub adj_p_value: f64,
    /// Log-odds of differential expression
    pub b: f64,
}

impl DiffRecord {
    /// A record with no estimable statistics
    pub fn missing(probe_id: &str, ave_expr: f64) -> Self {
        Self {
            probe_id: probe_id.to_string(),
            log_fc: f64::NAN,
            ave_expr,
            t: f64::NAN,
            p_value: f64::NAN,
            adj_p_value: f64::NAN,
            b: f64::NAN,
        }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.adj_p_value.is_finite() && self.adj_p_value < alpha
    }
}

/// Output of the differential model: one record per input probe, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    /// Contrast name, e.g. "AD-Control"
    pub contrast: String,
    pub records: Vec<DiffRecord>,
    /// Prior degrees of freedom from the empirical-Bayes step (may be infinite)
    pub df_prior: f64,
    /// Prior variance from the empirical-Bayes step
    pub s2_prior: f64,
}

impl ModelResult {
    pub fn n_probes(&self) -> usize {
        self.records.len()
    }

    /// Significant probes at given alpha level
    pub fn significant(&self, alpha: f64) -> Vec<&DiffRecord> {
        self.records.iter().filter(|r| r.is_significant(alpha)).collect()
    }

    /// Records ranked by adjusted p-value, then raw p-value; NaN last.
    /// `n = None` keeps every record.
    pub fn top_table(&self, n: Option<usize>) -> Vec<&DiffRecord> {
        let mut ranked: Vec<&DiffRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| {
            nan_last(a.adj_p_value, b.adj_p_value).then_with(|| nan_last(a.p_value, b.p_value))
        });
        if let Some(n) = n {
            ranked.truncate(n);
        }
        ranked
    }
}

/// Ascending order with NaN after every number
pub(crate) fn nan_last(a: f64, b: f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Summary of a differential analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub contrast: String,
    pub total_probes: usize,
    pub probes_tested: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub alpha: f64,
    pub df_prior: f64,
    pub s2_prior: f64,
    /// Modeled probes left out of the report for lack of annotation
    #[serde(default)]
    pub unannotated: usize,
}

impl ResultsSummary {
    /// Count tested, significant, up and down rows from `(log_fc, p_value, adj_p_value)`
    pub fn tally<I>(contrast: &str, stats: I, alpha: f64, df_prior: f64, s2_prior: f64) -> Self
    where
        I: IntoIterator<Item = (f64, f64, f64)>,
    {
        let mut summary = Self {
            contrast: contrast.to_string(),
            total_probes: 0,
            probes_tested: 0,
            significant: 0,
            upregulated: 0,
            downregulated: 0,
            alpha,
            df_prior,
            s2_prior,
            unannotated: 0,
        };
        for (log_fc, p_value, adj_p_value) in stats {
            summary.total_probes += 1;
            if p_value.is_finite() {
                summary.probes_tested += 1;
            }
            if adj_p_value.is_finite() && adj_p_value < alpha {
                summary.significant += 1;
                if log_fc > 0.0 {
                    summary.upregulated += 1;
                } else if log_fc < 0.0 {
                    summary.downregulated += 1;
                }
            }
        }
        summary
    }
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Differential Analysis Summary ({})", self.contrast)?;
        writeln!(f, "=================================")?;
        writeln!(f, "Total probes: {}", self.total_probes)?;
        writeln!(f, "Probes tested: {}", self.probes_tested)?;
        if self.unannotated > 0 {
            writeln!(f, "Dropped without annotation: {}", self.unannotated)?;
        }
        writeln!(f, "Significant (adj.P < {}): {}", self.alpha, self.significant)?;
        writeln!(f, "  Up: {}", self.upregulated)?;
        writeln!(f, "  Down: {}", self.downregulated)?;
        writeln!(f, "Prior df: {:.3}, prior variance: {:.4e}", self.df_prior, self.s2_prior)?;
        Ok(())
    }
}
