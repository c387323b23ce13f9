//! Result reporting: ranked tables, summaries, plot data and gene lists
//!
//! Figures themselves are not rendered; the histogram and plot-data tables
//! carry everything needed to draw them.

mod histogram;

pub use histogram::{histogram, logfc_histogram, pvalue_histogram, HistogramBin, LOGFC_BINS, PVALUE_BINS};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotate::{AnnotatedRecord, AnnotatedResult};
use crate::error::Result;
use crate::io::{write_json, write_lines, write_records, ResultsSummary};

/// Reporting options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// Adjusted p-value threshold for significance
    pub alpha: f64,
    /// Minimum absolute log fold change for the up / down lists
    pub min_lfc: f64,
    /// Keep only the best N rows in the ranked table
    pub top_n: Option<usize>,
    /// Ranked table file name; `.csv` gives comma-separated output
    pub table_name: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            min_lfc: 0.0,
            top_n: None,
            table_name: "results.tsv".to_string(),
        }
    }
}

/// Volcano and mean-difference coordinates of one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub probe_id: String,
    pub gene_symbol: Option<String>,
    /// Volcano x, MD y
    pub log_fc: f64,
    /// Volcano y
    pub neg_log10_p: f64,
    /// MD x
    pub ave_expr: f64,
    pub significant: bool,
}

/// Build plot coordinates for every record
pub fn plot_points(records: &[AnnotatedRecord], alpha: f64) -> Vec<PlotPoint> {
    records
        .iter()
        .map(|r| PlotPoint {
            probe_id: r.probe_id.clone(),
            gene_symbol: r.gene_symbol.clone(),
            log_fc: r.log_fc,
            neg_log10_p: if r.p_value > 0.0 { -r.p_value.log10() } else { f64::NAN },
            ave_expr: r.ave_expr,
            significant: r.is_significant(alpha),
        })
        .collect()
}

/// Gene symbol lists for external enrichment analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneLists {
    /// Significant symbols, best first, without duplicates
    pub significant: Vec<String>,
    pub up: Vec<String>,
    pub down: Vec<String>,
    /// Every symbol that was tested, sorted
    pub universe: Vec<String>,
}

impl GeneLists {
    pub fn from_result(result: &AnnotatedResult, alpha: f64, min_lfc: f64) -> Self {
        let ranked = result.top_table(None);
        let symbols = |keep: &dyn Fn(&AnnotatedRecord) -> bool| -> Vec<String> {
            let mut seen = BTreeSet::new();
            ranked
                .iter()
                .filter(|r| keep(**r))
                .filter_map(|r| r.gene_symbol.clone())
                .filter(|s| seen.insert(s.clone()))
                .collect()
        };

        let significant = symbols(&|r| r.is_significant(alpha));
        let up = symbols(&|r| r.is_significant(alpha) && r.log_fc >= min_lfc && r.log_fc > 0.0);
        let down = symbols(&|r| r.is_significant(alpha) && r.log_fc <= -min_lfc && r.log_fc < 0.0);
        let universe: BTreeSet<String> = result
            .records
            .iter()
            .filter(|r| r.p_value.is_finite())
            .filter_map(|r| r.gene_symbol.clone())
            .collect();

        Self {
            significant,
            up,
            down,
            universe: universe.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.universe.is_empty()
    }
}

/// Paths of the files written by [`write_report`]
#[derive(Debug, Clone, Serialize)]
pub struct ReportFiles {
    pub table: PathBuf,
    pub summary_json: PathBuf,
    pub summary_text: PathBuf,
    pub pvalue_histogram: PathBuf,
    pub logfc_histogram: PathBuf,
    pub plot_data: PathBuf,
    /// Present when the results carry gene symbols
    pub gene_lists: Option<Vec<PathBuf>>,
}

/// Write every report artifact into `out_dir`
pub fn write_report<P: AsRef<Path>>(
    out_dir: P,
    annotated: &AnnotatedResult,
    options: &ReportOptions,
) -> Result<ReportFiles> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    let table = out_dir.join(&options.table_name);
    let ranked: Vec<&AnnotatedRecord> = annotated.top_table(options.top_n);
    write_records(&table, &ranked)?;

    let summary: ResultsSummary = annotated.summary(options.alpha);
    let summary_json = out_dir.join("summary.json");
    write_json(&summary_json, &summary)?;
    let summary_text = out_dir.join("summary.txt");
    fs::write(&summary_text, summary.to_string())?;
    log::info!("\n{}", summary);

    let pvalues: Vec<f64> = annotated.records.iter().map(|r| r.p_value).collect();
    let log_fc: Vec<f64> = annotated.records.iter().map(|r| r.log_fc).collect();
    let pvalue_path = out_dir.join("pvalue_histogram.tsv");
    write_records(&pvalue_path, &pvalue_histogram(&pvalues))?;
    let logfc_path = out_dir.join("logfc_histogram.tsv");
    write_records(&logfc_path, &logfc_histogram(&log_fc))?;

    let plot_data = out_dir.join("plot_data.tsv");
    write_records(&plot_data, &plot_points(&annotated.records, options.alpha))?;

    let lists = GeneLists::from_result(annotated, options.alpha, options.min_lfc);
    let gene_lists = if lists.is_empty() {
        log::debug!("No gene symbols available; gene lists not written");
        None
    } else {
        let paths = vec![
            out_dir.join("genes_significant.txt"),
            out_dir.join("genes_up.txt"),
            out_dir.join("genes_down.txt"),
            out_dir.join("genes_universe.txt"),
        ];
        write_lines(&paths[0], &lists.significant)?;
        write_lines(&paths[1], &lists.up)?;
        write_lines(&paths[2], &lists.down)?;
        write_lines(&paths[3], &lists.universe)?;
        log::info!(
            "Gene lists: {} significant ({} up, {} down) of {} tested symbols",
            lists.significant.len(),
            lists.up.len(),
            lists.down.len(),
            lists.universe.len()
        );
        Some(paths)
    };

    log::info!("Wrote results to {}", out_dir.display());
    Ok(ReportFiles {
        table,
        summary_json,
        summary_text,
        pvalue_histogram: pvalue_path,
        logfc_histogram: logfc_path,
        plot_data,
        gene_lists,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn annotated_record(id: &str, symbol: Option<&str>, lfc: f64, p: f64, adj: f64) -> AnnotatedRecord {
        AnnotatedRecord {
            probe_id: id.to_string(),
            gene_symbol: symbol.map(|s| s.to_string()),
            chromosome: None,
            position: None,
            feature_type: None,
            log_fc: lfc,
            ave_expr: 7.5,
            t: 0.0,
            p_value: p,
            adj_p_value: adj,
            b: 0.0,
        }
    }

    fn annotated() -> AnnotatedResult {
        AnnotatedResult {
            contrast: "AD-Control".to_string(),
            records: vec![
                annotated_record("p1", Some("APP"), 2.0, 1e-6, 1e-4),
                annotated_record("p2", Some("MAPT"), -1.5, 1e-5, 1e-3),
                annotated_record("p3", Some("APP"), 1.0, 1e-4, 0.01),
                annotated_record("p4", Some("GAPDH"), 0.1, 0.6, 0.8),
                annotated_record("p5", None, 3.0, 1e-3, 0.02),
            ],
            unannotated: Vec::new(),
            df_prior: 3.0,
            s2_prior: 0.1,
        }
    }

    #[test]
    fn test_gene_lists() {
        let lists = GeneLists::from_result(&annotated(), 0.05, 0.0);
        assert_eq!(lists.significant, vec!["APP", "MAPT"]);
        assert_eq!(lists.up, vec!["APP"]);
        assert_eq!(lists.down, vec!["MAPT"]);
        assert_eq!(lists.universe, vec!["APP", "GAPDH", "MAPT"]);
    }

    #[test]
    fn test_plot_points() {
        let points = plot_points(&annotated().records, 0.05);
        assert!((points[0].neg_log10_p - 6.0).abs() < 1e-9);
        assert!(points[0].significant);
        assert!(!points[3].significant);
    }

    #[test]
    fn test_write_report_files() {
        let dir = tempdir().unwrap();
        let annotated = annotated();

        let files = write_report(dir.path(), &annotated, &ReportOptions::default()).unwrap();
        let table = fs::read_to_string(&files.table).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("probe_id\tgene_symbol"));
        assert!(lines[1].starts_with("p1\tAPP"));
        assert_eq!(lines.len(), 6);

        let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(&files.summary_json).unwrap()).unwrap();
        assert_eq!(summary["significant"], 4);
        assert_eq!(summary["unannotated"], 0);
        assert!(files.gene_lists.is_some());
        let universe = fs::read_to_string(dir.path().join("genes_universe.txt")).unwrap();
        assert_eq!(universe.lines().count(), 3);
    }

    #[test]
    fn test_summary_matches_table_after_dropped_probes() {
        let dir = tempdir().unwrap();
        let mut annotated = annotated();
        annotated.records.retain(|r| r.probe_id != "p2");
        annotated.unannotated = vec!["p2".to_string()];

        let files = write_report(dir.path(), &annotated, &ReportOptions::default()).unwrap();
        let table = fs::read_to_string(&files.table).unwrap();
        let rows = table.lines().count() - 1;

        let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(&files.summary_json).unwrap()).unwrap();
        assert_eq!(summary["unannotated"], 1);
        assert_eq!(summary["total_probes"], rows + 1);
        assert_eq!(summary["probes_tested"], rows);
        assert_eq!(summary["significant"], 3);
        assert_eq!(summary["downregulated"], 0);
        let text = fs::read_to_string(&files.summary_text).unwrap();
        assert!(text.contains("Dropped without annotation: 1"));
    }
}
