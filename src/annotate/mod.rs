//! Joining differential results to probe annotation
//!
//! Both sides are sorted by probe ID and merged with the keys compared at
//! every step, so a record can only ever receive the annotation filed under
//! its own ID. Probes without annotation are handled by an explicit
//! [`CoveragePolicy`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::data::{AnnotationTable, ProbeAnnotation};
use crate::error::{ArrayError, Result};
use crate::io::{nan_last, DiffRecord, ModelResult, ResultsSummary};
use crate::normalization::ArrayType;

/// How many missing IDs an integrity error lists
const REPORTED_MISSING: usize = 5;

/// What to do with result rows that have no annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum CoveragePolicy {
    /// Every result row must be annotated
    Strict,
    /// Unannotated rows are dropped, up to a fraction of all rows
    Tolerant { max_missing_fraction: f64 },
}

impl CoveragePolicy {
    pub fn tolerant() -> Self {
        CoveragePolicy::Tolerant {
            max_missing_fraction: 0.5,
        }
    }

    /// Strict for expression arrays, tolerant for methylation arrays
    pub fn for_array_type(array_type: ArrayType) -> Self {
        match array_type {
            ArrayType::Expression => CoveragePolicy::Strict,
            ArrayType::Methylation => CoveragePolicy::tolerant(),
        }
    }
}

/// A result record with its annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    pub probe_id: String,
    pub gene_symbol: Option<String>,
    pub chromosome: Option<String>,
    pub position: Option<u64>,
    pub feature_type: Option<String>,
    pub log_fc: f64,
    pub ave_expr: f64,
    pub t: f64,
    pub p_value: f64,
    pub adj_p_value: f64,
    pub b: f64,
}

impl AnnotatedRecord {
    fn join(record: &DiffRecord, annotation: &ProbeAnnotation) -> Self {
        Self {
            probe_id: record.probe_id.clone(),
            gene_symbol: annotation.gene_symbol.clone(),
            chromosome: annotation.chromosome.clone(),
            position: annotation.position,
            feature_type: annotation.feature_type.clone(),
            log_fc: record.log_fc,
            ave_expr: record.ave_expr,
            t: record.t,
            p_value: record.p_value,
            adj_p_value: record.adj_p_value,
            b: record.b,
        }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.adj_p_value.is_finite() && self.adj_p_value < alpha
    }
}

/// Annotated results, in the order of the model result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedResult {
    pub contrast: String,
    pub records: Vec<AnnotatedRecord>,
    /// Probes dropped for lack of annotation (sorted)
    pub unannotated: Vec<String>,
    pub df_prior: f64,
    pub s2_prior: f64,
}

impl AnnotatedResult {
    /// Results carried over with empty annotation columns
    pub fn without_annotation(result: &ModelResult) -> Self {
        let empty = ProbeAnnotation::new("");
        Self {
            contrast: result.contrast.clone(),
            records: result.records.iter().map(|r| AnnotatedRecord::join(r, &empty)).collect(),
            unannotated: Vec::new(),
            df_prior: result.df_prior,
            s2_prior: result.s2_prior,
        }
    }

    /// Records sorted by adjusted p-value, then raw p-value; NaN last
    pub fn top_table(&self, n: Option<usize>) -> Vec<&AnnotatedRecord> {
        let mut sorted: Vec<&AnnotatedRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| {
            nan_last(a.adj_p_value, b.adj_p_value).then_with(|| nan_last(a.p_value, b.p_value))
        });
        if let Some(n) = n {
            sorted.truncate(n);
        }
        sorted
    }

    /// Counts over the reported records; dropped probes are counted separately
    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        let stats = self.records.iter().map(|r| (r.log_fc, r.p_value, r.adj_p_value));
        let mut summary = ResultsSummary::tally(&self.contrast, stats, alpha, self.df_prior, self.s2_prior);
        summary.unannotated = self.unannotated.len();
        summary.total_probes += self.unannotated.len();
        summary
    }
}

fn check_sorted_unique<'a, I: Iterator<Item = &'a str>>(ids: I, side: &str) -> Result<()> {
    let mut previous: Option<&str> = None;
    for id in ids {
        if let Some(prev) = previous {
            if prev == id {
                return Err(ArrayError::Integrity {
                    reason: format!("probe ID '{}' occurs more than once in the {}", id, side),
                });
            }
        }
        previous = Some(id);
    }
    Ok(())
}

/// Join results to annotation under the given coverage policy
pub fn annotate(result: &ModelResult, table: &AnnotationTable, policy: CoveragePolicy) -> Result<AnnotatedResult> {
    let mut left: Vec<usize> = (0..result.records.len()).collect();
    left.sort_by(|&a, &b| result.records[a].probe_id.cmp(&result.records[b].probe_id));
    let right = table.sorted_by_id();

    check_sorted_unique(left.iter().map(|&i| result.records[i].probe_id.as_str()), "results")?;
    check_sorted_unique(right.iter().map(|a| a.probe_id.as_str()), "annotation table")?;

    let mut matched: Vec<Option<&ProbeAnnotation>> = vec![None; result.records.len()];
    let mut missing: Vec<String> = Vec::new();
    let mut j = 0;
    for &i in &left {
        let id = result.records[i].probe_id.as_str();
        while j < right.len() && right[j].probe_id.as_str() < id {
            j += 1;
        }
        match right.get(j).map(|a| a.probe_id.as_str().cmp(id)) {
            Some(Ordering::Equal) => {
                matched[i] = Some(right[j]);
                j += 1;
            }
            _ => missing.push(id.to_string()),
        }
    }

    if !missing.is_empty() {
        let total = result.records.len();
        let listed: Vec<&str> = missing.iter().take(REPORTED_MISSING).map(|s| s.as_str()).collect();
        match policy {
            CoveragePolicy::Strict => {
                return Err(ArrayError::Integrity {
                    reason: format!(
                        "{} of {} probes have no annotation, first missing: {}",
                        missing.len(),
                        total,
                        listed.join(", ")
                    ),
                });
            }
            CoveragePolicy::Tolerant { max_missing_fraction } => {
                let fraction = missing.len() as f64 / total as f64;
                if fraction > max_missing_fraction {
                    return Err(ArrayError::Integrity {
                        reason: format!(
                            "{} of {} probes ({:.1}%) have no annotation, above the tolerated {:.1}%; first missing: {}",
                            missing.len(),
                            total,
                            fraction * 100.0,
                            max_missing_fraction * 100.0,
                            listed.join(", ")
                        ),
                    });
                }
                log::warn!(
                    "Dropping {} of {} probes without annotation (first: {})",
                    missing.len(),
                    total,
                    listed.join(", ")
                );
            }
        }
    }

    let records: Vec<AnnotatedRecord> = result
        .records
        .iter()
        .zip(&matched)
        .filter_map(|(record, annotation)| annotation.map(|a| AnnotatedRecord::join(record, a)))
        .collect();
    log::info!("Annotated {} probes", records.len());

    Ok(AnnotatedResult {
        contrast: result.contrast.clone(),
        records,
        unannotated: missing,
        df_prior: result.df_prior,
        s2_prior: result.s2_prior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn record(id: &str, p: f64) -> DiffRecord {
        DiffRecord {
            probe_id: id.to_string(),
            log_fc: p * 10.0,
            ave_expr: 7.0,
            t: 1.0,
            p_value: p,
            adj_p_value: p,
            b: 0.0,
        }
    }

    fn model_result(ids: &[String]) -> ModelResult {
        ModelResult {
            contrast: "AD-Control".to_string(),
            records: ids
                .iter()
                .enumerate()
                .map(|(i, id)| record(id, (i + 1) as f64 / 100.0))
                .collect(),
            df_prior: 4.0,
            s2_prior: 0.1,
        }
    }

    #[test]
    fn test_shuffled_join_recovers_every_symbol() {
        let ids: Vec<String> = (0..200).map(|i| format!("cg{:08}", (i * 7919) % 100_000)).collect();
        let mut rng = StdRng::seed_from_u64(17);

        let mut result_ids = ids.clone();
        result_ids.shuffle(&mut rng);
        let result = model_result(&result_ids);

        let mut annotation_ids = ids.clone();
        annotation_ids.shuffle(&mut rng);
        let table = AnnotationTable::new(
            annotation_ids
                .iter()
                .map(|id| ProbeAnnotation::new(id).with_symbol(&format!("GENE_{}", id)))
                .collect(),
        )
        .unwrap();

        let annotated = annotate(&result, &table, CoveragePolicy::Strict).unwrap();
        assert_eq!(annotated.records.len(), ids.len());
        for (rec, orig) in annotated.records.iter().zip(&result.records) {
            assert_eq!(rec.probe_id, orig.probe_id);
            assert_eq!(rec.p_value, orig.p_value);
            assert_eq!(rec.gene_symbol.as_deref(), Some(format!("GENE_{}", rec.probe_id).as_str()));
        }
    }

    #[test]
    fn test_strict_policy_names_missing_ids() {
        let result = model_result(&["p1".to_string(), "p2".to_string(), "p3".to_string()]);
        let table = AnnotationTable::new(vec![ProbeAnnotation::new("p1"), ProbeAnnotation::new("p3")]).unwrap();
        let err = annotate(&result, &table, CoveragePolicy::Strict).unwrap_err();
        assert!(matches!(err, ArrayError::Integrity { .. }));
        assert!(err.to_string().contains("p2"));
    }

    #[test]
    fn test_tolerant_policy_keeps_intersection() {
        let ids: Vec<String> = (0..10).map(|i| format!("cg{}", i)).collect();
        let result = model_result(&ids);
        let table = AnnotationTable::new(
            ids.iter()
                .filter(|id| id.as_str() != "cg3" && id.as_str() != "cg7")
                .map(|id| ProbeAnnotation::new(id).with_symbol("X"))
                .collect(),
        )
        .unwrap();

        let annotated = annotate(&result, &table, CoveragePolicy::tolerant()).unwrap();
        assert_eq!(annotated.records.len(), 8);
        assert_eq!(annotated.unannotated, vec!["cg3".to_string(), "cg7".to_string()]);

        let too_strict = CoveragePolicy::Tolerant {
            max_missing_fraction: 0.1,
        };
        assert!(annotate(&result, &table, too_strict).is_err());
    }

    #[test]
    fn test_extra_annotation_rows_are_ignored() {
        let result = model_result(&["b".to_string()]);
        let table = AnnotationTable::new(vec![
            ProbeAnnotation::new("a"),
            ProbeAnnotation::new("b").with_symbol("B1"),
            ProbeAnnotation::new("c"),
        ])
        .unwrap();
        let annotated = annotate(&result, &table, CoveragePolicy::Strict).unwrap();
        assert_eq!(annotated.records[0].gene_symbol.as_deref(), Some("B1"));
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(CoveragePolicy::for_array_type(ArrayType::Expression), CoveragePolicy::Strict);
        assert!(matches!(
            CoveragePolicy::for_array_type(ArrayType::Methylation),
            CoveragePolicy::Tolerant { .. }
        ));
    }
}
