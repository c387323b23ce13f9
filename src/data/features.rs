//! Probe-level genomic annotation

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ArrayError, Result};

/// Annotation of one probe or CpG site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeAnnotation {
    pub probe_id: String,
    pub gene_symbol: Option<String>,
    pub chromosome: Option<String>,
    pub position: Option<u64>,
    /// Feature type, e.g. "Island" / "Shore" for CpGs or "main" for probe sets
    pub feature_type: Option<String>,
}

impl ProbeAnnotation {
    pub fn new(probe_id: &str) -> Self {
        Self {
            probe_id: probe_id.to_string(),
            gene_symbol: None,
            chromosome: None,
            position: None,
            feature_type: None,
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.gene_symbol = Some(symbol.to_string());
        self
    }
}

/// Read-only reference mapping probe identifiers to genomic annotation
#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    records: Vec<ProbeAnnotation>,
}

impl AnnotationTable {
    /// Build a table; probe identifiers must be unique
    pub fn new(records: Vec<ProbeAnnotation>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.probe_id.as_str()) {
                return Err(ArrayError::Integrity {
                    reason: format!("duplicate annotation ID '{}'", record.probe_id),
                });
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ProbeAnnotation] {
        &self.records
    }

    /// Records sorted by probe identifier
    pub fn sorted_by_id(&self) -> Vec<&ProbeAnnotation> {
        let mut sorted: Vec<&ProbeAnnotation> = self.records.iter().collect();
        sorted.sort_by(|a, b| a.probe_id.cmp(&b.probe_id));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_annotation_ids_rejected() {
        let records = vec![ProbeAnnotation::new("cg1"), ProbeAnnotation::new("cg1")];
        let err = AnnotationTable::new(records).unwrap_err();
        assert!(matches!(err, ArrayError::Integrity { .. }));
    }

    #[test]
    fn test_sorted_by_id() {
        let table = AnnotationTable::new(vec![
            ProbeAnnotation::new("cg3"),
            ProbeAnnotation::new("cg1"),
            ProbeAnnotation::new("cg2"),
        ])
        .unwrap();
        let ids: Vec<&str> = table.sorted_by_id().iter().map(|r| r.probe_id.as_str()).collect();
        assert_eq!(ids, vec!["cg1", "cg2", "cg3"]);
    }
}
