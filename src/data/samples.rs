//! Sample annotation: categorical covariates keyed by sample identifier

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ArrayError, Result};

/// Per-sample categorical covariates (disease status, tissue, batch, ...)
///
/// Missing values are stored as `None`. Column order is preserved as read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleAnnotation {
    sample_ids: Vec<String>,
    /// Covariate names in file order
    columns: Vec<String>,
    /// Covariate name -> one value per sample
    covariates: HashMap<String, Vec<Option<String>>>,
}

impl SampleAnnotation {
    /// Create an annotation with no covariates; sample IDs must be unique
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                return Err(ArrayError::parse(
                    "sample annotation",
                    format!("duplicate sample ID '{}'", id),
                ));
            }
        }
        Ok(Self {
            sample_ids,
            columns: Vec::new(),
            covariates: HashMap::new(),
        })
    }

    /// Add a covariate column
    pub fn add_covariate(&mut self, name: &str, values: Vec<Option<String>>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if !self.covariates.contains_key(name) {
            self.columns.push(name.to_string());
        }
        self.covariates.insert(name.to_string(), values);
        Ok(())
    }

    /// Add a covariate column with no missing values
    pub fn add_levels(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.add_covariate(name, values.into_iter().map(Some).collect())
    }

    pub fn covariate(&self, name: &str) -> Option<&[Option<String>]> {
        self.covariates.get(name).map(|v| v.as_slice())
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.columns
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Distinct non-missing levels of a covariate, sorted
    pub fn levels(&self, name: &str) -> Option<Vec<String>> {
        self.covariates.get(name).map(|values| {
            let mut unique: Vec<String> = values.iter().flatten().cloned().collect();
            unique.sort();
            unique.dedup();
            unique
        })
    }

    /// Reorder rows to follow `sample_order` exactly.
    ///
    /// Both sides must hold the same sample set; extra or missing samples are
    /// a parse error naming them.
    pub fn align_to(&self, sample_order: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let missing_in_annotation: Vec<&str> = sample_order
            .iter()
            .filter(|id| !index.contains_key(id.as_str()))
            .map(|s| s.as_str())
            .collect();
        let ordered: HashSet<&str> = sample_order.iter().map(|s| s.as_str()).collect();
        let missing_in_data: Vec<&str> = self
            .sample_ids
            .iter()
            .filter(|id| !ordered.contains(id.as_str()))
            .map(|s| s.as_str())
            .collect();

        if !missing_in_annotation.is_empty() || !missing_in_data.is_empty() {
            let mut msg = String::from("sample IDs do not match between raw data and metadata.");
            if !missing_in_annotation.is_empty() {
                msg.push_str(&format!(" In raw data but not metadata: {:?}.", missing_in_annotation));
            }
            if !missing_in_data.is_empty() {
                msg.push_str(&format!(" In metadata but not raw data: {:?}.", missing_in_data));
            }
            return Err(ArrayError::parse("sample annotation", msg));
        }

        let order: Vec<usize> = sample_order.iter().map(|id| index[id.as_str()]).collect();
        self.subset(&order)
    }

    /// Subset (and reorder) to specific samples
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();

        let mut new_meta = SampleAnnotation::new(new_ids)?;
        for name in &self.columns {
            let values = &self.covariates[name];
            let new_values = sample_indices.iter().map(|&i| values[i].clone()).collect();
            new_meta.add_covariate(name, new_values)?;
        }

        Ok(new_meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn annotation() -> SampleAnnotation {
        let mut meta = SampleAnnotation::new(strings(&["s1", "s2", "s3", "s4"])).unwrap();
        meta.add_levels("status", strings(&["AD", "Control", "AD", "Control"]))
            .unwrap();
        meta.add_covariate(
            "batch",
            vec![Some("b1".to_string()), None, Some("b2".to_string()), Some("b1".to_string())],
        )
        .unwrap();
        meta
    }

    #[test]
    fn test_levels_and_membership() {
        let meta = annotation();
        assert_eq!(meta.levels("status").unwrap(), vec!["AD", "Control"]);
        assert_eq!(meta.levels("batch").unwrap(), vec!["b1", "b2"]);
        assert_eq!(meta.covariate("status").unwrap()[1].as_deref(), Some("Control"));
        assert_eq!(meta.covariate_names(), &["status".to_string(), "batch".to_string()]);
    }

    #[test]
    fn test_align_to_reorders() {
        let meta = annotation();
        let aligned = meta.align_to(&strings(&["s4", "s3", "s2", "s1"])).unwrap();
        assert_eq!(aligned.sample_ids(), &strings(&["s4", "s3", "s2", "s1"])[..]);
        assert_eq!(aligned.covariate("status").unwrap()[0].as_deref(), Some("Control"));
        assert_eq!(aligned.covariate("batch").unwrap()[2], None);
    }

    #[test]
    fn test_align_to_reports_mismatch() {
        let meta = annotation();
        let err = meta.align_to(&strings(&["s1", "s2", "s3", "s5"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("s5"));
        assert!(msg.contains("s4"));
    }

    #[test]
    fn test_duplicate_samples_rejected() {
        assert!(SampleAnnotation::new(strings(&["s1", "s1"])).is_err());
    }
}
