//! Probe x sample intensity matrix for array data

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{ArrayError, Result};

/// Return the first identifier that occurs more than once.
fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().find(|id| !seen.insert(id.as_str())).map(|s| s.as_str())
}

/// A matrix of array measurements
///
/// Rows are probes / CpG sites, columns are samples. Values are raw or
/// normalized intensities, beta values or M-values; `NaN` marks a missing
/// measurement. Identifiers are unique and fixed at construction: the only
/// structural change offered is row subsetting.
#[derive(Debug, Clone)]
pub struct IntensityMatrix {
    /// Measurements (probes x samples)
    values: Array2<f64>,
    /// Probe identifiers
    probe_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl IntensityMatrix {
    /// Create a new matrix, validating the identifier sets
    pub fn new(values: Array2<f64>, probe_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_probes, n_samples) = values.dim();

        if probe_ids.len() != n_probes {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} probe IDs", n_probes),
                got: format!("{} probe IDs", probe_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if let Some(dup) = first_duplicate(&probe_ids) {
            return Err(ArrayError::InvalidMatrix {
                reason: format!("duplicate probe ID '{}'", dup),
            });
        }

        if let Some(dup) = first_duplicate(&sample_ids) {
            return Err(ArrayError::InvalidMatrix {
                reason: format!("duplicate sample ID '{}'", dup),
            });
        }

        if values.iter().any(|x| x.is_infinite()) {
            return Err(ArrayError::InvalidMatrix {
                reason: "values must be finite or NaN (missing)".to_string(),
            });
        }

        Ok(Self {
            values,
            probe_ids,
            sample_ids,
        })
    }

    /// Get the number of probes
    pub fn n_probes(&self) -> usize {
        self.values.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn probe_ids(&self) -> &[String] {
        &self.probe_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Values of one probe across samples
    pub fn probe_values(&self, probe_idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(probe_idx)
    }

    /// Values of one sample across probes
    pub fn sample_values(&self, sample_idx: usize) -> ArrayView1<'_, f64> {
        self.values.column(sample_idx)
    }

    pub fn probe_index(&self, probe_id: &str) -> Option<usize> {
        self.probe_ids.iter().position(|id| id == probe_id)
    }

    /// Whether any value is missing
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|x| x.is_nan())
    }

    /// Number of missing values per probe
    pub fn missing_per_probe(&self) -> Vec<usize> {
        self.values
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|x| x.is_nan()).count())
            .collect()
    }

    /// Replace the values with a same-shaped matrix, keeping the identifiers
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        if values.dim() != self.values.dim() {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{:?}", self.values.dim()),
                got: format!("{:?}", values.dim()),
            });
        }
        Self::new(values, self.probe_ids.clone(), self.sample_ids.clone())
    }

    /// Subset to specific probes, in the given order
    pub fn subset_probes(&self, probe_indices: &[usize]) -> Result<Self> {
        let new_values = self.values.select(Axis(0), probe_indices);
        let new_probe_ids: Vec<String> = probe_indices
            .iter()
            .map(|&i| self.probe_ids[i].clone())
            .collect();

        Self::new(new_values, new_probe_ids, self.sample_ids.clone())
    }

    /// Check that another matrix has the same identifiers in the same order
    pub fn check_same_layout(&self, other: &IntensityMatrix) -> Result<()> {
        if self.sample_ids != other.sample_ids {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("samples {:?}", self.sample_ids),
                got: format!("samples {:?}", other.sample_ids),
            });
        }
        if self.probe_ids != other.probe_ids {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} probes in matrix order", self.n_probes()),
                got: format!("{} probes in a different order", other.n_probes()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_matrix_creation() {
        let values = array![[1.0, 2.0, 3.0], [4.0, f64::NAN, 6.0]];
        let matrix = IntensityMatrix::new(values, ids("p", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_probes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert!(matrix.has_missing());
        assert_eq!(matrix.missing_per_probe(), vec![0, 1]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let dup = vec!["p1".to_string(), "p1".to_string()];
        assert!(IntensityMatrix::new(values.clone(), dup, ids("s", 2)).is_err());

        let dup = vec!["s1".to_string(), "s1".to_string()];
        assert!(IntensityMatrix::new(values, ids("p", 2), dup).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let result = IntensityMatrix::new(values, ids("p", 3), ids("s", 2));
        assert!(matches!(result, Err(ArrayError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_subset_probes_keeps_samples() {
        let values = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let matrix = IntensityMatrix::new(values, ids("p", 3), ids("s", 2)).unwrap();
        let subset = matrix.subset_probes(&[2, 0]).unwrap();
        assert_eq!(subset.probe_ids(), &["p3".to_string(), "p1".to_string()]);
        assert_eq!(subset.sample_ids(), matrix.sample_ids());
        assert_eq!(subset.values()[[0, 1]], 6.0);
    }
}
