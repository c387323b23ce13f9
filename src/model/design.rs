//! Cell-means design matrix construction

use std::collections::HashSet;

use ndarray::{Array2, ArrayView2};

use super::linalg::cholesky;
use crate::data::SampleAnnotation;
use crate::error::{ArrayError, Result};

/// Design matrix (samples x coefficients) with the samples it was built for
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    matrix: Array2<f64>,
    sample_ids: Vec<String>,
    column_names: Vec<String>,
    /// Grouping covariate
    group: String,
    /// Group levels, one column each, in column order
    levels: Vec<String>,
}

impl DesignMatrix {
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// Fail unless the design rows follow `sample_ids` exactly, in order
    pub fn check_sample_order(&self, sample_ids: &[String]) -> Result<()> {
        if sample_ids.len() != self.sample_ids.len() {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} samples in the design", self.sample_ids.len()),
                got: format!("{} matrix columns", sample_ids.len()),
            });
        }
        if let Some(pos) = self.sample_ids.iter().zip(sample_ids).position(|(a, b)| a != b) {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("sample '{}' at design row {}", sample_ids[pos], pos + 1),
                got: format!("sample '{}'", self.sample_ids[pos]),
            });
        }
        Ok(())
    }
}

/// Builder for [`DesignMatrix`]
///
/// ```ignore
/// let design = DesignBuilder::new(&annotation)
///     .group("disease_state")
///     .levels(&["AD", "Control"])
///     .covariate("batch")
///     .build()?;
/// ```
pub struct DesignBuilder<'a> {
    annotation: &'a SampleAnnotation,
    group: Option<String>,
    levels: Option<Vec<String>>,
    covariates: Vec<String>,
}

impl<'a> DesignBuilder<'a> {
    pub fn new(annotation: &'a SampleAnnotation) -> Self {
        Self {
            annotation,
            group: None,
            levels: None,
            covariates: Vec::new(),
        }
    }

    /// Grouping covariate (required)
    pub fn group(mut self, name: &str) -> Self {
        self.group = Some(name.to_string());
        self
    }

    /// Level order for the group columns; alphabetical when not given
    pub fn levels<S: AsRef<str>>(mut self, levels: &[S]) -> Self {
        self.levels = Some(levels.iter().map(|l| l.as_ref().to_string()).collect());
        self
    }

    /// Additive categorical covariate, treatment-coded against its first level
    pub fn covariate(mut self, name: &str) -> Self {
        self.covariates.push(name.to_string());
        self
    }

    pub fn build(self) -> Result<DesignMatrix> {
        let group = self
            .group
            .ok_or_else(|| ArrayError::config("no grouping covariate given"))?;
        let values = complete_values(self.annotation, &group)?;

        let observed: Vec<String> = self.annotation.levels(&group).unwrap_or_default();
        let levels = match self.levels {
            Some(levels) => {
                check_level_order(&group, &levels, &observed)?;
                levels
            }
            None => observed,
        };
        if levels.len() < 2 {
            return Err(ArrayError::config(format!(
                "grouping covariate '{}' has {} distinct level(s), at least 2 are required",
                group,
                levels.len()
            )));
        }

        let n_samples = self.annotation.n_samples();
        let mut columns: Vec<Vec<f64>> = levels
            .iter()
            .map(|level| values.iter().map(|v| if v == level { 1.0 } else { 0.0 }).collect())
            .collect();
        let mut column_names = levels.clone();

        for name in &self.covariates {
            if *name == group {
                return Err(ArrayError::config(format!(
                    "covariate '{}' is also the grouping covariate",
                    name
                )));
            }
            let cov_values = complete_values(self.annotation, name)?;
            let cov_levels = self.annotation.levels(name).unwrap_or_default();
            if cov_levels.len() < 2 {
                log::warn!("Covariate '{}' has a single level and adds no columns", name);
            }
            for level in cov_levels.iter().skip(1) {
                columns.push(cov_values.iter().map(|v| if v == level { 1.0 } else { 0.0 }).collect());
                column_names.push(format!("{}{}", name, level));
            }
        }

        let n_coefs = columns.len();
        let matrix = Array2::from_shape_fn((n_samples, n_coefs), |(i, j)| columns[j][i]);
        check_full_rank(&matrix, &column_names)?;

        log::info!(
            "Design: {} samples, {} coefficients ({})",
            n_samples,
            n_coefs,
            column_names.join(", ")
        );
        Ok(DesignMatrix {
            matrix,
            sample_ids: self.annotation.sample_ids().to_vec(),
            column_names,
            group,
            levels,
        })
    }
}

/// Values of a covariate, failing on an unknown column or a missing value
fn complete_values(annotation: &SampleAnnotation, name: &str) -> Result<Vec<String>> {
    let values = annotation.covariate(name).ok_or_else(|| {
        ArrayError::config(format!(
            "covariate '{}' not found in sample annotation (available: {})",
            name,
            annotation.covariate_names().join(", ")
        ))
    })?;
    values
        .iter()
        .zip(annotation.sample_ids())
        .map(|(v, sample)| {
            v.clone().ok_or_else(|| {
                ArrayError::config(format!("sample '{}' has no value for covariate '{}'", sample, name))
            })
        })
        .collect()
}

fn check_level_order(group: &str, levels: &[String], observed: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for level in levels {
        if !seen.insert(level.as_str()) {
            return Err(ArrayError::config(format!("level '{}' listed twice", level)));
        }
    }
    if let Some(extra) = observed.iter().find(|l| !seen.contains(l.as_str())) {
        return Err(ArrayError::config(format!(
            "level '{}' of '{}' is not in the given level order",
            extra, group
        )));
    }
    if let Some(unused) = levels.iter().find(|l| !observed.contains(l)) {
        return Err(ArrayError::config(format!(
            "level '{}' of '{}' is not observed in any sample",
            unused, group
        )));
    }
    Ok(())
}

/// Fail when the columns are linearly dependent
pub fn check_full_rank(matrix: &Array2<f64>, column_names: &[String]) -> Result<()> {
    let (n_samples, n_coefs) = matrix.dim();
    if n_coefs == 0 || n_samples < n_coefs {
        return Err(ArrayError::config(format!(
            "design with {} coefficients cannot be fit on {} samples",
            n_coefs, n_samples
        )));
    }
    let xtx = matrix.t().dot(matrix);
    let flat: Vec<f64> = xtx.iter().copied().collect();
    if cholesky(&flat, n_coefs).is_none() {
        return Err(ArrayError::config(format!(
            "the design matrix is not full rank; one of the columns ({}) is a combination of the others",
            column_names.join(", ")
        )));
    }
    Ok(())
}
