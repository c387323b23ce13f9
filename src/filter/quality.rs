//! Probe-level quality filtering
//!
//! Removes rows with missing values and rows whose detection p-values fail
//! the detection threshold. Columns are never touched.

use serde::{Deserialize, Serialize};

use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};
use crate::io::RawArrayData;

/// Configurable parameters for quality filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Drop probes with any missing value
    pub drop_missing: bool,
    /// A sample passes detection when its detection p-value is below this
    pub detection_threshold: f64,
    /// Minimum number of passing samples; every sample when `None`
    pub min_detected_samples: Option<usize>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            drop_missing: true,
            detection_threshold: 0.01,
            min_detected_samples: None,
        }
    }
}

/// Counts reported by the quality filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub input_probes: usize,
    pub removed_missing: usize,
    pub removed_detection: usize,
    pub kept_probes: usize,
}

impl FilterReport {
    pub fn removed(&self) -> usize {
        self.removed_missing + self.removed_detection
    }
}

/// Indices of the probes that pass, with the removal counts.
///
/// A probe with missing values is counted under `removed_missing` even when
/// its detection values fail as well.
pub fn select_probes(
    matrix: &IntensityMatrix,
    detection: Option<&IntensityMatrix>,
    params: &FilterParams,
) -> Result<(Vec<usize>, FilterReport)> {
    if let Some(det) = detection {
        matrix.check_same_layout(det)?;
    }
    if let Some(min) = params.min_detected_samples {
        if min > matrix.n_samples() {
            return Err(ArrayError::config(format!(
                "min_detected_samples = {} exceeds the {} samples",
                min,
                matrix.n_samples()
            )));
        }
    }

    let required = params.min_detected_samples.unwrap_or(matrix.n_samples());
    let values = matrix.values();
    let mut kept = Vec::with_capacity(matrix.n_probes());
    let mut removed_missing = 0;
    let mut removed_detection = 0;

    for i in 0..matrix.n_probes() {
        if params.drop_missing && values.row(i).iter().any(|v| v.is_nan()) {
            removed_missing += 1;
            continue;
        }
        if let Some(det) = detection {
            let detected = det
                .probe_values(i)
                .iter()
                .filter(|&&p| p < params.detection_threshold)
                .count();
            if detected < required {
                removed_detection += 1;
                continue;
            }
        }
        kept.push(i);
    }

    let report = FilterReport {
        input_probes: matrix.n_probes(),
        removed_missing,
        removed_detection,
        kept_probes: kept.len(),
    };
    Ok((kept, report))
}

/// Quality filter on a matrix and its optional detection matrix
pub fn quality_filter(
    matrix: &IntensityMatrix,
    detection: Option<&IntensityMatrix>,
    params: &FilterParams,
) -> Result<(IntensityMatrix, FilterReport)> {
    let (kept, report) = select_probes(matrix, detection, params)?;
    log_report(&report);
    if kept.is_empty() {
        return Err(ArrayError::EmptyData {
            reason: "no probes passed quality filtering".to_string(),
        });
    }
    Ok((matrix.subset_probes(&kept)?, report))
}

/// Quality filter applied consistently to intensities, detection values and probe groups
pub fn quality_filter_raw(raw: &RawArrayData, params: &FilterParams) -> Result<(RawArrayData, FilterReport)> {
    let (kept, report) = select_probes(&raw.intensities, raw.detection.as_ref(), params)?;
    log_report(&report);
    if kept.is_empty() {
        return Err(ArrayError::EmptyData {
            reason: "no probes passed quality filtering".to_string(),
        });
    }

    let mut filtered = RawArrayData::new(raw.intensities.subset_probes(&kept)?);
    if let Some(det) = &raw.detection {
        filtered = filtered.with_detection(det.subset_probes(&kept)?)?;
    }
    if let Some(groups) = &raw.probe_groups {
        filtered = filtered.with_probe_groups(kept.iter().map(|&i| groups[i].clone()).collect())?;
    }
    Ok((filtered, report))
}

fn log_report(report: &FilterReport) {
    log::info!(
        "Quality filter: removed {} of {} probes ({} with missing values, {} failing detection), {} kept",
        report.removed(),
        report.input_probes,
        report.removed_missing,
        report.removed_detection,
        report.kept_probes
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn matrix_with_nan_rows(n_probes: usize, nan_rows: &[usize]) -> IntensityMatrix {
        let mut values = Array2::from_shape_fn((n_probes, 4), |(i, j)| (i * 4 + j) as f64);
        for &i in nan_rows {
            values[[i, i % 4]] = f64::NAN;
        }
        IntensityMatrix::new(
            values,
            (0..n_probes).map(|i| format!("p{}", i)).collect(),
            (0..4).map(|j| format!("s{}", j)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_three_nan_rows_removed_exactly() {
        let matrix = matrix_with_nan_rows(20, &[2, 7, 13]);
        let (filtered, report) = quality_filter(&matrix, None, &FilterParams::default()).unwrap();
        assert_eq!(filtered.n_probes(), matrix.n_probes() - 3);
        assert_eq!(report.removed_missing, 3);
        assert_eq!(filtered.n_samples(), matrix.n_samples());
        assert!(!filtered.has_missing());
        assert!(filtered.probe_index("p7").is_none());
    }

    #[test]
    fn test_detection_threshold() {
        let matrix = matrix_with_nan_rows(3, &[]);
        let mut det = Array2::from_elem((3, 4), 0.001);
        det[[1, 2]] = 0.2;
        let detection = matrix.with_values(det).unwrap();

        let (filtered, report) = quality_filter(&matrix, Some(&detection), &FilterParams::default()).unwrap();
        assert_eq!(filtered.probe_ids(), &["p0".to_string(), "p2".to_string()]);
        assert_eq!(report.removed_detection, 1);

        let lenient = FilterParams {
            min_detected_samples: Some(3),
            ..FilterParams::default()
        };
        let (filtered, _) = quality_filter(&matrix, Some(&detection), &lenient).unwrap();
        assert_eq!(filtered.n_probes(), 3);
    }

    #[test]
    fn test_everything_removed_is_error() {
        let matrix = matrix_with_nan_rows(2, &[0, 1]);
        assert!(quality_filter(&matrix, None, &FilterParams::default()).is_err());
    }

    #[test]
    fn test_raw_filter_keeps_groups_aligned() {
        let matrix = matrix_with_nan_rows(4, &[1]);
        let raw = RawArrayData::new(matrix)
            .with_probe_groups(vec!["g1".into(), "g1".into(), "g2".into(), "g2".into()])
            .unwrap();
        let (filtered, _) = quality_filter_raw(&raw, &FilterParams::default()).unwrap();
        assert_eq!(filtered.probe_groups.unwrap(), vec!["g1", "g2", "g2"]);
    }
}
