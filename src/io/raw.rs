//! Raw array readers
//!
//! Two layouts are supported:
//! - a directory with one tab-delimited file per sample
//!   (`probe_id`, `intensity`, optional `detection_p`, optional `feature_id`);
//! - a single probes x samples matrix file, first column = probe IDs.
//!
//! Vendor binary formats are converted to one of these upstream.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::delimited::{display_name, headers, open_delimited, parse_value, records};
use crate::data::{IntensityMatrix, SampleAnnotation};
use crate::error::{ArrayError, Result};

/// Metadata column naming the raw file of each sample
pub const FILE_NAME_COLUMN: &str = "FileName";

const PROBE_COLUMN: &str = "probe_id";
const INTENSITY_COLUMN: &str = "intensity";
const DETECTION_COLUMN: &str = "detection_p";
const FEATURE_COLUMN: &str = "feature_id";

/// Raw measurements as loaded, before filtering and normalization
#[derive(Debug, Clone)]
pub struct RawArrayData {
    pub intensities: IntensityMatrix,
    /// Detection p-values, same layout as `intensities`
    pub detection: Option<IntensityMatrix>,
    /// Probe set / feature of each probe, used by summarization
    pub probe_groups: Option<Vec<String>>,
}

impl RawArrayData {
    pub fn new(intensities: IntensityMatrix) -> Self {
        Self {
            intensities,
            detection: None,
            probe_groups: None,
        }
    }

    /// Attach a detection matrix; identifiers must match in order
    pub fn with_detection(mut self, detection: IntensityMatrix) -> Result<Self> {
        self.intensities.check_same_layout(&detection)?;
        self.detection = Some(detection);
        Ok(self)
    }

    /// Attach probe groups, one per probe
    pub fn with_probe_groups(mut self, groups: Vec<String>) -> Result<Self> {
        if groups.len() != self.intensities.n_probes() {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} probe groups", self.intensities.n_probes()),
                got: format!("{} probe groups", groups.len()),
            });
        }
        self.probe_groups = Some(groups);
        Ok(self)
    }
}

/// Contents of one per-sample raw file
struct SampleFile {
    probe_ids: Vec<String>,
    intensities: Vec<f64>,
    detection: Option<Vec<f64>>,
    features: Option<Vec<String>>,
}

fn column_position(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn read_sample_file(path: &Path) -> Result<SampleFile> {
    let source = display_name(path);
    let mut reader = open_delimited(path, 0, Some(b'\t'))?;
    let header = headers(&mut reader, &source)?;

    let probe_col = column_position(&header, PROBE_COLUMN)
        .ok_or_else(|| ArrayError::parse(&source, format!("missing '{}' column", PROBE_COLUMN)))?;
    let intensity_col = column_position(&header, INTENSITY_COLUMN)
        .ok_or_else(|| ArrayError::parse(&source, format!("missing '{}' column", INTENSITY_COLUMN)))?;
    let detection_col = column_position(&header, DETECTION_COLUMN);
    let feature_col = column_position(&header, FEATURE_COLUMN);

    let mut file = SampleFile {
        probe_ids: Vec::new(),
        intensities: Vec::new(),
        detection: detection_col.map(|_| Vec::new()),
        features: feature_col.map(|_| Vec::new()),
    };

    for row in records(&mut reader, &source) {
        let (line, record) = row?;
        file.probe_ids.push(record[probe_col].to_string());
        file.intensities.push(parse_value(&record[intensity_col], &source, line)?);
        if let (Some(col), Some(values)) = (detection_col, file.detection.as_mut()) {
            values.push(parse_value(&record[col], &source, line)?);
        }
        if let (Some(col), Some(values)) = (feature_col, file.features.as_mut()) {
            values.push(record[col].to_string());
        }
    }

    if file.probe_ids.is_empty() {
        return Err(ArrayError::parse(&source, "no probes found"));
    }

    Ok(file)
}

/// Map every metadata sample to a raw file in `dir`.
///
/// Files are matched by the `FileName` metadata column when present, by file
/// stem otherwise. Unmatched samples, unclaimed files and files claimed by
/// more than one sample are errors.
fn match_sample_files(dir: &Path, annotation: &SampleAnnotation) -> Result<Vec<PathBuf>> {
    let dir_name = display_name(dir);
    let entries = fs::read_dir(dir).map_err(|e| ArrayError::parse(&dir_name, format!("cannot list: {}", e)))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if path.is_file() && !is_hidden {
            files.push(path);
        }
    }
    files.sort();

    let key_of = |path: &Path, by_name: bool| -> Option<String> {
        let part = if by_name { path.file_name() } else { path.file_stem() };
        part.and_then(|p| p.to_str()).map(|s| s.to_string())
    };

    let file_names = annotation.covariate(FILE_NAME_COLUMN);
    let by_name = file_names.is_some();
    let available: HashMap<String, &PathBuf> = files
        .iter()
        .filter_map(|p| key_of(p, by_name).map(|k| (k, p)))
        .collect();

    let mut matched: Vec<PathBuf> = Vec::with_capacity(annotation.n_samples());
    let mut claimed_by: HashMap<&Path, &str> = HashMap::new();
    let mut missing = Vec::new();
    for (i, sample_id) in annotation.sample_ids().iter().enumerate() {
        let key = match file_names {
            Some(names) => names[i].clone().unwrap_or_default(),
            None => sample_id.clone(),
        };
        let Some(path) = available.get(&key) else {
            missing.push(sample_id.as_str());
            continue;
        };
        if let Some(first) = claimed_by.insert(path.as_path(), sample_id.as_str()) {
            return Err(ArrayError::parse(
                &dir_name,
                format!(
                    "raw file {} claimed by samples '{}' and '{}'",
                    display_name(path),
                    first,
                    sample_id
                ),
            ));
        }
        matched.push((*path).clone());
    }
    if !missing.is_empty() {
        return Err(ArrayError::parse(
            &dir_name,
            format!("no raw file for metadata samples {:?}", missing),
        ));
    }

    let unclaimed: Vec<String> = files
        .iter()
        .filter(|p| !matched.contains(p))
        .map(|p| display_name(p))
        .collect();
    if !unclaimed.is_empty() {
        return Err(ArrayError::parse(
            &dir_name,
            format!("raw files without a metadata sample: {:?}", unclaimed),
        ));
    }

    Ok(matched)
}

/// Read a directory of per-sample raw files.
///
/// Matrix columns follow the metadata sample order. All files must hold the
/// same probe set; rows follow the probe order of the first file.
pub fn read_raw_directory<P: AsRef<Path>>(dir: P, annotation: &SampleAnnotation) -> Result<RawArrayData> {
    let dir = dir.as_ref();
    let paths = match_sample_files(dir, annotation)?;

    let mut sample_files = Vec::with_capacity(paths.len());
    for path in &paths {
        log::debug!("Reading raw file {}", path.display());
        sample_files.push(read_sample_file(path)?);
    }

    let reference = &sample_files[0];
    let n_probes = reference.probe_ids.len();
    let n_samples = sample_files.len();
    let probe_index: HashMap<&str, usize> = reference
        .probe_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    if probe_index.len() != n_probes {
        return Err(ArrayError::parse(display_name(&paths[0]), "duplicate probe IDs"));
    }

    let has_detection = reference.detection.is_some();
    let has_features = reference.features.is_some();
    for (file, path) in sample_files.iter().zip(paths.iter()).skip(1) {
        if file.detection.is_some() != has_detection {
            return Err(ArrayError::parse(
                display_name(path),
                format!("'{}' column present in some raw files only", DETECTION_COLUMN),
            ));
        }
        if file.features.is_some() != has_features {
            return Err(ArrayError::parse(
                display_name(path),
                format!("'{}' column present in some raw files only", FEATURE_COLUMN),
            ));
        }
    }
    let mut values = Array2::from_elem((n_probes, n_samples), f64::NAN);
    let mut detection = Array2::from_elem((n_probes, n_samples), f64::NAN);

    for (j, (file, path)) in sample_files.iter().zip(paths.iter()).enumerate() {
        if file.probe_ids.len() != n_probes {
            return Err(ArrayError::parse(
                display_name(path),
                format!("{} probes, expected {}", file.probe_ids.len(), n_probes),
            ));
        }
        let mut seen = vec![false; n_probes];
        for (k, probe_id) in file.probe_ids.iter().enumerate() {
            let i = *probe_index.get(probe_id.as_str()).ok_or_else(|| {
                ArrayError::parse(display_name(path), format!("unknown probe '{}'", probe_id))
            })?;
            if seen[i] {
                return Err(ArrayError::parse(display_name(path), format!("duplicate probe '{}'", probe_id)));
            }
            seen[i] = true;
            values[[i, j]] = file.intensities[k];
            if let Some(det) = &file.detection {
                detection[[i, j]] = det[k];
            }
            if let (Some(features), Some(expected)) = (&file.features, &reference.features) {
                if features[k] != expected[i] {
                    return Err(ArrayError::parse(
                        display_name(path),
                        format!(
                            "probe '{}' has feature '{}', expected '{}'",
                            probe_id, features[k], expected[i]
                        ),
                    ));
                }
            }
        }
    }

    let intensities = IntensityMatrix::new(values, reference.probe_ids.clone(), annotation.sample_ids().to_vec())?;
    log::info!("  {} probes, {} samples", n_probes, n_samples);

    let mut raw = RawArrayData::new(intensities);
    if has_detection {
        let detection = raw.intensities.with_values(detection)?;
        raw = raw.with_detection(detection)?;
    }
    if let Some(features) = &reference.features {
        raw = raw.with_probe_groups(features.clone())?;
    }
    Ok(raw)
}

/// Read a probes x samples matrix (first column = probe IDs, header = sample IDs).
/// The delimiter (tab or comma) is detected from the header.
pub fn read_intensity_matrix<P: AsRef<Path>>(path: P) -> Result<IntensityMatrix> {
    let path = path.as_ref();
    let source = display_name(path);
    let mut reader = open_delimited(path, 0, None)?;
    let header = headers(&mut reader, &source)?;
    if header.len() < 2 {
        return Err(ArrayError::parse(&source, "not enough columns in header"));
    }
    let sample_ids: Vec<String> = header[1..].to_vec();
    let n_samples = sample_ids.len();

    let mut probe_ids = Vec::new();
    let mut data: Vec<f64> = Vec::new();
    for row in records(&mut reader, &source) {
        let (line, record) = row?;
        probe_ids.push(record[0].to_string());
        for field in record.iter().skip(1) {
            data.push(parse_value(field, &source, line)?);
        }
    }

    if probe_ids.is_empty() {
        return Err(ArrayError::EmptyData {
            reason: format!("no probes found in {}", source),
        });
    }

    let values = Array2::from_shape_vec((probe_ids.len(), n_samples), data).map_err(|e| {
        ArrayError::parse(&source, format!("inconsistent row lengths: {}", e))
    })?;
    IntensityMatrix::new(values, probe_ids, sample_ids)
}

/// Loader: read raw files and metadata, returning aligned data and annotation
pub fn load_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    raw_dir: P,
    metadata_path: Q,
) -> Result<(RawArrayData, SampleAnnotation)> {
    log::info!("Loading sample metadata from: {}", metadata_path.as_ref().display());
    let annotation = super::read_sample_annotation(metadata_path)?;

    log::info!("Loading raw array files from: {}", raw_dir.as_ref().display());
    let raw = read_raw_directory(raw_dir, &annotation)?;
    let annotation = annotation.align_to(raw.intensities.sample_ids())?;
    Ok((raw, annotation))
}

/// Loader for the matrix layout: matrix file, optional detection matrix and metadata
pub fn load_matrix_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    matrix_path: P,
    detection_path: Option<&Path>,
    metadata_path: Q,
) -> Result<(RawArrayData, SampleAnnotation)> {
    log::info!("Loading intensity matrix from: {}", matrix_path.as_ref().display());
    let intensities = read_intensity_matrix(matrix_path)?;
    log::info!("  {} probes, {} samples", intensities.n_probes(), intensities.n_samples());

    let mut raw = RawArrayData::new(intensities);
    if let Some(path) = detection_path {
        log::info!("Loading detection p-values from: {}", path.display());
        let detection = read_intensity_matrix(path)?;
        raw = raw.with_detection(detection)?;
    }

    let annotation = super::read_sample_annotation(metadata_path)?;
    let annotation = annotation.align_to(raw.intensities.sample_ids())?;
    Ok((raw, annotation))
}
