//! Synthetic array datasets with known differential rows
//!
//! Two groups of samples are drawn around per-row baselines on the modeling
//! scale (log2 intensity or M-value), a chosen set of rows is shifted in the
//! second group, and the result is returned on the raw scale the loader
//! expects. [`write_dataset`] lays it out as a per-sample raw directory with
//! sample metadata and a probe annotation file.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::data::{AnnotationTable, IntensityMatrix, ProbeAnnotation, SampleAnnotation};
use crate::error::{ArrayError, Result};
use crate::io::RawArrayData;
use crate::normalization::ArrayType;

/// Simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub array_type: ArrayType,
    /// Rows of the modeled matrix (probe sets when `probes_per_set > 1`)
    pub n_rows: usize,
    /// Probes per probe set, expression arrays only
    pub probes_per_set: usize,
    pub samples_per_group: usize,
    /// Reference and treated group labels
    pub groups: (String, String),
    pub n_differential: usize,
    /// Absolute shift of the differential rows; signs alternate
    pub log_fc: f64,
    /// Residual standard deviation on the modeling scale
    pub noise_sd: f64,
    /// Also emit detection p-values
    pub detection: bool,
    /// Rows whose detection fails in one sample
    pub failing_rows: usize,
    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            array_type: ArrayType::Expression,
            n_rows: 100,
            probes_per_set: 1,
            samples_per_group: 5,
            groups: ("Control".to_string(), "Case".to_string()),
            n_differential: 10,
            log_fc: 2.0,
            noise_sd: 0.3,
            detection: false,
            failing_rows: 0,
            seed: 42,
        }
    }
}

/// A simulated dataset and its ground truth
#[derive(Debug, Clone)]
pub struct SimulatedDataset {
    pub raw: RawArrayData,
    pub samples: SampleAnnotation,
    /// Keyed by modeled row ID
    pub annotation: AnnotationTable,
    /// Modeled row IDs carrying an injected shift, with the shift
    pub differential: Vec<(String, f64)>,
    /// Modeled row IDs set to fail detection
    pub failing: Vec<String>,
    pub group_column: String,
}

impl SimulatedDataset {
    pub fn differential_ids(&self) -> Vec<&str> {
        self.differential.iter().map(|(id, _)| id.as_str()).collect()
    }
}

fn normal(mean: f64, sd: f64) -> Result<Normal<f64>> {
    Normal::new(mean, sd).map_err(|e| ArrayError::config(format!("invalid normal parameters: {}", e)))
}

fn check_params(params: &SimulationParams) -> Result<()> {
    if params.n_rows == 0 || params.samples_per_group < 2 {
        return Err(ArrayError::config(
            "simulation needs at least one row and two samples per group",
        ));
    }
    if params.probes_per_set == 0 {
        return Err(ArrayError::config("probes_per_set must be at least 1"));
    }
    if params.n_differential + params.failing_rows > params.n_rows {
        return Err(ArrayError::config(format!(
            "{} differential and {} failing rows do not fit in {} rows",
            params.n_differential, params.failing_rows, params.n_rows
        )));
    }
    if params.failing_rows > 0 && !params.detection {
        return Err(ArrayError::config("failing_rows requires detection p-values"));
    }
    if params.groups.0 == params.groups.1 {
        return Err(ArrayError::config("the two group labels must differ"));
    }
    if !(params.noise_sd > 0.0) {
        return Err(ArrayError::config(format!("noise_sd must be positive, got {}", params.noise_sd)));
    }
    Ok(())
}

fn row_id(array_type: ArrayType, i: usize) -> String {
    match array_type {
        ArrayType::Expression => format!("PS{:05}", i + 1),
        ArrayType::Methylation => format!("cg{:08}", i + 1),
    }
}

/// Draw a dataset
pub fn simulate(params: &SimulationParams) -> Result<SimulatedDataset> {
    check_params(params)?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let n = params.samples_per_group;
    let n_samples = 2 * n;
    let per_set = match params.array_type {
        ArrayType::Expression => params.probes_per_set,
        ArrayType::Methylation => 1,
    };

    let (reference, treated) = &params.groups;
    let sample_ids: Vec<String> = (0..n_samples).map(|j| format!("S{:02}", j + 1)).collect();
    let labels: Vec<String> = (0..n_samples)
        .map(|j| if j < n { reference.clone() } else { treated.clone() })
        .collect();
    let mut samples = SampleAnnotation::new(sample_ids.clone())?;
    samples.add_levels("group", labels)?;

    let chosen = index::sample(&mut rng, params.n_rows, params.n_differential + params.failing_rows).into_vec();
    let (de_rows, fail_rows) = chosen.split_at(params.n_differential);
    let mut shift = vec![0.0; params.n_rows];
    for (k, &i) in de_rows.iter().enumerate() {
        shift[i] = if k % 2 == 0 { params.log_fc } else { -params.log_fc };
    }

    let noise = normal(0.0, params.noise_sd)?;
    let affinity = normal(0.0, 0.5)?;
    let n_probes = params.n_rows * per_set;
    let mut modeled = Array2::<f64>::zeros((n_probes, n_samples));
    let mut probe_ids = Vec::with_capacity(n_probes);
    let mut groups = Vec::with_capacity(n_probes);

    for i in 0..params.n_rows {
        let id = row_id(params.array_type, i);
        let baseline = match params.array_type {
            ArrayType::Expression => rng.gen_range(6.0..12.0),
            ArrayType::Methylation => rng.gen_range(-4.0..4.0),
        };
        for k in 0..per_set {
            let offset = if per_set > 1 { affinity.sample(&mut rng) } else { 0.0 };
            let p = i * per_set + k;
            for j in 0..n_samples {
                let effect = if j >= n { shift[i] } else { 0.0 };
                modeled[[p, j]] = baseline + offset + effect + noise.sample(&mut rng);
            }
            probe_ids.push(if per_set > 1 { format!("{}_{}", id, k + 1) } else { id.clone() });
            groups.push(id.clone());
        }
    }

    let values = match params.array_type {
        ArrayType::Expression => modeled.mapv(f64::exp2),
        ArrayType::Methylation => modeled.mapv(|m| {
            let e = m.exp2();
            e / (1.0 + e)
        }),
    };
    let intensities = IntensityMatrix::new(values, probe_ids, sample_ids)?;
    let mut raw = RawArrayData::new(intensities);

    if params.detection {
        let mut detection = Array2::from_shape_fn((n_probes, n_samples), |_| rng.gen_range(0.0..1e-4));
        for &i in fail_rows {
            let j = rng.gen_range(0..n_samples);
            for k in 0..per_set {
                detection[[i * per_set + k, j]] = 0.5;
            }
        }
        let detection = raw.intensities.with_values(detection)?;
        raw = raw.with_detection(detection)?;
    }
    if per_set > 1 {
        raw = raw.with_probe_groups(groups)?;
    }

    let annotation = AnnotationTable::new(
        (0..params.n_rows)
            .map(|i| {
                let id = row_id(params.array_type, i);
                let mut record = ProbeAnnotation::new(&id).with_symbol(&format!("GENE{}", i + 1));
                record.chromosome = Some(format!("chr{}", i % 22 + 1));
                record.position = Some(10_000 + 1_000 * i as u64);
                record.feature_type = Some(
                    match params.array_type {
                        ArrayType::Expression => "main",
                        ArrayType::Methylation => "Island",
                    }
                    .to_string(),
                );
                record
            })
            .collect(),
    )?;

    let differential = de_rows
        .iter()
        .map(|&i| (row_id(params.array_type, i), shift[i]))
        .collect();
    let failing = fail_rows.iter().map(|&i| row_id(params.array_type, i)).collect();

    log::info!(
        "Simulated {} rows x {} samples ({} differential)",
        params.n_rows,
        n_samples,
        params.n_differential
    );

    Ok(SimulatedDataset {
        raw,
        samples,
        annotation,
        differential,
        failing,
        group_column: "group".to_string(),
    })
}

/// Paths written by [`write_dataset`]
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedFiles {
    pub raw_dir: PathBuf,
    pub metadata: PathBuf,
    pub annotation: PathBuf,
    pub truth: PathBuf,
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{:.6}", v)
    }
}

/// Write the dataset under `out_dir`: `raw/<sample>.tsv`, `samples.tsv`,
/// `annotation.tsv` and `truth.tsv`
pub fn write_dataset<P: AsRef<Path>>(out_dir: P, dataset: &SimulatedDataset) -> Result<SimulatedFiles> {
    let out_dir = out_dir.as_ref();
    let raw_dir = out_dir.join("raw");
    fs::create_dir_all(&raw_dir)?;

    let raw = &dataset.raw;
    let values = raw.intensities.values();
    for (j, sample_id) in raw.intensities.sample_ids().iter().enumerate() {
        let path = raw_dir.join(format!("{}.tsv", sample_id));
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(&path)?;
        let mut header = vec!["probe_id", "intensity"];
        if raw.detection.is_some() {
            header.push("detection_p");
        }
        if raw.probe_groups.is_some() {
            header.push("feature_id");
        }
        writer.write_record(&header)?;

        for (i, probe_id) in raw.intensities.probe_ids().iter().enumerate() {
            let mut row = vec![probe_id.clone(), format_value(values[[i, j]])];
            if let Some(det) = &raw.detection {
                row.push(format!("{:e}", det.values()[[i, j]]));
            }
            if let Some(groups) = &raw.probe_groups {
                row.push(groups[i].clone());
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }

    let metadata = out_dir.join("samples.tsv");
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(&metadata)?;
    writer.write_record(["sample_id", dataset.group_column.as_str()])?;
    let group = dataset.samples.covariate(&dataset.group_column).unwrap_or_default();
    for (sample_id, label) in dataset.samples.sample_ids().iter().zip(group) {
        writer.write_record([sample_id.as_str(), label.as_deref().unwrap_or("NA")])?;
    }
    writer.flush()?;

    let annotation = out_dir.join("annotation.tsv");
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(&annotation)?;
    writer.write_record(["ID", "gene_symbol", "chromosome", "position", "feature_type"])?;
    for record in dataset.annotation.records() {
        writer.write_record([
            record.probe_id.clone(),
            record.gene_symbol.clone().unwrap_or_default(),
            record.chromosome.clone().unwrap_or_default(),
            record.position.map(|p| p.to_string()).unwrap_or_default(),
            record.feature_type.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;

    let truth = out_dir.join("truth.tsv");
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(&truth)?;
    writer.write_record(["probe_id", "log_fc"])?;
    for (id, shift) in &dataset.differential {
        writer.write_record([id.clone(), shift.to_string()])?;
    }
    writer.flush()?;

    log::info!("Wrote simulated dataset to {}", out_dir.display());
    Ok(SimulatedFiles {
        raw_dir,
        metadata,
        annotation,
        truth,
    })
}
