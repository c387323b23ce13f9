//! rust_microarray: differential analysis of expression and methylation arrays
//!
//! A batch pipeline from raw array measurements to a ranked, annotated table
//! of differential probes:
//!
//! 1. load raw files and sample metadata, aligned by sample ID;
//! 2. drop probes with missing values or failed detection;
//! 3. normalize (RMA for expression, quantile + M-values for methylation);
//! 4. build a cell-means design and a contrast;
//! 5. fit a linear model per probe, moderate with empirical Bayes;
//! 6. adjust p-values;
//! 7. join probe annotation by key;
//! 8. write the ranked table, summary, histogram and plot-data tables.
//!
//! # Example
//!
//! ```ignore
//! use rust_microarray::prelude::*;
//!
//! let mut config = AnalysisConfig::load("analysis.json")?;
//! config.report.alpha = 0.1;
//! let output = run_pipeline(&config)?;
//! println!("{}", output.annotated.summary(config.report.alpha));
//! ```

pub mod annotate;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod io;
pub mod model;
pub mod normalization;
pub mod report;
pub mod simulate;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::annotate::{annotate, AnnotatedRecord, AnnotatedResult, CoveragePolicy};
    pub use crate::config::{AnalysisConfig, DesignConfig, InputConfig};
    pub use crate::data::{AnnotationTable, IntensityMatrix, ProbeAnnotation, SampleAnnotation};
    pub use crate::error::{ArrayError, Result};
    pub use crate::filter::{quality_filter, quality_filter_raw, FilterParams, FilterReport};
    pub use crate::io::{
        load_dataset, load_matrix_dataset, read_annotation_table, read_intensity_matrix, read_sample_annotation,
        write_matrix, AnnotationFormat, DiffRecord, ModelResult, RawArrayData,
    };
    pub use crate::model::{lm_fit, ContrastSpec, DesignBuilder, DesignMatrix};
    pub use crate::normalization::{normalize, ArrayType, BackgroundMethod, NormalizeParams};
    pub use crate::report::{write_report, ReportFiles, ReportOptions};
    pub use crate::simulate::{simulate, write_dataset, SimulationParams};
    pub use crate::testing::{adjust_pvalues, differential_analysis, ebayes, AdjustMethod, EbayesParams};
    pub use crate::{prepare, run_pipeline, PipelineOutput};
}

use prelude::*;

/// Everything a pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub filter: FilterReport,
    pub result: ModelResult,
    pub annotated: AnnotatedResult,
    pub files: ReportFiles,
}

fn load_inputs(config: &AnalysisConfig) -> Result<(RawArrayData, SampleAnnotation)> {
    let metadata = config
        .input
        .metadata
        .as_ref()
        .ok_or_else(|| ArrayError::config("no sample metadata file given"))?;
    match (&config.input.raw_dir, &config.input.matrix) {
        (Some(dir), None) => load_dataset(dir, metadata),
        (None, Some(matrix)) => load_matrix_dataset(matrix, config.input.detection.as_deref(), metadata),
        _ => Err(ArrayError::config("set exactly one of raw_dir and matrix")),
    }
}

/// Load, filter and normalize.
///
/// Returns the modeling matrix with the sample annotation aligned to its
/// columns and the filter counts.
pub fn prepare(config: &AnalysisConfig) -> Result<(IntensityMatrix, SampleAnnotation, FilterReport)> {
    config.validate()?;
    let (raw, samples) = load_inputs(config)?;
    let (filtered, report) = quality_filter_raw(&raw, &config.filter)?;
    let normalized = normalize(&filtered, config.array_type, &config.normalize)?;
    log::info!(
        "Normalized matrix: {} rows, {} samples",
        normalized.n_probes(),
        normalized.n_samples()
    );
    Ok((normalized, samples, report))
}

/// Run the complete analysis described by `config` and write its report
pub fn run_pipeline(config: &AnalysisConfig) -> Result<PipelineOutput> {
    let (matrix, samples, filter) = prepare(config)?;

    let design = config.design.design(&samples)?;
    log::info!(
        "Design: {} samples, columns [{}]",
        design.n_samples(),
        design.column_names().join(", ")
    );
    let contrast = config.design.contrast(&design)?;
    log::info!("Testing contrast {}", contrast.name);

    let result = differential_analysis(&matrix, &design, &contrast, &config.ebayes, config.adjust)?;
    log::info!(
        "{} of {} rows significant at adj.P < {}",
        result.significant(config.report.alpha).len(),
        result.n_probes(),
        config.report.alpha
    );

    let annotated = match &config.input.annotation {
        Some(path) => {
            log::info!("Loading probe annotation from: {}", path.display());
            let table = read_annotation_table(path, &config.annotation_format)?;
            annotate(&result, &table, config.coverage_policy())?
        }
        None => {
            log::warn!("No annotation file given; reporting probe IDs only");
            AnnotatedResult::without_annotation(&result)
        }
    };

    let files = write_report(&config.output_dir, &annotated, &config.report)?;
    Ok(PipelineOutput {
        filter,
        result,
        annotated,
        files,
    })
}
