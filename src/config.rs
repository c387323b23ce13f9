//! Run configuration
//!
//! Every parameter of a pipeline run lives in [`AnalysisConfig`]. A config can
//! be loaded from JSON; missing fields take their defaults, so a file only
//! needs to name what differs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotate::CoveragePolicy;
use crate::data::SampleAnnotation;
use crate::error::{ArrayError, Result};
use crate::filter::FilterParams;
use crate::io::AnnotationFormat;
use crate::model::{ContrastSpec, DesignBuilder, DesignMatrix};
use crate::normalization::{ArrayType, NormalizeParams};
use crate::report::ReportOptions;
use crate::testing::{AdjustMethod, EbayesParams};

/// Input files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory of per-sample raw files
    pub raw_dir: Option<PathBuf>,
    /// Probes x samples matrix, used instead of `raw_dir`
    pub matrix: Option<PathBuf>,
    /// Detection p-value matrix matching `matrix`
    pub detection: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub annotation: Option<PathBuf>,
}

/// Grouping, covariates and the contrast to test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    /// Metadata column holding the group of each sample
    pub group: String,
    /// Level order of the group columns; alphabetical when absent
    pub levels: Option<Vec<String>>,
    /// Additive categorical covariates
    pub covariates: Vec<String>,
    /// Contrast expression over design columns, e.g. `AD-Control`
    pub contrast: Option<String>,
    pub numerator: Option<String>,
    pub denominator: Option<String>,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            group: "group".to_string(),
            levels: None,
            covariates: Vec::new(),
            contrast: None,
            numerator: None,
            denominator: None,
        }
    }
}

impl DesignConfig {
    /// Build the design matrix over `annotation`
    pub fn design(&self, annotation: &SampleAnnotation) -> Result<DesignMatrix> {
        let mut builder = DesignBuilder::new(annotation).group(&self.group);
        if let Some(levels) = &self.levels {
            builder = builder.levels(levels.as_slice());
        }
        for covariate in &self.covariates {
            builder = builder.covariate(covariate);
        }
        builder.build()
    }

    /// Resolve the contrast against a built design.
    ///
    /// An expression wins over a numerator/denominator pair. With neither,
    /// a two-level design compares the second level with the first.
    pub fn contrast(&self, design: &DesignMatrix) -> Result<ContrastSpec> {
        if let Some(expression) = &self.contrast {
            return ContrastSpec::parse(design, expression);
        }
        match (&self.numerator, &self.denominator) {
            (Some(num), Some(den)) => ContrastSpec::difference(design, num, den),
            (Some(_), None) | (None, Some(_)) => Err(ArrayError::config(
                "numerator and denominator must be given together",
            )),
            (None, None) => match design.levels() {
                [first, second] => ContrastSpec::difference(design, second, first),
                levels => Err(ArrayError::config(format!(
                    "{} group levels ({}); specify a contrast",
                    levels.len(),
                    levels.join(", ")
                ))),
            },
        }
    }
}

/// Complete parameter set of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input: InputConfig,
    pub array_type: ArrayType,
    pub design: DesignConfig,
    pub filter: FilterParams,
    pub normalize: NormalizeParams,
    pub ebayes: EbayesParams,
    pub adjust: AdjustMethod,
    pub annotation_format: AnnotationFormat,
    /// Defaults to the policy of the array type
    pub coverage: Option<CoveragePolicy>,
    pub report: ReportOptions,
    pub output_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            array_type: ArrayType::Expression,
            design: DesignConfig::default(),
            filter: FilterParams::default(),
            normalize: NormalizeParams::default(),
            ebayes: EbayesParams::default(),
            adjust: AdjustMethod::Bh,
            annotation_format: AnnotationFormat::default(),
            coverage: None,
            report: ReportOptions::default(),
            output_dir: PathBuf::from("results"),
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());
        let text = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn coverage_policy(&self) -> CoveragePolicy {
        self.coverage
            .unwrap_or_else(|| CoveragePolicy::for_array_type(self.array_type))
    }

    /// Check parameters before any stage runs
    pub fn validate(&self) -> Result<()> {
        match (&self.input.raw_dir, &self.input.matrix) {
            (None, None) => return Err(ArrayError::config("no input: set raw_dir or matrix")),
            (Some(_), Some(_)) => {
                return Err(ArrayError::config("raw_dir and matrix are mutually exclusive"))
            }
            _ => {}
        }
        if self.input.detection.is_some() && self.input.matrix.is_none() {
            return Err(ArrayError::config(
                "a detection matrix requires matrix input; raw files carry their own detection_p column",
            ));
        }
        if self.input.metadata.is_none() {
            return Err(ArrayError::config("no sample metadata file given"));
        }
        if self.design.group.trim().is_empty() {
            return Err(ArrayError::config("empty group column name"));
        }

        let threshold = self.filter.detection_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ArrayError::config(format!(
                "detection threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        let offset = self.normalize.beta_offset;
        if !(offset > 0.0 && offset < 0.5) {
            return Err(ArrayError::config(format!("beta offset must be in (0, 0.5), got {}", offset)));
        }
        let proportion = self.ebayes.proportion;
        if !(proportion > 0.0 && proportion < 1.0) {
            return Err(ArrayError::config(format!(
                "proportion of differential rows must be in (0, 1), got {}",
                proportion
            )));
        }
        let (lo, hi) = self.ebayes.stdev_coef_lim;
        if !(lo > 0.0 && lo <= hi) {
            return Err(ArrayError::config(format!(
                "stdev_coef_lim must satisfy 0 < lower <= upper, got ({}, {})",
                lo, hi
            )));
        }
        let alpha = self.report.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ArrayError::config(format!("alpha must be in (0, 1), got {}", alpha)));
        }
        if self.report.min_lfc < 0.0 {
            return Err(ArrayError::config(format!(
                "min_lfc must not be negative, got {}",
                self.report.min_lfc
            )));
        }
        if let Some(CoveragePolicy::Tolerant { max_missing_fraction }) = self.coverage {
            if !(0.0..=1.0).contains(&max_missing_fraction) {
                return Err(ArrayError::config(format!(
                    "max_missing_fraction must be in [0, 1], got {}",
                    max_missing_fraction
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal() -> AnalysisConfig {
        AnalysisConfig {
            input: InputConfig {
                raw_dir: Some(PathBuf::from("raw")),
                metadata: Some(PathBuf::from("samples.tsv")),
                ..InputConfig::default()
            },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "input": {{"matrix": "betas.tsv", "metadata": "samples.tsv"}},
                "array_type": "methylation",
                "design": {{"group": "condition", "contrast": "iN-Fibroblast"}},
                "adjust": "fdr",
                "report": {{"alpha": 0.1}}
            }}"#
        )
        .unwrap();

        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.array_type, ArrayType::Methylation);
        assert_eq!(config.design.group, "condition");
        assert_eq!(config.adjust, AdjustMethod::Bh);
        assert_eq!(config.report.alpha, 0.1);
        assert_eq!(config.report.table_name, "results.tsv");
        assert_eq!(config.filter, FilterParams::default());
        assert!(matches!(config.coverage_policy(), CoveragePolicy::Tolerant { .. }));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_inputs() {
        let mut config = minimal();
        config.validate().unwrap();

        config.input.matrix = Some(PathBuf::from("m.tsv"));
        assert!(matches!(config.validate(), Err(ArrayError::Config { .. })));

        let mut config = minimal();
        config.input.metadata = None;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.report.alpha = 1.5;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.ebayes.proportion = 0.0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.input.detection = Some(PathBuf::from("det.tsv"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_contrast_resolution() {
        let samples: Vec<String> = (0..4).map(|i| format!("s{}", i)).collect();
        let mut ann = SampleAnnotation::new(samples).unwrap();
        ann.add_levels("group", ["ctl", "ctl", "trt", "trt"].iter().map(|s| s.to_string()).collect())
            .unwrap();

        let design_config = DesignConfig::default();
        let design = design_config.design(&ann).unwrap();
        let contrast = design_config.contrast(&design).unwrap();
        assert_eq!(contrast.name, "trt-ctl");
        assert_eq!(contrast.weights, vec![-1.0, 1.0]);

        let reversed = DesignConfig {
            numerator: Some("ctl".to_string()),
            denominator: Some("trt".to_string()),
            ..DesignConfig::default()
        };
        assert_eq!(reversed.contrast(&design).unwrap().weights, vec![1.0, -1.0]);

        let half = DesignConfig {
            numerator: Some("ctl".to_string()),
            ..DesignConfig::default()
        };
        assert!(half.contrast(&design).is_err());
    }
}
