//! Command-line interface for rust_microarray

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::annotate::CoveragePolicy;
use crate::config::AnalysisConfig;
use crate::normalization::{ArrayType, BackgroundMethod};
use crate::simulate::SimulationParams;
use crate::testing::AdjustMethod;

#[derive(Parser)]
#[command(name = "rust_microarray")]
#[command(version)]
#[command(about = "Differential analysis of expression and methylation arrays in Rust")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads (0 = auto) [default: 0]
    #[arg(short = 't', long, global = true, default_value = "0")]
    pub threads: usize,
}

/// Input and array-type flags shared by `run` and `normalize`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// JSON run configuration; flags given here override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory with one raw file per sample
    #[arg(short, long, conflicts_with = "matrix")]
    pub raw_dir: Option<PathBuf>,

    /// Probes x samples matrix file (TSV or CSV)
    #[arg(long)]
    pub matrix: Option<PathBuf>,

    /// Detection p-value matrix matching --matrix
    #[arg(long, requires = "matrix")]
    pub detection: Option<PathBuf>,

    /// Sample metadata file (first column = sample ID)
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,

    /// Array type: expression or methylation
    #[arg(short, long)]
    pub array_type: Option<ArrayType>,

    /// Background correction: rma or none
    #[arg(long, value_parser = parse_background)]
    pub background: Option<BackgroundMethod>,

    /// Skip quantile normalization
    #[arg(long)]
    pub no_quantile: bool,

    /// Skip median polish summarization of probe sets
    #[arg(long)]
    pub no_summarize: bool,

    /// Detection p-value threshold [default: 0.01]
    #[arg(long)]
    pub detection_threshold: Option<f64>,

    /// Minimum number of samples passing detection [default: all]
    #[arg(long)]
    pub min_detected: Option<usize>,
}

fn parse_background(s: &str) -> Result<BackgroundMethod, String> {
    match s.to_ascii_lowercase().as_str() {
        "rma" => Ok(BackgroundMethod::Rma),
        "none" => Ok(BackgroundMethod::None),
        other => Err(format!("unknown background method '{}'", other)),
    }
}

impl InputArgs {
    /// Load the config file (or defaults) and apply the input flags
    pub fn resolve(&self) -> crate::error::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(dir) = &self.raw_dir {
            config.input.raw_dir = Some(dir.clone());
            config.input.matrix = None;
        }
        if let Some(matrix) = &self.matrix {
            config.input.matrix = Some(matrix.clone());
            config.input.raw_dir = None;
        }
        if self.detection.is_some() {
            config.input.detection = self.detection.clone();
        }
        if self.metadata.is_some() {
            config.input.metadata = self.metadata.clone();
        }
        if let Some(array_type) = self.array_type {
            config.array_type = array_type;
        }
        if let Some(background) = self.background {
            config.normalize.background = background;
        }
        if self.no_quantile {
            config.normalize.quantile = false;
        }
        if self.no_summarize {
            config.normalize.summarize = false;
        }
        if let Some(threshold) = self.detection_threshold {
            config.filter.detection_threshold = threshold;
        }
        if self.min_detected.is_some() {
            config.filter.min_detected_samples = self.min_detected;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full differential analysis
    #[command(
        long_about = "Run the full differential analysis\n\n\
            Loads raw arrays and sample metadata, filters probes, normalizes,\n\
            fits a cell-means linear model per probe, moderates the variances\n\
            with empirical Bayes, adjusts p-values, joins probe annotation and\n\
            writes the ranked table, summary, histogram and plot-data tables.",
        after_long_help = "\
Examples:
  # Expression arrays, two groups
  rust_microarray run -r raw/ -m samples.tsv -g diagnosis \\
    --numerator AD --denominator Control -n annotation.tsv -o results/

  # Methylation betas in a matrix, contrast expression, batch covariate
  rust_microarray run --matrix betas.tsv --detection detp.tsv -m samples.tsv \\
    -a methylation -g condition --covariate batch --contrast \"iN-Fibroblast\"

  # Everything from a JSON config, overriding alpha
  rust_microarray run -c analysis.json --alpha 0.1"
    )]
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Probe annotation file
        #[arg(short = 'n', long)]
        annotation: Option<PathBuf>,

        /// Annotation layout preset: default, illumina or affymetrix
        #[arg(long,
            long_help = "Layout of the annotation file.\n\
                default:     ID, gene_symbol, chromosome, position, feature_type (tab)\n\
                illumina:    Illumina methylation manifest (7 heading lines, CSV)\n\
                affymetrix:  Affymetrix annotation export (tab)")]
        annotation_format: Option<String>,

        /// Coverage policy for unannotated probes: strict or tolerant
        #[arg(long,
            long_help = "What to do with probes that have no annotation.\n\
                strict:   any unannotated probe is an error (expression default)\n\
                tolerant: unannotated probes are dropped with a warning, up to\n\
                          --max-missing of all probes (methylation default)")]
        coverage: Option<String>,

        /// Largest tolerated fraction of unannotated probes [default: 0.5]
        #[arg(long)]
        max_missing: Option<f64>,

        /// Metadata column with the sample groups [default: group]
        #[arg(short, long)]
        group: Option<String>,

        /// Group level order, comma-separated [default: alphabetical]
        #[arg(long, value_delimiter = ',')]
        levels: Option<Vec<String>>,

        /// Additive categorical covariate (repeatable)
        #[arg(long)]
        covariate: Vec<String>,

        /// Contrast expression over design columns, e.g. "AD-Control"
        #[arg(long, conflicts_with_all = ["numerator", "denominator"])]
        contrast: Option<String>,

        /// Numerator group level
        #[arg(long)]
        numerator: Option<String>,

        /// Denominator group level
        #[arg(long)]
        denominator: Option<String>,

        /// P-value adjustment: bh, by, bonferroni, holm or none [default: bh]
        #[arg(long)]
        adjust: Option<AdjustMethod>,

        /// Significance threshold on adjusted p-values [default: 0.05]
        #[arg(long)]
        alpha: Option<f64>,

        /// Minimum absolute log fold change for the up / down gene lists [default: 0]
        #[arg(long)]
        min_lfc: Option<f64>,

        /// Assumed proportion of differential probes for B [default: 0.01]
        #[arg(long)]
        proportion: Option<f64>,

        /// Keep only the best N rows in the ranked table
        #[arg(long)]
        top: Option<usize>,

        /// Output directory [default: results]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ranked table file name; .csv gives comma-separated output [default: results.tsv]
        #[arg(long)]
        table_name: Option<String>,
    },

    /// Load, filter and normalize only
    #[command(
        long_about = "Load, filter and normalize only.\n\n\
            Writes the normalized matrix (log2 intensities for expression arrays,\n\
            M-values for methylation arrays).",
        after_long_help = "\
Examples:
  rust_microarray normalize -r raw/ -m samples.tsv -o normalized.tsv
  rust_microarray normalize --matrix betas.tsv -m samples.tsv -a methylation -o mvalues.tsv"
    )]
    Normalize {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a synthetic dataset with known differential probes
    #[command(
        after_long_help = "\
Examples:
  rust_microarray simulate -o demo/
  rust_microarray simulate -o demo/ -a methylation --rows 5000 --detection"
    )]
    Simulate(SimulateArgs),
}

/// Parse a coverage policy name
pub fn parse_coverage(name: &str, max_missing: Option<f64>) -> Result<CoveragePolicy, String> {
    match name.to_ascii_lowercase().as_str() {
        "strict" => Ok(CoveragePolicy::Strict),
        "tolerant" => Ok(CoveragePolicy::Tolerant {
            max_missing_fraction: max_missing.unwrap_or(0.5),
        }),
        other => Err(format!("unknown coverage policy '{}'", other)),
    }
}

/// Flags of the `simulate` subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Array type: expression or methylation [default: expression]
    #[arg(short, long, default_value = "expression")]
    pub array_type: ArrayType,

    /// Number of modeled rows [default: 100]
    #[arg(long, default_value = "100")]
    pub rows: usize,

    /// Probes per probe set (expression only) [default: 1]
    #[arg(long, default_value = "1")]
    pub probes_per_set: usize,

    /// Samples per group [default: 5]
    #[arg(long, default_value = "5")]
    pub samples_per_group: usize,

    /// Number of differential rows [default: 10]
    #[arg(long, default_value = "10")]
    pub differential: usize,

    /// Absolute injected log fold change [default: 2.0]
    #[arg(long, default_value = "2.0")]
    pub log_fc: f64,

    /// Residual standard deviation [default: 0.3]
    #[arg(long, default_value = "0.3")]
    pub noise_sd: f64,

    /// Emit detection p-values
    #[arg(long)]
    pub detection: bool,

    /// Random seed [default: 42]
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

impl SimulateArgs {
    /// Simulation settings from the flags
    pub fn params(&self) -> SimulationParams {
        SimulationParams {
            array_type: self.array_type,
            n_rows: self.rows,
            probes_per_set: self.probes_per_set,
            samples_per_group: self.samples_per_group,
            n_differential: self.differential,
            log_fc: self.log_fc,
            noise_sd: self.noise_sd,
            detection: self.detection,
            seed: self.seed,
            ..SimulationParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "rust_microarray",
            "normalize",
            "--matrix",
            "betas.tsv",
            "-m",
            "samples.tsv",
            "-a",
            "methylation",
            "--detection-threshold",
            "0.05",
            "-o",
            "m.tsv",
        ])
        .unwrap();
        let Commands::Normalize { input, .. } = cli.command else {
            panic!("expected normalize");
        };
        let config = input.resolve().unwrap();
        assert_eq!(config.array_type, ArrayType::Methylation);
        assert_eq!(config.filter.detection_threshold, 0.05);
        assert_eq!(config.input.matrix, Some(PathBuf::from("betas.tsv")));
        config.validate().unwrap();
    }

    #[test]
    fn test_contrast_conflicts_with_levels_pair() {
        let parsed = Cli::try_parse_from([
            "rust_microarray",
            "run",
            "-r",
            "raw",
            "--contrast",
            "A-B",
            "--numerator",
            "A",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_coverage_names() {
        assert_eq!(parse_coverage("strict", None).unwrap(), CoveragePolicy::Strict);
        assert_eq!(
            parse_coverage("Tolerant", Some(0.2)).unwrap(),
            CoveragePolicy::Tolerant {
                max_missing_fraction: 0.2
            }
        );
        assert!(parse_coverage("lenient", None).is_err());
    }

    #[test]
    fn test_simulate_flags() {
        let cli = Cli::try_parse_from([
            "rust_microarray",
            "simulate",
            "-o",
            "demo",
            "-a",
            "methylation",
            "--rows",
            "500",
            "--detection",
        ])
        .unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        let params = args.params();
        assert_eq!(args.output, PathBuf::from("demo"));
        assert_eq!(params.array_type, ArrayType::Methylation);
        assert_eq!(params.n_rows, 500);
        assert!(params.detection);
        assert_eq!(params.seed, 42);
    }
}
