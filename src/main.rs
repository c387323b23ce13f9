//! rust_microarray command-line interface

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{info, LevelFilter};

use rust_microarray::cli::{parse_coverage, Cli, Commands, InputArgs};
use rust_microarray::prelude::*;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    let result = match &cli.command {
        Commands::Run {
            input,
            annotation,
            annotation_format,
            coverage,
            max_missing,
            group,
            levels,
            covariate,
            contrast,
            numerator,
            denominator,
            adjust,
            alpha,
            min_lfc,
            proportion,
            top,
            output,
            table_name,
        } => run_analysis(
            input,
            RunOverrides {
                annotation: annotation.clone(),
                annotation_format: annotation_format.clone(),
                coverage: coverage.clone(),
                max_missing: *max_missing,
                group: group.clone(),
                levels: levels.clone(),
                covariates: covariate.clone(),
                contrast: contrast.clone(),
                numerator: numerator.clone(),
                denominator: denominator.clone(),
                adjust: *adjust,
                alpha: *alpha,
                min_lfc: *min_lfc,
                proportion: *proportion,
                top: *top,
                output: output.clone(),
                table_name: table_name.clone(),
            },
        ),
        Commands::Normalize { input, output } => run_normalize(input, output),
        Commands::Simulate(args) => run_simulate(&args.params(), &args.output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// `run` flags layered over the loaded configuration
struct RunOverrides {
    annotation: Option<PathBuf>,
    annotation_format: Option<String>,
    coverage: Option<String>,
    max_missing: Option<f64>,
    group: Option<String>,
    levels: Option<Vec<String>>,
    covariates: Vec<String>,
    contrast: Option<String>,
    numerator: Option<String>,
    denominator: Option<String>,
    adjust: Option<AdjustMethod>,
    alpha: Option<f64>,
    min_lfc: Option<f64>,
    proportion: Option<f64>,
    top: Option<usize>,
    output: Option<PathBuf>,
    table_name: Option<String>,
}

fn annotation_preset(name: &str) -> Result<AnnotationFormat> {
    match name.to_ascii_lowercase().as_str() {
        "default" => Ok(AnnotationFormat::default()),
        "illumina" => Ok(AnnotationFormat::illumina_methylation()),
        "affymetrix" => Ok(AnnotationFormat::affymetrix_expression()),
        other => Err(ArrayError::Config {
            reason: format!("unknown annotation format '{}'", other),
        }),
    }
}

fn apply_overrides(config: &mut AnalysisConfig, o: RunOverrides) -> Result<()> {
    if o.annotation.is_some() {
        config.input.annotation = o.annotation;
    }
    if let Some(name) = &o.annotation_format {
        config.annotation_format = annotation_preset(name)?;
    }
    if let Some(name) = &o.coverage {
        config.coverage = Some(parse_coverage(name, o.max_missing).map_err(|reason| ArrayError::Config { reason })?);
    } else if let Some(fraction) = o.max_missing {
        config.coverage = Some(CoveragePolicy::Tolerant {
            max_missing_fraction: fraction,
        });
    }
    if let Some(group) = o.group {
        config.design.group = group;
    }
    if o.levels.is_some() {
        config.design.levels = o.levels;
    }
    if !o.covariates.is_empty() {
        config.design.covariates = o.covariates;
    }
    if o.contrast.is_some() {
        config.design.contrast = o.contrast;
        config.design.numerator = None;
        config.design.denominator = None;
    }
    if o.numerator.is_some() || o.denominator.is_some() {
        config.design.contrast = None;
        config.design.numerator = o.numerator;
        config.design.denominator = o.denominator;
    }
    if let Some(adjust) = o.adjust {
        config.adjust = adjust;
    }
    if let Some(alpha) = o.alpha {
        config.report.alpha = alpha;
    }
    if let Some(min_lfc) = o.min_lfc {
        config.report.min_lfc = min_lfc;
    }
    if let Some(proportion) = o.proportion {
        config.ebayes.proportion = proportion;
    }
    if o.top.is_some() {
        config.report.top_n = o.top;
    }
    if let Some(output) = o.output {
        config.output_dir = output;
    }
    if let Some(table_name) = o.table_name {
        config.report.table_name = table_name;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn run_analysis(input: &InputArgs, overrides: RunOverrides) -> Result<()> {
    let mut config = input.resolve()?;
    apply_overrides(&mut config, overrides)?;
    config.validate()?;

    let output = run_pipeline(&config)?;
    info!(
        "Filter removed {} of {} probes",
        output.filter.removed(),
        output.filter.input_probes
    );

    let config_path = config.output_dir.join("config.json");
    rust_microarray::io::write_json(&config_path, &config)?;
    info!("Run configuration written to {}", config_path.display());
    info!("Done!");
    Ok(())
}

fn run_normalize(input: &InputArgs, output_path: &Path) -> Result<()> {
    let config = input.resolve()?;
    let (matrix, _, report) = prepare(&config)?;
    info!("Filter removed {} of {} probes", report.removed(), report.input_probes);

    info!("Writing normalized matrix to: {}", output_path.display());
    write_matrix(output_path, &matrix)?;
    info!("Done!");
    Ok(())
}

fn run_simulate(params: &SimulationParams, out_dir: &Path) -> Result<()> {
    let dataset = simulate(params)?;
    let files = write_dataset(out_dir, &dataset)?;
    info!("Raw files: {}", files.raw_dir.display());
    info!("Metadata: {}", files.metadata.display());
    info!("Annotation: {}", files.annotation.display());
    info!("Injected effects: {}", files.truth.display());
    Ok(())
}
