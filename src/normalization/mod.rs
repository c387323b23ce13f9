//! Normalization of raw array measurements
//!
//! Expression arrays follow the RMA order: background correction, quantile
//! normalization, log2, then median polish summarization of probe sets.
//! Methylation arrays are quantile-normalized as beta values and converted to
//! M-values for modeling.

mod background;
mod methylation;
mod quantile;
mod summarize;

pub use background::{adjust_background, estimate_background, rma_background, BackgroundMethod, BackgroundParams};
pub use methylation::{beta_to_m, m_to_beta, validate_beta, DEFAULT_BETA_OFFSET};
pub use quantile::{quantile_normalize, reference_distribution};
pub use summarize::{median_polish, summarize_probe_groups, MedianPolish};

use serde::{Deserialize, Serialize};

use crate::data::IntensityMatrix;
use crate::error::Result;
use crate::io::RawArrayData;

/// Kind of array being analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayType {
    /// Gene expression intensities
    Expression,
    /// Methylation beta values
    Methylation,
}

impl std::str::FromStr for ArrayType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expression" => Ok(ArrayType::Expression),
            "methylation" => Ok(ArrayType::Methylation),
            other => Err(format!("unknown array type '{}'", other)),
        }
    }
}

/// Configurable normalization steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    pub background: BackgroundMethod,
    pub quantile: bool,
    /// log2 transform intensities (expression arrays only)
    pub log2: bool,
    /// Median polish over probe groups when the data carries them
    pub summarize: bool,
    /// Clamp offset used by the beta to M conversion
    pub beta_offset: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            background: BackgroundMethod::Rma,
            quantile: true,
            log2: true,
            summarize: true,
            beta_offset: DEFAULT_BETA_OFFSET,
        }
    }
}

/// Element-wise log2; values that are not positive become missing
pub fn log2_transform(matrix: &IntensityMatrix) -> Result<IntensityMatrix> {
    let non_positive = matrix.values().iter().filter(|&&v| v <= 0.0).count();
    if non_positive > 0 {
        log::warn!("{} non-positive intensities set to missing before log2", non_positive);
    }
    let logged = matrix.values().mapv(|v| if v > 0.0 { v.log2() } else { f64::NAN });
    matrix.with_values(logged)
}

/// Normalize raw data for modeling
pub fn normalize(raw: &RawArrayData, array_type: ArrayType, params: &NormalizeParams) -> Result<IntensityMatrix> {
    match array_type {
        ArrayType::Expression => normalize_expression(raw, params),
        ArrayType::Methylation => normalize_methylation(&raw.intensities, params),
    }
}

fn normalize_expression(raw: &RawArrayData, params: &NormalizeParams) -> Result<IntensityMatrix> {
    let mut matrix = match params.background {
        BackgroundMethod::Rma => {
            log::info!("RMA background correction of {} samples", raw.intensities.n_samples());
            rma_background(&raw.intensities)?
        }
        BackgroundMethod::None => raw.intensities.clone(),
    };

    if params.quantile {
        log::info!("Quantile normalization");
        matrix = quantile_normalize(&matrix)?;
    }

    if params.log2 {
        matrix = log2_transform(&matrix)?;
    }

    match (&raw.probe_groups, params.summarize) {
        (Some(groups), true) => summarize_probe_groups(&matrix, groups),
        _ => Ok(matrix),
    }
}

fn normalize_methylation(betas: &IntensityMatrix, params: &NormalizeParams) -> Result<IntensityMatrix> {
    validate_beta(betas)?;
    if params.background != BackgroundMethod::None {
        log::debug!("Background correction does not apply to beta values; skipped");
    }

    let matrix = if params.quantile {
        log::info!("Quantile normalization of beta values");
        quantile_normalize(betas)?
    } else {
        betas.clone()
    };

    log::info!("Converting beta values to M-values");
    beta_to_m(&matrix, params.beta_offset)
}
