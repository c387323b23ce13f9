//! Error types for rust_microarray

use thiserror::Error;

/// Main error type for array analysis operations
#[derive(Error, Debug)]
pub enum ArrayError {
    /// Malformed or missing input, or sample/file identifiers that do not line up
    #[error("Parse error in {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    /// Unusable run configuration (grouping covariate, levels, contrast, parameters)
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Annotation join keys missing or ambiguous
    #[error("Integrity error: {reason}")]
    Integrity { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid intensity matrix: {reason}")]
    InvalidMatrix { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ArrayError {
    pub(crate) fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        ArrayError::Parse {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        ArrayError::Config {
            reason: reason.into(),
        }
    }
}

/// Result type alias for array analysis operations
pub type Result<T> = std::result::Result<T, ArrayError>;
