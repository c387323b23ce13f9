//! Linear models for array data: design, contrasts and per-row fits

mod contrast;
mod design;
mod fitting;
mod linalg;

pub use contrast::ContrastSpec;
pub use design::{check_full_rank, DesignBuilder, DesignMatrix};
pub use fitting::{lm_fit, ContrastFit, LinearFit};
