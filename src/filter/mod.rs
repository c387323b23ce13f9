//! Probe filtering before normalization and modeling

mod quality;

pub use quality::{quality_filter, quality_filter_raw, select_probes, FilterParams, FilterReport};
