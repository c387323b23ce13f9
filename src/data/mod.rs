//! Data structures for array analysis

mod features;
mod intensity;
mod samples;

pub use features::{AnnotationTable, ProbeAnnotation};
pub use intensity::IntensityMatrix;
pub use samples::SampleAnnotation;
