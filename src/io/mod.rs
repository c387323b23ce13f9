//! Input/Output operations for array data

mod annotation;
mod delimited;
mod export;
mod metadata;
mod raw;
mod results;

pub use annotation::{read_annotation_table, AnnotationFormat};
pub use export::{write_json, write_lines, write_matrix, write_records};
pub use metadata::read_sample_annotation;
pub use raw::{load_dataset, load_matrix_dataset, read_intensity_matrix, read_raw_directory, RawArrayData, FILE_NAME_COLUMN};
pub use results::{DiffRecord, ModelResult, ResultsSummary};

pub(crate) use results::nan_last;
