//! Sample metadata reader

use std::path::Path;

use super::delimited::{display_name, headers, open_delimited, optional_text, records};
use crate::data::SampleAnnotation;
use crate::error::{ArrayError, Result};

/// Read sample metadata from a delimited file with a header row.
///
/// First column = sample IDs, remaining columns = categorical covariates.
/// Empty fields and `NA` are read as missing.
pub fn read_sample_annotation<P: AsRef<Path>>(path: P) -> Result<SampleAnnotation> {
    let path = path.as_ref();
    let source = display_name(path);
    let mut reader = open_delimited(path, 0, None)?;
    let header = headers(&mut reader, &source)?;
    let covariate_names: Vec<String> = header[1..].to_vec();

    let mut sample_ids: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); covariate_names.len()];

    for row in records(&mut reader, &source) {
        let (line, record) = row?;
        let sample_id = record[0].to_string();
        if sample_id.is_empty() {
            return Err(ArrayError::parse(&source, format!("empty sample ID at line {}", line)));
        }
        sample_ids.push(sample_id);
        for (column, field) in columns.iter_mut().zip(record.iter().skip(1)) {
            column.push(optional_text(field));
        }
    }

    if sample_ids.is_empty() {
        return Err(ArrayError::parse(&source, "no samples found in metadata"));
    }

    let mut annotation = SampleAnnotation::new(sample_ids)?;
    for (name, values) in covariate_names.iter().zip(columns) {
        annotation.add_covariate(name, values)?;
    }

    Ok(annotation)
}
