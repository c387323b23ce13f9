//! Writers for matrices, result tables and run summaries

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use super::delimited::delimiter_for_output;
use crate::data::IntensityMatrix;
use crate::error::Result;

/// Write a probes x samples matrix (tab- or comma-delimited by extension)
pub fn write_matrix<P: AsRef<Path>>(path: P, matrix: &IntensityMatrix) -> Result<()> {
    let path = path.as_ref();
    let delimiter = delimiter_for_output(path);
    let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_path(path)?;

    let mut header = vec!["probe_id".to_string()];
    header.extend(matrix.sample_ids().iter().cloned());
    writer.write_record(&header)?;

    let values = matrix.values();
    for (i, probe_id) in matrix.probe_ids().iter().enumerate() {
        let mut row = Vec::with_capacity(matrix.n_samples() + 1);
        row.push(probe_id.clone());
        row.extend(values.row(i).iter().map(|v| format!("{:.6}", v)));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write serializable rows with a header derived from the field names
pub fn write_records<P: AsRef<Path>, T: Serialize>(path: P, rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    let delimiter = delimiter_for_output(path);
    let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write any serializable value as pretty JSON
pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// Write one identifier per line
pub fn write_lines<P: AsRef<Path>, S: AsRef<str>>(path: P, lines: &[S]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line.as_ref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DiffRecord;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_write_matrix_tsv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("norm.tsv");
        let matrix = IntensityMatrix::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            vec!["p1".to_string(), "p2".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();
        write_matrix(&path, &matrix).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "probe_id\ts1\ts2");
        assert_eq!(lines[1], "p1\t1.000000\t2.000000");
    }

    #[test]
    fn test_write_records_csv_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("res.csv");
        write_records(&path, &[DiffRecord::missing("cg1", 0.5)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("probe_id,log_fc,ave_expr,t,p_value,adj_p_value,b"));
        assert!(text.contains("cg1"));
    }
}
