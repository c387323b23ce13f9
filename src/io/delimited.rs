//! Shared helpers for delimited (TSV / CSV) input and output

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ArrayError, Result};

/// Tokens read as a missing value
const MISSING_TOKENS: [&str; 5] = ["", "NA", "NaN", "nan", "null"];

pub(crate) fn display_name(path: &Path) -> String {
    path.display().to_string()
}

/// Whether a field holds a missing value
pub(crate) fn is_missing(field: &str) -> bool {
    MISSING_TOKENS.contains(&field.trim())
}

/// Parse a numeric field; missing tokens become NaN
pub(crate) fn parse_value(field: &str, source: &str, line: u64) -> Result<f64> {
    let field = field.trim();
    if is_missing(field) {
        return Ok(f64::NAN);
    }
    field.parse::<f64>().map_err(|_| {
        ArrayError::parse(source, format!("invalid numeric value '{}' at line {}", field, line))
    })
}

/// Optional text field; missing tokens become None
pub(crate) fn optional_text(field: &str) -> Option<String> {
    if is_missing(field) {
        None
    } else {
        Some(field.trim().to_string())
    }
}

/// Delimiter for an output path: comma for `.csv`, tab otherwise
pub(crate) fn delimiter_for_output(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

/// Guess the delimiter from the first buffered line: tab wins over comma
fn sniff_delimiter(buf: &[u8]) -> u8 {
    let first_line = buf.split(|&b| b == b'\n').next().unwrap_or(buf);
    if first_line.contains(&b'\t') {
        b'\t'
    } else if first_line.contains(&b',') {
        b','
    } else {
        b'\t'
    }
}

/// Open a delimited file with a header row after `skip_lines` leading lines.
///
/// Missing files and unreadable headers are reported as parse errors naming
/// the file. When `delimiter` is `None` it is detected from the header line.
pub(crate) fn open_delimited(
    path: &Path,
    skip_lines: usize,
    delimiter: Option<u8>,
) -> Result<csv::Reader<BufReader<File>>> {
    let name = display_name(path);
    let file = File::open(path).map_err(|e| ArrayError::parse(&name, format!("cannot open: {}", e)))?;
    let mut reader = BufReader::new(file);

    let mut line = String::new();
    for skipped in 0..skip_lines {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(ArrayError::parse(
                &name,
                format!("file ended after {} of {} skipped lines", skipped, skip_lines),
            ));
        }
    }

    let delimiter = match delimiter {
        Some(d) => d,
        None => sniff_delimiter(reader.fill_buf()?),
    };

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader))
}

/// Header names of an open reader
pub(crate) fn headers<R: std::io::Read>(reader: &mut csv::Reader<R>, source: &str) -> Result<Vec<String>> {
    let headers = reader
        .headers()
        .map_err(|e| ArrayError::parse(source, format!("unreadable header: {}", e)))?;
    if headers.is_empty() {
        return Err(ArrayError::parse(source, "empty header row"));
    }
    Ok(headers.iter().map(|h| h.to_string()).collect())
}

/// Iterate records, converting csv errors into parse errors naming the file
pub(crate) fn records<'r, R: std::io::Read + 'r>(
    reader: &'r mut csv::Reader<R>,
    source: &'r str,
) -> impl Iterator<Item = Result<(u64, csv::StringRecord)>> + 'r {
    reader.records().map(move |record| {
        let record = record.map_err(|e| ArrayError::parse(source, e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        Ok((line, record))
    })
}
