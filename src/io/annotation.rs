//! Probe annotation reader (array manifests / annotation exports)

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::delimited::{display_name, headers, is_missing, open_delimited, optional_text, records};
use crate::data::{AnnotationTable, ProbeAnnotation};
use crate::error::{ArrayError, Result};

/// Layout of an annotation file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationFormat {
    /// Leading lines skipped before the header row
    pub skip_lines: usize,
    /// Field delimiter; detected from the header when absent
    pub delimiter: Option<char>,
    pub id_column: String,
    pub symbol_column: String,
    pub chromosome_column: Option<String>,
    pub position_column: Option<String>,
    pub feature_type_column: Option<String>,
}

impl Default for AnnotationFormat {
    fn default() -> Self {
        Self {
            skip_lines: 0,
            delimiter: None,
            id_column: "ID".to_string(),
            symbol_column: "gene_symbol".to_string(),
            chromosome_column: Some("chromosome".to_string()),
            position_column: Some("position".to_string()),
            feature_type_column: Some("feature_type".to_string()),
        }
    }
}

impl AnnotationFormat {
    /// Illumina methylation manifest (7 heading lines before the assay header)
    pub fn illumina_methylation() -> Self {
        Self {
            skip_lines: 7,
            delimiter: Some(','),
            id_column: "IlmnID".to_string(),
            symbol_column: "UCSC_RefGene_Name".to_string(),
            chromosome_column: Some("CHR".to_string()),
            position_column: Some("MAPINFO".to_string()),
            feature_type_column: Some("Relation_to_UCSC_CpG_Island".to_string()),
        }
    }

    /// Affymetrix expression annotation export (tab-delimited)
    pub fn affymetrix_expression() -> Self {
        Self {
            skip_lines: 0,
            delimiter: Some('\t'),
            id_column: "Probe Set ID".to_string(),
            symbol_column: "Gene Symbol".to_string(),
            chromosome_column: Some("Chromosome".to_string()),
            position_column: Some("Start".to_string()),
            feature_type_column: Some("Sequence Type".to_string()),
        }
    }
}

/// First symbol of a multi-valued field ("A;A;B" or "A /// B")
fn first_symbol(field: &str) -> Option<String> {
    field
        .split(|c| c == ';' || c == '/')
        .map(str::trim)
        .find(|s| !s.is_empty() && !is_missing(s))
        .map(|s| s.to_string())
}

fn optional_column(header: &[String], name: &Option<String>, source: &str) -> Option<usize> {
    let name = name.as_ref()?;
    let pos = header.iter().position(|h| h == name);
    if pos.is_none() {
        log::warn!("Annotation column '{}' not found in {}; leaving it empty", name, source);
    }
    pos
}

/// Read an annotation table following `format`
pub fn read_annotation_table<P: AsRef<Path>>(path: P, format: &AnnotationFormat) -> Result<AnnotationTable> {
    let path = path.as_ref();
    let source = display_name(path);
    let delimiter = format.delimiter.map(|c| c as u8);
    let mut reader = open_delimited(path, format.skip_lines, delimiter)?;
    let header = headers(&mut reader, &source)?;

    let required = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ArrayError::parse(&source, format!("missing annotation column '{}'", name)))
    };
    let id_col = required(&format.id_column)?;
    let symbol_col = required(&format.symbol_column)?;
    let chrom_col = optional_column(&header, &format.chromosome_column, &source);
    let pos_col = optional_column(&header, &format.position_column, &source);
    let type_col = optional_column(&header, &format.feature_type_column, &source);

    let mut annotations = Vec::new();
    for row in records(&mut reader, &source) {
        let (line, record) = row?;
        let probe_id = record[id_col].to_string();
        // Trailing manifest sections (e.g. "[Controls]") end the assay block
        if probe_id.starts_with('[') {
            break;
        }
        let position = match pos_col.map(|c| &record[c]) {
            Some(field) if !is_missing(field) => Some(field.trim().parse::<u64>().map_err(|_| {
                ArrayError::parse(&source, format!("invalid position '{}' at line {}", field, line))
            })?),
            _ => None,
        };
        annotations.push(ProbeAnnotation {
            probe_id,
            gene_symbol: first_symbol(&record[symbol_col]),
            chromosome: chrom_col.and_then(|c| optional_text(&record[c])),
            position,
            feature_type: type_col.and_then(|c| optional_text(&record[c])),
        });
    }

    log::info!("  {} annotation records", annotations.len());
    AnnotationTable::new(annotations)
}
