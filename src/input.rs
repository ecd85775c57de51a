use std::fs;
use std::path::Path;

use crate::error::StagerError;

pub const DEFAULT_ID_COLUMN: &str = "pmcid";

/// Reads the identifier column from a CSV file (tab-separated when the
/// extension is `.tsv` or `.tab`). Cells are returned raw, blanks included,
/// so every input row gets a ledger row.
pub fn read_identifiers(path: &Path, column: &str) -> Result<Vec<String>, StagerError> {
    let content =
        fs::read_to_string(path).map_err(|_| StagerError::InputRead(path.to_path_buf()))?;
    let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => b'\t',
        _ => b',',
    };
    parse_identifiers(&content, delimiter, column)
}

pub fn parse_identifiers(
    content: &str,
    delimiter: u8,
    column: &str,
) -> Result<Vec<String>, StagerError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| StagerError::InputParse(err.to_string()))?;
    let index = headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| StagerError::MissingIdColumn(column.to_string()))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| StagerError::InputParse(err.to_string()))?;
        ids.push(record.get(index).unwrap_or_default().to_string());
    }
    Ok(ids)
}
