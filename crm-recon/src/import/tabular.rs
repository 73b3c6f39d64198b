//! Spreadsheet exports read as header -> value rows

use crate::row::LegacyRow;
use crm_common::{Error, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// Read every data row of a CSV export
///
/// Headers are trimmed (the row accessor lowercases them); empty cells become
/// `Null`. Rows may be shorter or longer than the header row. Bytes that are
/// not UTF-8 (Latin-1 spreadsheet exports) decode lossily instead of failing
/// the file.
pub fn read_rows(path: &Path) -> Result<Vec<LegacyRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::Tabular(format!("Open {} failed: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| Error::Tabular(format!("Read headers of {} failed: {}", path.display(), e)))?
        .iter()
        .map(|h| decode_cell(h).trim_start_matches('\u{feff}').to_string())
        .collect();
    debug!("{} headers: {:?}", path.display(), headers);

    let mut rows = Vec::new();
    let mut lossy = 0usize;
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record
            .map_err(|e| Error::Tabular(format!("{} row {}: {}", path.display(), idx + 2, e)))?;
        if std::str::from_utf8(record.as_slice()).is_err() {
            lossy += 1;
        }

        let pairs = headers.iter().zip(record.iter()).map(|(header, cell)| {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(decode_cell(cell))
            };
            (header.as_str(), value)
        });
        rows.push(LegacyRow::from_pairs(pairs));
    }

    if lossy > 0 {
        warn!("{} rows of {} are not valid UTF-8; decoded lossily", lossy, path.display());
    }
    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn decode_cell(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
