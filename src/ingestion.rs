//! CSV ingestion - the leaf that turns exported files into tables
//!
//! The engine itself only ever sees parsed tables; this module is the
//! ingestion step feeding it. Header row becomes the column list, the
//! table name is the file stem, and cells are coerced null/bool/number
//! before falling back to string.

use crate::error::{MatchError, Result};
use crate::table::{Row, Table};
use crate::value::CellValue;
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

/// Parse a CSV file into a table named after the file stem.
pub fn table_from_csv_path(path: &Path) -> Result<Table> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            MatchError::Ingestion(format!("cannot derive table name from '{}'", path.display()))
        })?
        .to_string();
    let file = std::fs::File::open(path)?;
    table_from_csv(&name, file)
}

/// Parse CSV text from any reader. The first record is the header row.
pub fn table_from_csv(name: &str, reader: impl Read) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| MatchError::Ingestion(format!("failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row: Row = columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let cell = record.get(i).map(coerce_cell).unwrap_or(CellValue::Null);
                (col.clone(), cell)
            })
            .collect();
        rows.push(row);
    }

    Table::new(name, columns, rows)
}

/// Coerce a raw CSV cell: empty becomes null, then bool, integer and float
/// parses are tried before falling back to the trimmed string.
fn coerce_cell(s: &str) -> CellValue {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return CellValue::Null;
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return CellValue::Number(i as f64);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return CellValue::Number(f);
        }
    }

    CellValue::Str(trimmed.to_string())
}
