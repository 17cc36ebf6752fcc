//! Tabular export of aggregated records and identifier import for acquisition.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::models::Record;

const IDENTIFIER_COLUMNS: [&str; 3] = ["identifier", "doi", "DOI"];

/// Write `records` as CSV with a header row, one column per entry in `columns`.
pub fn write_records_csv<S: AsRef<str>>(
    path: &Path,
    records: &[Record],
    columns: &[S],
) -> Result<()> {
    for column in columns {
        if Record::default().get(column.as_ref()).is_none() {
            return Err(CoreError::UnknownColumn(column.as_ref().to_string()));
        }
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns.iter().map(|column| column.as_ref()))?;
    for record in records {
        writer.write_record(
            columns
                .iter()
                .map(|column| record.get(column.as_ref()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;

    info!(path = %path.display(), count = records.len(), "metadata written");
    Ok(())
}

/// Read records previously written by [`write_records_csv`]. Missing columns
/// come back as empty strings.
pub fn read_records_csv(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<Record>() {
        records.push(row?);
    }
    Ok(records)
}

/// Pull the identifier column out of a metadata CSV. Rows without an
/// identifier are skipped.
pub fn read_identifiers_csv(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = IDENTIFIER_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .ok_or_else(|| CoreError::MissingColumn {
            path: path.display().to_string(),
            expected: IDENTIFIER_COLUMNS.join(", "),
        })?;

    let mut identifiers = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        match row.get(column).map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => identifiers.push(value.to_string()),
            None => warn!(row = line + 1, "record has no identifier, skipping"),
        }
    }
    Ok(identifiers)
}
