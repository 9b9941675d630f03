// ============================================================
// Dataset Loader
// ============================================================
// Loads raw training/evaluation data into RawDataset rows.
//
// Two input formats:
//   Csv  — RFC 4180 with a header row, parsed by the csv crate.
//          Each record becomes one row; every header column is
//          kept, so task adapters can pick the columns they need.
//   Text — line-delimited plain text. Each non-blank line becomes
//          one row with a single "text" column.
//
// The caller names the required columns up front (they come from
// the task's tokenisation adapter), so a missing column fails
// here with the file path in the error, not three stages later
// inside tokenisation.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::raw::{RawDataset, RawRow};
use crate::error::{Error, Result};

/// Which on-disk shape the input file has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Text,
}

/// Load a dataset file into rows, verifying that every column in
/// `required_columns` is available.
pub fn load_rows(path: &Path, format: FileFormat, required_columns: &[&str]) -> Result<RawDataset> {
    if !path.exists() {
        return Err(Error::data_load(path, "file does not exist"));
    }

    let dataset = match format {
        FileFormat::Csv  => load_csv(path, required_columns)?,
        FileFormat::Text => load_text(path, required_columns)?,
    };

    tracing::info!("Loaded {} rows from '{}'", dataset.len(), path.display());
    Ok(dataset)
}

fn load_csv(path: &Path, required_columns: &[&str]) -> Result<RawDataset> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::data_load(path, e.to_string()))?;

    // Header check first, so the error names the column and the file
    let headers = reader
        .headers()
        .map_err(|e| Error::data_load(path, format!("cannot read header row: {e}")))?
        .clone();

    for col in required_columns {
        if !headers.iter().any(|h| h == *col) {
            return Err(Error::data_load(
                path,
                format!("header has no '{col}' column (found: {})", headers.iter().collect::<Vec<_>>().join(", ")),
            ));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        // The csv crate reports the position of a bad record itself
        let record = record.map_err(|e| Error::data_load(path, e.to_string()))?;

        let mut row = RawRow::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header, value);
        }
        rows.push(row);
    }

    Ok(RawDataset::new(rows))
}

fn load_text(path: &Path, required_columns: &[&str]) -> Result<RawDataset> {
    // Text files only ever provide the "text" column. If the task
    // needs more, say so here instead of failing inside the adapter.
    for col in required_columns {
        if *col != "text" {
            return Err(Error::data_load(
                path,
                format!("plain-text input provides only a 'text' column, but the task needs '{col}'"),
            ));
        }
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::data_load(path, e.to_string()))?;

    let rows: Vec<RawRow> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(RawRow::from_text)
        .collect();

    Ok(RawDataset::new(rows))
}
