// Headed, comma-separated tables read through serde
use std::fs::File;
use std::path::Path;

use csv::{Reader, ReaderBuilder, Trim};
use serde::de::DeserializeOwned;

use crate::error::{ModelError, Result};

// `#` starts a comment line; cells and headers are trimmed
pub(crate) fn open(path: &Path) -> Result<Reader<File>> {
    ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| ModelError::csv(path, e))
}

/// Deserializes every row by column name, paired with its 1-based line number.
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<(usize, T)>> {
    let mut reader = open(path)?;
    let headers = reader.headers().map_err(|e| ModelError::csv(path, e))?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ModelError::csv(path, e))?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        let row = record
            .deserialize(Some(&headers))
            .map_err(|e| ModelError::csv(path, e))?;
        rows.push((line, row));
    }
    Ok(rows)
}
