// Daily discharge tables
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::daily_inputs::DayId;
use crate::error::{ModelError, Result};
use crate::table_io;

pub const TABLE_COLUMNS: [&str; 3] = ["Datum", "Q", "Tages_ID"];

// One simulated day of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Datum")]
    pub formatted_date: String, // DD.MM.YYYY
    #[serde(rename = "Q")]
    pub discharge_m3: f64,
    #[serde(rename = "Tages_ID")]
    pub day_id: DayId,
}

/// Receiver of result rows, one table per parameter combination and zone.
pub trait ResultSink {
    /// Creates (or truncates) a table. Called before the first append.
    fn create_table(&mut self, name: &str) -> Result<()>;
    fn append(&mut self, table: &str, row: &ResultRow) -> Result<()>;
}

// Tables as <dir>/<name>.csv, each row flushed as it arrives
#[derive(Debug)]
pub struct CsvTableSink {
    dir: PathBuf,
    writers: HashMap<String, Writer<File>>,
}

impl CsvTableSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvTableSink {
            dir: dir.into(),
            writers: HashMap::new(),
        }
    }

    pub fn path_of(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }
}

impl ResultSink for CsvTableSink {
    fn create_table(&mut self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        debug!("creating table {}", path.display());
        // header up front, so a table without rows still carries it
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| ModelError::csv(&path, e))?;
        writer
            .write_record(TABLE_COLUMNS)
            .map_err(|e| ModelError::csv(&path, e))?;
        writer.flush().map_err(|e| ModelError::io(&path, e))?;
        self.writers.insert(name.to_string(), writer);
        Ok(())
    }

    fn append(&mut self, table: &str, row: &ResultRow) -> Result<()> {
        let path = self.path_of(table);
        let writer = self
            .writers
            .get_mut(table)
            .ok_or_else(|| ModelError::Config(format!("table '{table}' was never created")))?;
        writer.serialize(row).map_err(|e| ModelError::csv(&path, e))?;
        writer.flush().map_err(|e| ModelError::io(&path, e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub tables: BTreeMap<String, Vec<ResultRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&[ResultRow]> {
        self.tables.get(name).map(Vec::as_slice)
    }
}

impl ResultSink for MemorySink {
    fn create_table(&mut self, name: &str) -> Result<()> {
        self.tables.insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn append(&mut self, table: &str, row: &ResultRow) -> Result<()> {
        match self.tables.get_mut(table) {
            Some(rows) => {
                rows.push(row.clone());
                Ok(())
            }
            None => Err(ModelError::Config(format!("table '{table}' was never created"))),
        }
    }
}

// Reads a table written by CsvTableSink back into rows
pub fn read_table(path: &Path) -> Result<Vec<ResultRow>> {
    let rows = table_io::read_rows::<ResultRow>(path)?;
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}
