//! CSV reading store
//!
//! Append-only CSV file holding every reading received by the subscriber.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::reading::SensorReading;

/// Column layout of the store
pub const CSV_FIELDS: [&str; 5] = ["timestamp", "temperature", "humidity", "pressure", "raw"];

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// All rows currently in the store
#[derive(Debug, Clone, Default)]
pub struct CsvSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl CsvSnapshot {
    /// Index of a named column
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// CSV file store, safe to share between tasks
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Create the data directory and header row if missing
    pub fn ensure(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_locked()
    }

    fn ensure_locked(&self) -> Result<(), StoreError> {
        if self.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = WriterBuilder::new().from_path(&self.path)?;
        writer.write_record(CSV_FIELDS)?;
        writer.flush()?;
        Ok(())
    }

    /// Append one reading; absent measurements become empty cells
    pub fn append(&self, reading: &SensorReading) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_locked()?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record([
            reading.timestamp.clone().unwrap_or_default(),
            cell(reading.temperature),
            cell(reading.humidity),
            cell(reading.pressure),
            reading.to_json(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    /// Read every row; a missing file reads as empty
    pub fn snapshot(&self) -> Result<CsvSnapshot, StoreError> {
        if !self.exists() {
            return Ok(CsvSnapshot::default());
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_path(&self.path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(CsvSnapshot { headers, rows })
    }

    /// Most recent rows keyed by column name
    pub fn history(&self, limit: usize) -> Result<Vec<BTreeMap<String, String>>, StoreError> {
        let snapshot = self.snapshot()?;
        let skip = snapshot.rows.len().saturating_sub(limit);
        Ok(snapshot
            .rows
            .iter()
            .skip(skip)
            .map(|row| {
                snapshot
                    .headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| (header.clone(), row.get(i).unwrap_or_default().to_string()))
                    .collect()
            })
            .collect())
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
