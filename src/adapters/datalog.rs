//! CSV data log adapter.
//!
//! One row per reading, appended and flushed immediately so a power cut
//! loses at most the row being written.  The header is written only when
//! the file is new or empty; reopening an existing log keeps appending
//! below the rows already there.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::app::ports::{Persistence, StorageError};
use crate::reading::SensorReading;

/// Column order of every data log.
pub const HEADER: [&str; 9] = [
    "timestamp",
    "co2",
    "o2",
    "temperature_1",
    "temperature_2",
    "temperature_3",
    "temperature_4",
    "temperature_5",
    "humidity",
];

#[derive(Serialize)]
struct Row {
    timestamp: u64,
    co2: f32,
    o2: f32,
    temperature_1: f32,
    temperature_2: f32,
    temperature_3: f32,
    temperature_4: f32,
    temperature_5: f32,
    humidity: f32,
}

impl From<&SensorReading> for Row {
    fn from(r: &SensorReading) -> Self {
        let [t1, t2, t3, t4, t5] = r.temperatures;
        Self {
            timestamp: r.timestamp,
            co2: r.co2,
            o2: r.oxygen,
            temperature_1: t1,
            temperature_2: t2,
            temperature_3: t3,
            temperature_4: t4,
            temperature_5: t5,
            humidity: r.humidity,
        }
    }
}

pub struct CsvDataLog<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvDataLog<File> {
    /// Open `path` for appending, creating it (with a header) if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|_| StorageError::IoError)?;
        let is_empty = file.metadata().map_err(|_| StorageError::IoError)?.len() == 0;
        info!(
            "Data log at {} ({})",
            path.display(),
            if is_empty { "new" } else { "appending" }
        );
        Self::from_writer(file, is_empty)
    }
}

impl<W: Write> CsvDataLog<W> {
    pub fn from_writer(inner: W, write_header: bool) -> Result<Self, StorageError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        if write_header {
            writer
                .write_record(HEADER)
                .map_err(|_| StorageError::IoError)?;
            writer.flush().map_err(|_| StorageError::IoError)?;
        }
        Ok(Self { writer })
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl<W: Write + Send> Persistence for CsvDataLog<W> {
    fn append(&mut self, reading: &SensorReading) -> Result<(), StorageError> {
        self.writer
            .serialize(Row::from(reading))
            .map_err(|e| match e.kind() {
                csv::ErrorKind::Io(_) => StorageError::IoError,
                _ => StorageError::Encoding,
            })?;
        self.writer.flush().map_err(|_| StorageError::IoError)
    }
}
