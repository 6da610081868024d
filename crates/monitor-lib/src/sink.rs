//! Append-only record sinks
//!
//! The processing loop writes every snapshot, followed immediately by any
//! anomaly raised for it. Physical layout is up to the implementation:
//! [`JsonLinesSink`] writes one JSON object per line into day-partitioned
//! files, [`MemorySink`] keeps records in memory.

use crate::error::SinkError;
use crate::models::SinkRecord;
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Destination for processed records
pub trait Sink: Send + Sync {
    fn write(&self, record: &SinkRecord) -> Result<(), SinkError>;
}

/// Appends JSON lines to `<dir>/metrics_<YYYY-MM-DD>.jsonl`
pub struct JsonLinesSink {
    dir: PathBuf,
    current: Mutex<Option<OpenPartition>>,
}

struct OpenPartition {
    date: NaiveDate,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Create a sink rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            current: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the records for `date`
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("metrics_{}.jsonl", date.format("%Y-%m-%d")))
    }

    fn open(&self, date: NaiveDate) -> Result<OpenPartition, SinkError> {
        let path = self.partition_path(date);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened sink partition");
        Ok(OpenPartition {
            date,
            writer: BufWriter::new(file),
        })
    }
}

impl Sink for JsonLinesSink {
    fn write(&self, record: &SinkRecord) -> Result<(), SinkError> {
        let line = serde_json::to_vec(record)?;
        let date = record.timestamp().date_naive();

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let needs_open = current.as_ref().map(|p| p.date != date).unwrap_or(true);
        if needs_open {
            if let Some(mut previous) = current.take() {
                previous.writer.flush()?;
            }
            *current = Some(self.open(date)?);
        }

        if let Some(partition) = current.as_mut() {
            partition.writer.write_all(&line)?;
            partition.writer.write_all(b"\n")?;
            partition.writer.flush()?;
        }
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for MemorySink {
    fn write(&self, record: &SinkRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
