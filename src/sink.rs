//! Append-only scalar sinks
//!
//! A sink receives `(name, value, step)` records. [`JsonlSink`] writes one JSON
//! object per line, which dashboards can tail; [`MemorySink`] keeps records in
//! memory and is cheap to clone.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One recorded scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub name: String,
    pub value: f64,
    pub step: usize,
    /// Unix time in milliseconds
    pub wall_time: i64,
}

impl Scalar {
    pub fn now(name: &str, value: f64, step: usize) -> Self {
        Self {
            name: name.to_string(),
            value,
            step,
            wall_time: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Destination for scalar records
pub trait MetricsSink: Send {
    fn record(&mut self, name: &str, value: f64, step: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory sink; clones share the same record list
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Scalar>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<Scalar> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Values recorded under `name`, in order
    pub fn series(&self, name: &str) -> Vec<(usize, f64)> {
        self.records()
            .into_iter()
            .filter(|s| s.name == name)
            .map(|s| (s.step, s.value))
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| Error::Computation("metrics sink lock poisoned".to_string()))?
            .push(Scalar::now(name, value, step));
        Ok(())
    }
}

/// Appends records as JSON lines to a file
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a file written by this sink
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<Scalar>> {
        fs::read_to_string(path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l)
                    .map_err(|e| Error::Serialization(format!("bad scalar record: {e}")))
            })
            .collect()
    }
}

impl MetricsSink for JsonlSink {
    fn record(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        let line = serde_json::to_string(&Scalar::now(name, value, step))
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
        writeln!(self.writer, "{line}")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_shares_records_between_clones() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.record("train/loss", 0.5, 0).unwrap();
        writer.record("valid/loss", 0.7, 0).unwrap();
        writer.record("train/loss", 0.4, 1).unwrap();

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.series("train/loss"), vec![(0, 0.5), (1, 0.4)]);
    }

    #[test]
    fn test_jsonl_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("scalars.jsonl");
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.record("train/batch_loss", 1.25, 7).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.record("train/batch_loss", 1.0, 8).unwrap();
        }

        let records = JsonlSink::read(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step, 7);
        assert_eq!(records[1].value, 1.0);
        assert!(records[0].wall_time > 0);
    }
}
