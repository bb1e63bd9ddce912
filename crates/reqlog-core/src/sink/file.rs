//! JSON-lines file sink

use super::{LogBatch, LogSink};
use crate::error::SinkError;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends one JSON object per unit to a file.
///
/// Each line carries the unit plus its `logName`, resource and labels.
/// Writes are blocking; put an [`AsyncSink`](super::AsyncSink) in front of
/// this sink when logging from request handlers.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create or append to the file at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_write(&self, batch: &LogBatch) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        for unit in &batch.entries {
            let mut line = serde_json::to_value(unit)?;
            line["logName"] = json!(batch.log_name);
            line["resource"] = serde_json::to_value(&batch.resource)?;
            line["labels"] = json!(batch.labels);
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        Ok(())
    }
}

impl LogSink for JsonLinesSink {
    fn write(&self, batch: LogBatch) {
        if let Err(e) = self.try_write(&batch) {
            tracing::warn!(
                path = %self.path.display(),
                entries = batch.entries.len(),
                error = %e,
                "failed to write log batch"
            );
        }
    }

    fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to flush log file");
            }
        }
    }
}
