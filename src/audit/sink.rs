//! Audit sinks

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AuditError, AuditRecord};

/// Append-only destination for decisions and counterfactuals.
///
/// Injected into the drivers; the decision core never writes to it.
pub trait AuditSink: Send {
    /// Append one record
    fn record(&mut self, record: AuditRecord) -> Result<(), AuditError>;

    /// Flush buffered records
    fn flush(&mut self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Vec<AuditRecord>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        self.records
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&mut self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.push(record);
        Ok(())
    }
}

/// One JSON object per line, appended to a file
pub struct JsonlAuditSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written through this handle
    pub fn written(&self) -> usize {
        self.written
    }

    /// Read every record of a JSONL audit file
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| AuditError::Malformed {
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&mut self, record: AuditRecord) -> Result<(), AuditError> {
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        // Each record reaches the file before the caller acts on it
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AuditError> {
        self.writer.flush()?;
        Ok(())
    }
}
