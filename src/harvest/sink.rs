//! Append-only record sink, one JSON record per line.
//!
//! Records are written in the order received and explicitly flushed before
//! every checkpoint save: output durability must precede checkpoint
//! durability, or a resumed run could skip records that were never written.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors from output persistence.
#[derive(Debug, Error)]
pub enum SinkError {
    /// File system error opening or writing the output file.
    #[error("IO error writing records to {path}: {source}")]
    Io {
        /// The output path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Append-only newline-delimited JSON writer for one collection.
#[derive(Debug)]
pub struct RecordSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl RecordSink {
    /// Opens the output file in append mode, creating it if needed, so a
    /// resumed run continues the same file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be opened.
    pub fn append(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| SinkError::io(&path, source))?;
        debug!(path = %path.display(), "output sink opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Writes one record verbatim as a single line.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] on write failure.
    pub fn write_record(&mut self, record: &serde_json::Value) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|source| SinkError::io(&self.path, std::io::Error::from(source)))?;
        self.writer
            .write_all(b"\n")
            .map_err(|source| SinkError::io(&self.path, source))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes buffered records to the operating system.
    ///
    /// Called before every checkpoint save.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] on flush failure.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .map_err(|source| SinkError::io(&self.path, source))
    }

    /// Number of records written through this sink instance.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// The output path this sink writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let mut sink = RecordSink::append(&path).unwrap();
        sink.write_record(&serde_json::json!({"id": 1})).unwrap();
        sink.write_record(&serde_json::json!({"id": 2})).unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(lines[0]).unwrap(),
            serde_json::json!({"id": 1})
        );
        assert_eq!(sink.written(), 2);
    }

    #[test]
    fn test_append_mode_preserves_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        {
            let mut sink = RecordSink::append(&path).unwrap();
            sink.write_record(&serde_json::json!({"id": 1})).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = RecordSink::append(&path).unwrap();
            sink.write_record(&serde_json::json!({"id": 2})).unwrap();
            sink.flush().unwrap();
            // Counter is per-instance, not per-file.
            assert_eq!(sink.written(), 1);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_records_are_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let record = serde_json::json!({
            "id": "doc-7",
            "nested": {"values": [1, 2, 3], "flag": null},
        });
        let mut sink = RecordSink::append(&path).unwrap();
        sink.write_record(&record).unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(reparsed, record);
    }
}
