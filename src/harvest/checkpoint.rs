//! Durable checkpoint storage, one JSON document per collection.
//!
//! Saves are atomic with respect to process crash: the full state is written
//! to a sibling temp file and renamed over the target, so a crash loses at
//! most the in-flight page and never corrupts previously recorded progress.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

use super::state::HarvestState;

/// Errors from checkpoint persistence.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// File system error reading or writing a checkpoint.
    #[error("IO error on checkpoint {path}: {source}")]
    Io {
        /// The checkpoint path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file exists but does not parse as a harvest state.
    #[error("corrupt checkpoint {path}: {source}")]
    Corrupt {
        /// The checkpoint path involved.
        path: PathBuf,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl CheckpointError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Checkpoint store rooted at one output directory.
///
/// The same directory holds each collection's checkpoint
/// (`<name>.checkpoint.json`) and its output file (`<name>.ndjson`).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::io(&dir, source))?;
        Ok(Self { dir })
    }

    /// Path of the checkpoint document for a collection.
    #[must_use]
    pub fn checkpoint_path(&self, resource: &str) -> PathBuf {
        self.dir
            .join(format!("{}.checkpoint.json", safe_stem(resource)))
    }

    /// Path of the output file for a collection.
    #[must_use]
    pub fn output_path(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{}.ndjson", safe_stem(resource)))
    }

    /// Loads the last saved state for a collection, or `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] on read failure other than
    /// not-found, and [`CheckpointError::Corrupt`] if the file exists but
    /// does not parse.
    #[instrument(skip(self))]
    pub fn load(&self, resource: &str) -> Result<Option<HarvestState>, CheckpointError> {
        let path = self.checkpoint_path(resource);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no checkpoint, starting fresh");
                return Ok(None);
            }
            Err(source) => return Err(CheckpointError::io(path, source)),
        };

        let state = serde_json::from_str(&raw)
            .map_err(|source| CheckpointError::Corrupt { path, source })?;
        Ok(Some(state))
    }

    /// Atomically persists the full state.
    ///
    /// The temp file lives in the destination directory so the final rename
    /// never crosses a file system boundary.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] on write or rename failure.
    #[instrument(skip(self, state), fields(resource = %state.resource))]
    pub fn save(&self, state: &HarvestState) -> Result<(), CheckpointError> {
        let path = self.checkpoint_path(&state.resource);
        // Infallible for this type: HarvestState has no non-string map keys.
        #[allow(clippy::expect_used)]
        let body = serde_json::to_vec_pretty(state).expect("harvest state serializes");

        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|source| CheckpointError::io(&path, source))?;
        tmp.write_all(&body)
            .and_then(|()| tmp.flush())
            .map_err(|source| CheckpointError::io(&path, source))?;
        tmp.persist(&path)
            .map_err(|error| CheckpointError::io(&path, error.error))?;

        debug!(path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// Deletes the checkpoint and any previously written output for a
    /// collection, so the next run starts fresh.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] on deletion failure other than
    /// not-found.
    #[instrument(skip(self))]
    pub fn reset(&self, resource: &str) -> Result<(), CheckpointError> {
        remove_if_exists(&self.checkpoint_path(resource))?;
        remove_if_exists(&self.output_path(resource))?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<(), CheckpointError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CheckpointError::io(path, source)),
    }
}

/// Maps a collection name onto a safe file stem.
///
/// Collection names come from the command line and may contain separators or
/// other characters that are unsafe in file names.
fn safe_stem(resource: &str) -> String {
    resource
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
