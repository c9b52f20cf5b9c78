//! Error types for the harvest orchestrator.

use thiserror::Error;

use crate::client::ClientError;

use super::checkpoint::CheckpointError;
use super::sink::SinkError;

/// Errors that stop one collection's harvest.
///
/// A harvest error never aborts the whole process when multiple collections
/// are requested; the remaining collections still run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The search API gave up: retries exhausted or a fatal response.
    #[error("harvest of '{resource}' stopped: {source}")]
    Client {
        /// The collection whose harvest stopped.
        resource: String,
        /// The underlying client error.
        #[source]
        source: ClientError,
    },

    /// Checkpoint persistence failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Output persistence failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl HarvestError {
    /// Creates a client error carrying the collection name.
    pub fn client(resource: impl Into<String>, source: ClientError) -> Self {
        Self::Client {
            resource: resource.into(),
            source,
        }
    }

    /// Whether the harvest can be resumed from its last checkpoint by simply
    /// rerunning: true for exhausted transient retries and IO hiccups, false
    /// for fatal API responses and corrupt checkpoints.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        match self {
            Self::Client { source, .. } => source.is_resumable(),
            Self::Checkpoint(CheckpointError::Io { .. }) | Self::Sink(_) => true,
            Self::Checkpoint(CheckpointError::Corrupt { .. }) => false,
        }
    }
}
