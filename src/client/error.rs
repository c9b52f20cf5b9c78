//! Error types for the search API client.
//!
//! This module defines structured errors for every request the client makes,
//! providing context-rich messages for debugging and retry classification.

use thiserror::Error;

/// Errors that can occur while querying the search API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error querying {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout querying {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} querying {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429/503 responses).
        retry_after: Option<String>,
    },

    /// HTTP 200 response whose body could not be decoded as a search page.
    ///
    /// Truncated or otherwise undecodable bodies are classified as transient
    /// and retried. Accepting one as-is could be mistaken for a short final
    /// page and end a harvest early with records missing.
    #[error("truncated or undecodable response body from {url}: {source}")]
    TruncatedBody {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The provided endpoint URL is malformed or invalid.
    #[error("invalid endpoint URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// All retry attempts for a request were exhausted.
    ///
    /// Carries the final transient error. A harvest stopped by this error is
    /// resumable from its last persisted checkpoint.
    #[error("retries exhausted after {attempts} attempts querying {url}: {source}")]
    RetriesExhausted {
        /// The URL that kept failing.
        url: String,
        /// How many attempts were made.
        attempts: u32,
        /// The last transient error observed.
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error with an optional Retry-After header value.
    pub fn http_status(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a truncated-body error.
    pub fn truncated_body(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::TruncatedBody {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a retries-exhausted error wrapping the final transient failure.
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32, source: ClientError) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Returns the HTTP status code if this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether this error stopped a harvest that can be resumed from its
    /// checkpoint (exhausted transient retries) rather than failing outright.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Whether this error is the server rejecting a request that stepped past
    /// its result window (`from + size` over the limit).
    ///
    /// The endpoint reports this as a 400 Bad Request. The orchestrator clamps
    /// page sizes so it should not happen, but a plan persisted against an
    /// older window limit can still trip it mid-segment.
    #[must_use]
    pub fn is_window_exceeded(&self) -> bool {
        self.status() == Some(400)
    }
}

// Note on From trait implementations:
// No `From<reqwest::Error>` here because the variants require the request URL
// for context, which the source error does not reliably provide. The helper
// constructors are the supported construction path.
