//! Retrying HTTP client for the windowed search API.
//!
//! This module provides the [`ApiClient`] struct which issues bounded-timeout
//! GET requests against a search endpoint, decodes the JSON page envelope,
//! and recovers transient failures internally via retry with exponential
//! backoff. Only exhausted retries or fatal responses surface to callers.
//!
//! # Overview
//!
//! The endpoint contract is a GET accepting `query` (search expression),
//! `extra_filter` (collection scoping expression), `size` (page size) and
//! `from` (offset), returning `{ "total": <u64>, "hits": [<record>, ...] }`.
//! The server enforces `from + size <= window limit` and rejects requests
//! beyond it.
//!
//! A 200 response whose body fails to decode is retried as transient, never
//! returned as a short page: a truncated page mistaken for the final one
//! would end a harvest early with records silently missing.

pub mod error;
pub mod retry;

use std::time::Duration;

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::user_agent;

pub use error::ClientError;
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRYABLE_STATUSES, FailureKind, RetryDecision, RetryPolicy,
    parse_retry_after,
};

/// Connect timeout for search requests (seconds).
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read timeout for search requests (seconds).
const READ_TIMEOUT_SECS: u64 = 60;

/// One page of search results.
///
/// `hits` entries are opaque records; the harvester persists them verbatim
/// and never inspects their fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    /// Total number of records matching the query, as reported by the server.
    pub total: u64,
    /// The records on this page.
    pub hits: Vec<serde_json::Value>,
}

/// Retrying HTTP client bound to one search endpoint.
///
/// Designed to be created once and shared by the segmentation planner and
/// the fetch orchestrator for the whole run; retry/timeout configuration is
/// immutable after construction.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoint: Url,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Creates a client for the given endpoint with the given retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if `endpoint` is not a valid URL.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[allow(clippy::expect_used)]
    #[instrument(skip(policy))]
    pub fn new(endpoint: &str, policy: RetryPolicy) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|_| ClientError::invalid_url(endpoint))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");

        Ok(Self {
            http,
            endpoint,
            policy,
        })
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches one page of results, retrying transient failures internally.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RetriesExhausted`] once transient retries run
    /// out, or the fatal error itself for non-retryable responses. Either way
    /// the caller's last persisted checkpoint remains valid.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn search(
        &self,
        query: &str,
        extra_filter: &str,
        from: u64,
        size: u64,
    ) -> Result<SearchPage, ClientError> {
        let mut attempt = 1u32;
        loop {
            match self.attempt_search(query, extra_filter, from, size).await {
                Ok(page) => return Ok(page),
                Err(error) => {
                    let kind = self.policy.classify(&error);
                    match self.policy.should_retry(kind, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            // Server-provided Retry-After wins over computed backoff.
                            let wait = retry_after_hint(&error).unwrap_or(delay);
                            warn!(
                                attempt,
                                next_attempt,
                                wait_ms = wait.as_millis(),
                                error = %error,
                                "transient failure, backing off"
                            );
                            tokio::time::sleep(wait).await;
                            attempt = next_attempt;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(attempt, %reason, "giving up on request");
                            return if kind == FailureKind::Fatal {
                                Err(error)
                            } else {
                                Err(ClientError::retries_exhausted(
                                    self.endpoint.as_str(),
                                    attempt,
                                    error,
                                ))
                            };
                        }
                    }
                }
            }
        }
    }

    /// Queries the exact record count for a search expression.
    ///
    /// Issues a zero-size page request; the server reports `total` without
    /// shipping records.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`search`](Self::search).
    #[instrument(skip(self))]
    pub async fn count(&self, query: &str, extra_filter: &str) -> Result<u64, ClientError> {
        let page = self.search(query, extra_filter, 0, 0).await?;
        Ok(page.total)
    }

    /// Issues a single request without retrying.
    async fn attempt_search(
        &self,
        query: &str,
        extra_filter: &str,
        from: u64,
        size: u64,
    ) -> Result<SearchPage, ClientError> {
        let url = self.endpoint.as_str();
        let from_value = from.to_string();
        let size_value = size.to_string();
        let params = [
            ("query", query),
            ("extra_filter", extra_filter),
            ("size", size_value.as_str()),
            ("from", from_value.as_str()),
        ];

        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&params)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    ClientError::timeout(url)
                } else {
                    ClientError::network(url, source)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(ClientError::http_status(url, status.as_u16(), retry_after));
        }

        // Read the full body before decoding so an interrupted transfer shows
        // up as a decode failure (transient) rather than a short page.
        let body = response.text().await.map_err(|source| {
            if source.is_timeout() {
                ClientError::timeout(url)
            } else {
                ClientError::network(url, source)
            }
        })?;

        serde_json::from_str(&body).map_err(|source| ClientError::truncated_body(url, source))
    }
}

/// Extracts a parsed Retry-After wait from an HTTP status error, if any.
fn retry_after_hint(error: &ClientError) -> Option<Duration> {
    match error {
        ClientError::HttpStatus {
            retry_after: Some(value),
            ..
        } => parse_retry_after(value),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::with_backoff(max_attempts, Duration::from_millis(10))
    }

    fn page_json(total: u64, hits: usize) -> serde_json::Value {
        serde_json::json!({
            "total": total,
            "hits": (0..hits).map(|i| serde_json::json!({"id": i})).collect::<Vec<_>>(),
        })
    }

    // ==================== Deserialization Tests ====================

    #[test]
    fn test_search_page_deserialize() {
        let page: SearchPage = serde_json::from_value(page_json(42, 2)).unwrap();
        assert_eq!(page.total, 42);
        assert_eq!(page.hits.len(), 2);
    }

    #[test]
    fn test_search_page_deserialize_empty_hits() {
        let page: SearchPage = serde_json::from_value(page_json(0, 0)).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.hits.is_empty());
    }

    #[test]
    fn test_search_page_ignores_unknown_fields() {
        let json = serde_json::json!({"total": 1, "hits": [{}], "took_ms": 7});
        let page: SearchPage = serde_json::from_value(json).unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_search_page_rejects_missing_total() {
        let json = serde_json::json!({"hits": []});
        assert!(serde_json::from_value::<SearchPage>(json).is_err());
    }

    // ==================== Constructor Tests ====================

    #[test]
    fn test_new_rejects_invalid_endpoint() {
        let result = ApiClient::new("not a url", RetryPolicy::default());
        assert!(matches!(result, Err(ClientError::InvalidUrl { .. })));
    }

    // ==================== Request Tests (wiremock) ====================

    #[tokio::test]
    async fn test_search_success_sends_window_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "*"))
            .and(query_param("extra_filter", "collection:demo"))
            .and(query_param("from", "30"))
            .and(query_param("size", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(100, 10)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(2)).unwrap();
        let page = client.search("*", "collection:demo", 30, 10).await.unwrap();
        assert_eq!(page.total, 100);
        assert_eq!(page.hits.len(), 10);
    }

    #[tokio::test]
    async fn test_count_uses_zero_size_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("size", "0"))
            .and(query_param("from", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(250, 0)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(2)).unwrap();
        assert_eq!(client.count("*", "collection:demo").await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_search_retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(5, 5)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(5)).unwrap();
        let page = client.search("*", "c", 0, 5).await.unwrap();
        assert_eq!(page.hits.len(), 5);
    }

    #[tokio::test]
    async fn test_search_retries_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"total": 100, "hits": [{"id""#),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(100, 3)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(3)).unwrap();
        let page = client.search("*", "c", 0, 3).await.unwrap();
        assert_eq!(
            page.hits.len(),
            3,
            "truncated body must be retried, not accepted as a short page"
        );
    }

    #[tokio::test]
    async fn test_search_fatal_status_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(5)).unwrap();
        let error = client.search("*", "c", 0, 5).await.unwrap_err();
        assert_eq!(error.status(), Some(400));
        assert!(!error.is_resumable());
    }

    #[tokio::test]
    async fn test_search_exhausted_retries_reported_as_resumable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(2)).unwrap();
        let error = client.search("*", "c", 0, 5).await.unwrap_err();
        assert!(matches!(error, ClientError::RetriesExhausted { attempts: 2, .. }));
        assert!(error.is_resumable());
        assert_eq!(error.status(), Some(503));
    }

    #[tokio::test]
    async fn test_search_honors_retry_after_seconds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(1, 1)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), fast_policy(3)).unwrap();
        let started = std::time::Instant::now();
        let page = client.search("*", "c", 0, 1).await.unwrap();
        assert_eq!(page.hits.len(), 1);
        assert!(
            started.elapsed() >= Duration::from_secs(1),
            "Retry-After wait must override the (10ms) computed backoff"
        );
    }
}
