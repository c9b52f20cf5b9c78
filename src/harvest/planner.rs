//! Segmentation planner: partitions an over-window collection into segments
//! that each paginate safely inside the result window.
//!
//! The planner runs a breadth-first expansion over prefixes of the
//! segmentation field, starting from the empty prefix. A prefix whose exact
//! count fits under the window becomes a finished segment; an over-full
//! prefix is expanded by appending each character of the configured alphabet
//! and counting the children through the shared [`ApiClient`]. Expansion is
//! an explicit work queue, not recursion: depth and branching factor are
//! caller-configurable and must stay boundable without stack growth.
//!
//! A prefix still over the limit at maximum depth is emitted anyway with its
//! count capped to the safe limit and a [`CapacityWarning`] recorded —
//! records sorted beyond the cap stay unreachable with the current
//! alphabet/depth. This incompleteness is deliberate and documented, not a
//! bug to fix here.

use std::collections::VecDeque;

use tracing::{debug, info, instrument, warn};

use crate::client::ApiClient;

use super::CapacityWarning;
use super::error::HarvestError;
use super::state::Segment;

/// Segmentation parameters for one run.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Searchable field the partition is built on.
    pub field: String,
    /// Characters appended when expanding a prefix.
    pub alphabet: Vec<char>,
    /// Maximum prefix length before a segment is capped.
    pub max_depth: usize,
    /// The endpoint's window limit (`from + size` bound).
    pub max_window: u64,
}

impl PlannerConfig {
    /// Largest record count a segment may hold and still paginate safely.
    ///
    /// One less than the window so the final page's `from + size` stays
    /// inside the server's bound.
    #[must_use]
    pub fn safe_limit(&self) -> u64 {
        self.max_window.saturating_sub(1)
    }
}

/// The planner's output: a finished segment list plus any capacity warnings.
#[derive(Debug)]
pub struct SegmentPlan {
    /// Segments ordered lexicographically by prefix.
    pub segments: Vec<Segment>,
    /// Under-coverage warnings for capped segments.
    pub warnings: Vec<CapacityWarning>,
}

/// Builds the search expression selecting records whose segmentation field
/// starts with `prefix`.
///
/// The empty prefix selects everything.
#[must_use]
pub(crate) fn prefix_query(field: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        "*".to_string()
    } else {
        format!("{field}:{prefix}*")
    }
}

/// One queued prefix awaiting a fit-or-expand decision.
#[derive(Debug)]
struct PendingPrefix {
    prefix: String,
    count: u64,
    depth: usize,
}

/// Computes the segment plan for a collection whose root count exceeds the
/// window limit.
///
/// `root_count` is the already-observed total for the whole collection so
/// the root is not re-counted. The union of the returned segments covers the
/// collection; ordering is deterministic (lexicographic by prefix) so
/// segment indices stay stable across resumed runs.
///
/// # Errors
///
/// Returns [`HarvestError::Client`] if a count query fails after retries.
#[instrument(skip(client, config, filter))]
pub async fn plan_segments(
    client: &ApiClient,
    resource: &str,
    filter: &str,
    config: &PlannerConfig,
    root_count: u64,
) -> Result<SegmentPlan, HarvestError> {
    let safe_limit = config.safe_limit();
    let mut segments = Vec::new();
    let mut warnings = Vec::new();

    let mut queue = VecDeque::new();
    queue.push_back(PendingPrefix {
        prefix: String::new(),
        count: root_count,
        depth: 0,
    });

    while let Some(pending) = queue.pop_front() {
        if pending.count <= safe_limit {
            if pending.count > 0 {
                debug!(prefix = %pending.prefix, count = pending.count, "segment fits");
                segments.push(Segment {
                    prefix: pending.prefix,
                    total: pending.count,
                });
            }
            continue;
        }

        if pending.depth >= config.max_depth {
            warn!(
                prefix = %pending.prefix,
                count = pending.count,
                capped = safe_limit,
                "prefix still over the window at max depth, capping"
            );
            warnings.push(CapacityWarning {
                resource: resource.to_string(),
                prefix: pending.prefix.clone(),
                detail: format!(
                    "{} records under prefix '{}' but only {} reachable at depth {}",
                    pending.count, pending.prefix, safe_limit, config.max_depth
                ),
            });
            segments.push(Segment {
                prefix: pending.prefix,
                total: safe_limit,
            });
            continue;
        }

        for ch in &config.alphabet {
            let child = format!("{}{}", pending.prefix, ch);
            let query = prefix_query(&config.field, &child);
            let count = client
                .count(&query, filter)
                .await
                .map_err(|source| HarvestError::client(resource, source))?;
            if count == 0 {
                continue;
            }
            queue.push_back(PendingPrefix {
                prefix: child,
                count,
                depth: pending.depth + 1,
            });
        }
    }

    segments.sort_by(|a, b| a.prefix.cmp(&b.prefix));

    info!(
        resource,
        segments = segments.len(),
        capped = warnings.len(),
        "segment plan computed"
    );

    Ok(SegmentPlan { segments, warnings })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(max_window: u64, max_depth: usize) -> PlannerConfig {
        PlannerConfig {
            field: "name".to_string(),
            alphabet: vec!['a', 'b'],
            max_depth,
            max_window,
        }
    }

    async fn mount_count(server: &MockServer, query: &str, total: u64) {
        Mock::given(method("GET"))
            .and(query_param("query", query))
            .and(query_param("size", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"total": total, "hits": []})),
            )
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            &server.uri(),
            RetryPolicy::with_backoff(2, Duration::from_millis(5)),
        )
        .unwrap()
    }

    // ==================== prefix_query Tests ====================

    #[test]
    fn test_prefix_query_empty_prefix_matches_all() {
        assert_eq!(prefix_query("name", ""), "*");
    }

    #[test]
    fn test_prefix_query_appends_wildcard() {
        assert_eq!(prefix_query("name", "ab"), "name:ab*");
    }

    #[test]
    fn test_safe_limit_is_window_minus_one() {
        assert_eq!(config(10_000, 3).safe_limit(), 9_999);
    }

    // ==================== Planning Tests (wiremock) ====================

    #[tokio::test]
    async fn test_plan_expands_until_segments_fit() {
        let server = MockServer::start().await;
        // Root 50 over safe limit 19; both children over too; grandchildren fit.
        mount_count(&server, "name:a*", 30).await;
        mount_count(&server, "name:b*", 20).await;
        mount_count(&server, "name:aa*", 15).await;
        mount_count(&server, "name:ab*", 15).await;
        mount_count(&server, "name:ba*", 12).await;
        mount_count(&server, "name:bb*", 8).await;

        let plan = plan_segments(&client(&server), "demo", "c:demo", &config(20, 3), 50)
            .await
            .unwrap();

        let prefixes: Vec<&str> = plan.segments.iter().map(|s| s.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["aa", "ab", "ba", "bb"]);
        let sum: u64 = plan.segments.iter().map(|s| s.total).sum();
        assert_eq!(sum, 50, "segments must cover the whole collection");
        assert!(plan.warnings.is_empty());
        assert!(
            plan.segments
                .iter()
                .all(|s| s.total <= config(20, 3).safe_limit())
        );
    }

    #[tokio::test]
    async fn test_plan_discards_zero_count_children() {
        let server = MockServer::start().await;
        mount_count(&server, "name:a*", 25).await;
        mount_count(&server, "name:b*", 0).await;
        mount_count(&server, "name:aa*", 25).await;
        mount_count(&server, "name:ab*", 0).await;
        mount_count(&server, "name:aaa*", 13).await;
        mount_count(&server, "name:aab*", 12).await;

        let plan = plan_segments(&client(&server), "demo", "c:demo", &config(20, 3), 25)
            .await
            .unwrap();

        let prefixes: Vec<&str> = plan.segments.iter().map(|s| s.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["aaa", "aab"]);
    }

    #[tokio::test]
    async fn test_plan_caps_prefix_at_max_depth_and_warns() {
        let server = MockServer::start().await;
        // Depth 1: children can be counted but not expanded further.
        mount_count(&server, "name:a*", 40).await;
        mount_count(&server, "name:b*", 10).await;

        let plan = plan_segments(&client(&server), "demo", "c:demo", &config(20, 1), 50)
            .await
            .unwrap();

        let capped = plan.segments.iter().find(|s| s.prefix == "a").unwrap();
        assert_eq!(capped.total, 19, "capped segment total must be safe limit");
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.warnings[0].prefix, "a");
        assert!(plan.warnings[0].detail.contains("40"));
        // The fitting sibling is untouched.
        let fitting = plan.segments.iter().find(|s| s.prefix == "b").unwrap();
        assert_eq!(fitting.total, 10);
    }

    #[tokio::test]
    async fn test_plan_output_is_sorted_lexicographically() {
        let server = MockServer::start().await;
        // 'b' fits immediately; 'a' needs another level, so it is emitted
        // later during the scan but must sort first.
        mount_count(&server, "name:a*", 30).await;
        mount_count(&server, "name:b*", 5).await;
        mount_count(&server, "name:aa*", 15).await;
        mount_count(&server, "name:ab*", 15).await;

        let plan = plan_segments(&client(&server), "demo", "c:demo", &config(20, 2), 35)
            .await
            .unwrap();

        let prefixes: Vec<&str> = plan.segments.iter().map(|s| s.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["aa", "ab", "b"]);
    }
}
