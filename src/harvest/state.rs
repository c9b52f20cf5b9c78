//! Checkpoint state model for one collection's harvest.
//!
//! [`HarvestState`] is the single source of truth for a collection's
//! progress. It is created on the first run, mutated after every successful
//! page, persisted after every mutation, and reloaded unmodified on resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fetch strategy for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// The collection's total fits inside the result window; paginate the
    /// whole collection with a single offset cursor.
    Linear,
    /// The collection exceeds the window; iterate planned segments in order,
    /// paginating within each.
    Segmented,
}

/// A sub-partition of a collection, scoped by a prefix match on the
/// segmentation field, with its exact record count at planning time.
///
/// Segments are immutable once planned; the plan is persisted with the
/// checkpoint and reused across resumed runs so segment indices stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Prefix of the segmentation field that scopes this segment.
    pub prefix: String,
    /// Record count at planning time (capped to the safe limit for
    /// under-covered segments).
    pub total: u64,
}

/// Durable progress for one collection's harvest.
///
/// Exactly one cursor is meaningful at a time, selected by `mode`:
/// `next_offset` in linear mode, `(segment_index, segment_offset)` in
/// segmented mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestState {
    /// Collection name this state belongs to.
    pub resource: String,
    /// Current fetch strategy.
    pub mode: FetchMode,
    /// Linear cursor: offset of the next record to request.
    pub next_offset: u64,
    /// Last record count observed from the server; `None` until the first
    /// count query succeeds.
    pub total: Option<u64>,
    /// Planned segments, ordered lexicographically by prefix. Empty until
    /// planning has run (and permanently empty for linear collections).
    pub segments: Vec<Segment>,
    /// Index of the segment currently in progress.
    pub segment_index: usize,
    /// Offset of the next record to request within the current segment.
    pub segment_offset: u64,
    /// When this state was last persisted.
    pub updated_at: DateTime<Utc>,
}

impl HarvestState {
    /// Creates the initial state for a collection's first run.
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            mode: FetchMode::Linear,
            next_offset: 0,
            total: None,
            segments: Vec::new(),
            segment_index: 0,
            segment_offset: 0,
            updated_at: Utc::now(),
        }
    }

    /// The segment currently being fetched, if any remain.
    #[must_use]
    pub fn current_segment(&self) -> Option<&Segment> {
        self.segments.get(self.segment_index)
    }

    /// Installs a freshly computed segment plan and switches to segmented
    /// mode with cursors reset.
    pub fn install_plan(&mut self, segments: Vec<Segment>) {
        self.mode = FetchMode::Segmented;
        self.segments = segments;
        self.segment_index = 0;
        self.segment_offset = 0;
    }

    /// Advances the linear cursor by the actual length of a fetched page.
    pub fn advance_linear(&mut self, page_len: u64) {
        self.next_offset += page_len;
    }

    /// Advances the in-segment cursor by the actual length of a fetched page.
    pub fn advance_segment(&mut self, page_len: u64) {
        self.segment_offset += page_len;
    }

    /// Moves to the next segment with the in-segment cursor reset.
    pub fn next_segment(&mut self) {
        self.segment_index += 1;
        self.segment_offset = 0;
    }

    /// Stamps the state before persisting.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_linear_with_zero_cursors() {
        let state = HarvestState::new("journals");
        assert_eq!(state.resource, "journals");
        assert_eq!(state.mode, FetchMode::Linear);
        assert_eq!(state.next_offset, 0);
        assert_eq!(state.total, None);
        assert!(state.segments.is_empty());
        assert_eq!(state.segment_index, 0);
        assert_eq!(state.segment_offset, 0);
    }

    #[test]
    fn test_install_plan_switches_mode_and_resets_cursors() {
        let mut state = HarvestState::new("journals");
        state.segment_index = 3;
        state.segment_offset = 99;
        state.install_plan(vec![
            Segment {
                prefix: "a".to_string(),
                total: 10,
            },
            Segment {
                prefix: "b".to_string(),
                total: 20,
            },
        ]);
        assert_eq!(state.mode, FetchMode::Segmented);
        assert_eq!(state.segment_index, 0);
        assert_eq!(state.segment_offset, 0);
        assert_eq!(state.current_segment().unwrap().prefix, "a");
    }

    #[test]
    fn test_next_segment_resets_offset() {
        let mut state = HarvestState::new("journals");
        state.install_plan(vec![Segment {
            prefix: "a".to_string(),
            total: 10,
        }]);
        state.advance_segment(10);
        assert_eq!(state.segment_offset, 10);
        state.next_segment();
        assert_eq!(state.segment_index, 1);
        assert_eq!(state.segment_offset, 0);
        assert!(state.current_segment().is_none());
    }

    #[test]
    fn test_checkpoint_document_round_trips_all_fields() {
        let mut state = HarvestState::new("journals");
        state.total = Some(25_000);
        state.install_plan(vec![Segment {
            prefix: "ab".to_string(),
            total: 9_000,
        }]);
        state.advance_segment(4_500);

        let json = serde_json::to_string(&state).unwrap();
        let reloaded: HarvestState = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.resource, state.resource);
        assert_eq!(reloaded.mode, FetchMode::Segmented);
        assert_eq!(reloaded.total, Some(25_000));
        assert_eq!(reloaded.segments, state.segments);
        assert_eq!(reloaded.segment_offset, 4_500);
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        let json = serde_json::to_string(&FetchMode::Segmented).unwrap();
        assert_eq!(json, "\"segmented\"");
        let json = serde_json::to_string(&FetchMode::Linear).unwrap();
        assert_eq!(json, "\"linear\"");
    }
}
