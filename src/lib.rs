//! Harvester Core Library
//!
//! This library downloads the complete contents of remote, paginated search
//! APIs whose result window is capped (`from + size` bounded). Collections
//! larger than the window are recursively partitioned on a searchable field
//! until every partition paginates safely, and progress is checkpointed
//! after every page so interrupted runs resume exactly where they left off.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`client`] - Retrying HTTP client for the search endpoint
//! - [`harvest`] - Orchestrator, segmentation planner, checkpoint store and
//!   output sink

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod harvest;

pub(crate) mod user_agent;

// Re-export commonly used types
pub use client::{
    ApiClient, ClientError, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRYABLE_STATUSES, FailureKind,
    RetryDecision, RetryPolicy, SearchPage, parse_retry_after,
};
pub use harvest::{
    CapacityWarning, CheckpointError, CheckpointStore, Collection, FetchMode, HarvestConfig,
    HarvestError, HarvestReport, HarvestState, HarvestStatus, Harvester, PlannerConfig,
    RecordSink, Segment, SegmentPlan, SinkError, plan_segments,
};
