//! Fetch orchestrator: drives a collection's harvest to completion.
//!
//! The orchestrator is a state machine over `{uninitialized, linear-fetching,
//! planning, segmented-fetching, done}`. A collection whose total fits inside
//! the result window is paginated linearly; one that exceeds it is
//! partitioned by the [`planner`] and fetched segment by segment. After every
//! successful page the output sink is flushed and the checkpoint saved, so
//! killing the process at any point loses at most the in-flight page.
//!
//! Harvesting is fully sequential per collection: one page in flight, cursor
//! bookkeeping trivially correct. Collections run one after another sharing
//! the client and retry policy.

pub mod checkpoint;
pub mod error;
pub mod planner;
pub mod sink;
pub mod state;

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::client::ApiClient;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use error::HarvestError;
pub use planner::{PlannerConfig, SegmentPlan, plan_segments};
pub use sink::{RecordSink, SinkError};
pub use state::{FetchMode, HarvestState, Segment};

/// A named remote dataset to harvest.
///
/// `filter` is the opaque server-side scoping expression passed through as
/// `extra_filter`; building it is the caller's concern.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Collection name; also the checkpoint/output file stem.
    pub name: String,
    /// Server-side filter expression scoping the collection.
    pub filter: String,
}

impl Collection {
    /// Creates a collection from a name and filter expression.
    pub fn new(name: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: filter.into(),
        }
    }
}

/// A segment that could not be covered completely.
///
/// Not an error: the harvest continues, and the warning is surfaced on the
/// run report.
#[derive(Debug, Clone)]
pub struct CapacityWarning {
    /// The collection involved.
    pub resource: String,
    /// The segment prefix involved (empty for the root).
    pub prefix: String,
    /// Human-readable description of what is unreachable and why.
    pub detail: String,
}

impl fmt::Display for CapacityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} prefix '{}': {}",
            self.resource, self.prefix, self.detail
        )
    }
}

/// Final status of one collection's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    /// Every reachable record was fetched.
    Completed,
    /// Stopped early but resumable from the saved checkpoint (e.g. retries
    /// exhausted); rerunning continues where it left off.
    Partial,
    /// Stopped on a non-recoverable error; rerunning is unlikely to help
    /// without intervention.
    Failed,
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial (resumable)"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of one collection's run.
#[derive(Debug)]
pub struct HarvestReport {
    /// The collection this report describes.
    pub resource: String,
    /// Final status.
    pub status: HarvestStatus,
    /// Pages fetched during this run (not counting zero-size count queries).
    pub pages_fetched: u64,
    /// Records written during this run.
    pub records_written: u64,
    /// Last record count observed from the server.
    pub total: Option<u64>,
    /// Capacity warnings accumulated during planning and fetching.
    pub warnings: Vec<CapacityWarning>,
    /// Error message when status is not `Completed`.
    pub error: Option<String>,
}

impl HarvestReport {
    fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            status: HarvestStatus::Completed,
            pages_fetched: 0,
            records_written: 0,
            total: None,
            warnings: Vec::new(),
            error: None,
        }
    }
}

/// Harvest configuration shared by every collection of a run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Records requested per page.
    pub page_size: u64,
    /// The endpoint's result window limit (`from + size` bound).
    pub max_window: u64,
    /// Searchable field segmentation partitions on.
    pub segment_field: String,
    /// Alphabet used to expand segmentation prefixes.
    pub segment_alphabet: String,
    /// Maximum segmentation prefix depth.
    pub max_depth: usize,
    /// Optional politeness delay between pages.
    pub page_delay: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_window: 10_000,
            segment_field: "name".to_string(),
            segment_alphabet: "abcdefghijklmnopqrstuvwxyz0123456789".to_string(),
            max_depth: 3,
            page_delay: Duration::ZERO,
        }
    }
}

impl HarvestConfig {
    fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            field: self.segment_field.clone(),
            alphabet: self.segment_alphabet.chars().collect(),
            max_depth: self.max_depth,
            max_window: self.max_window,
        }
    }
}

/// Outcome of the linear fetch loop.
enum LinearOutcome {
    /// The collection is fully fetched.
    Completed,
    /// The observed total exceeds the window; segmentation is required.
    NeedsPlan,
}

/// Drives harvests against one endpoint.
///
/// Owns the shared [`ApiClient`] (injected into the planner as well) and the
/// [`CheckpointStore`]; both are reused across collections.
#[derive(Debug)]
pub struct Harvester {
    client: ApiClient,
    store: CheckpointStore,
    config: HarvestConfig,
}

impl Harvester {
    /// Creates a harvester from its collaborators.
    #[must_use]
    pub fn new(client: ApiClient, store: CheckpointStore, config: HarvestConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Returns the checkpoint store (for inspecting paths).
    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Harvests one collection to completion or to its first unrecoverable
    /// error, returning a report either way.
    ///
    /// With `restart` set, any existing checkpoint and output are discarded
    /// first; otherwise a persisted checkpoint is resumed exactly.
    #[instrument(skip(self, collection), fields(collection = %collection.name))]
    pub async fn run(&self, collection: &Collection, restart: bool) -> HarvestReport {
        let mut report = HarvestReport::new(&collection.name);
        match self.run_inner(collection, restart, &mut report).await {
            Ok(()) => {
                report.status = HarvestStatus::Completed;
                info!(
                    collection = %collection.name,
                    pages = report.pages_fetched,
                    records = report.records_written,
                    "harvest completed"
                );
            }
            Err(error) => {
                report.status = if error.is_resumable() {
                    HarvestStatus::Partial
                } else {
                    HarvestStatus::Failed
                };
                warn!(
                    collection = %collection.name,
                    status = %report.status,
                    error = %error,
                    "harvest stopped"
                );
                report.error = Some(error.to_string());
            }
        }
        report
    }

    async fn run_inner(
        &self,
        collection: &Collection,
        restart: bool,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        if restart {
            info!(collection = %collection.name, "restart requested, discarding previous state");
            self.store.reset(&collection.name)?;
        }

        let mut state = match self.store.load(&collection.name)? {
            Some(state) => {
                info!(
                    collection = %collection.name,
                    mode = ?state.mode,
                    next_offset = state.next_offset,
                    segment_index = state.segment_index,
                    "resuming from checkpoint"
                );
                state
            }
            None => HarvestState::new(&collection.name),
        };

        let mut sink = RecordSink::append(self.store.output_path(&collection.name))?;

        // Refresh the total up front: a collection can grow between runs and
        // outgrow the window, which forces a linear collection into planning.
        let total = self
            .client
            .count("*", &collection.filter)
            .await
            .map_err(|source| HarvestError::client(&collection.name, source))?;
        state.total = Some(total);
        report.total = Some(total);
        debug!(collection = %collection.name, total, "total count observed");

        if state.mode == FetchMode::Linear {
            match self
                .fetch_linear(collection, &mut state, &mut sink, report)
                .await?
            {
                LinearOutcome::Completed => {}
                LinearOutcome::NeedsPlan => {
                    let plan = plan_segments(
                        &self.client,
                        &collection.name,
                        &collection.filter,
                        &self.config.planner_config(),
                        state.total.unwrap_or(total),
                    )
                    .await?;
                    report.warnings.extend(plan.warnings);
                    state.install_plan(plan.segments);
                    state.touch();
                    self.store.save(&state)?;
                }
            }
        }

        if state.mode == FetchMode::Segmented {
            self.fetch_segmented(collection, &mut state, &mut sink, report)
                .await?;
        }

        Ok(())
    }

    /// Paginates the whole collection with a single offset cursor.
    async fn fetch_linear(
        &self,
        collection: &Collection,
        state: &mut HarvestState,
        sink: &mut RecordSink,
        report: &mut HarvestReport,
    ) -> Result<LinearOutcome, HarvestError> {
        loop {
            let total = state.total.unwrap_or(0);
            if total > self.config.max_window {
                debug!(
                    collection = %collection.name,
                    total,
                    max_window = self.config.max_window,
                    "total exceeds the window, switching to segmentation"
                );
                return Ok(LinearOutcome::NeedsPlan);
            }
            // Also covers a collection that shrank below the saved cursor.
            if state.next_offset >= total {
                return Ok(LinearOutcome::Completed);
            }

            let size = self
                .config
                .page_size
                .min(self.config.max_window - state.next_offset);
            let page = self
                .client
                .search("*", &collection.filter, state.next_offset, size)
                .await
                .map_err(|source| HarvestError::client(&collection.name, source))?;

            state.total = Some(page.total);
            report.total = Some(page.total);

            if page.hits.is_empty() {
                // The server has no more matching records; completion, not an
                // error, even though the reported total was not reached.
                info!(
                    collection = %collection.name,
                    next_offset = state.next_offset,
                    total = page.total,
                    "empty page before total, treating as complete"
                );
                return Ok(LinearOutcome::Completed);
            }

            for record in &page.hits {
                sink.write_record(record)?;
            }
            sink.flush()?;

            state.advance_linear(page.hits.len() as u64);
            state.touch();
            self.store.save(state)?;
            report.pages_fetched += 1;
            report.records_written += page.hits.len() as u64;

            self.pause_between_pages().await;
        }
    }

    /// Iterates planned segments in order, paginating within each.
    async fn fetch_segmented(
        &self,
        collection: &Collection,
        state: &mut HarvestState,
        sink: &mut RecordSink,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        let safe_limit = self.config.planner_config().safe_limit();

        while let Some(segment) = state.current_segment().cloned() {
            // Plans persisted by an older run may carry totals above the
            // current safe limit.
            let target = segment.total.min(safe_limit);
            if state.segment_offset >= target {
                debug!(
                    collection = %collection.name,
                    prefix = %segment.prefix,
                    fetched = state.segment_offset,
                    "segment complete"
                );
                state.next_segment();
                state.touch();
                self.store.save(state)?;
                continue;
            }

            let remaining = target - state.segment_offset;
            let window_room = self.config.max_window - state.segment_offset;
            let size = self.config.page_size.min(remaining).min(window_room);
            let query = planner::prefix_query(&self.config.segment_field, &segment.prefix);

            let page = match self
                .client
                .search(&query, &collection.filter, state.segment_offset, size)
                .await
            {
                Ok(page) => page,
                Err(error) if error.is_window_exceeded() => {
                    // Recoverable degradation: give up on the rest of this
                    // segment, keep the rest of the collection going.
                    warn!(
                        collection = %collection.name,
                        prefix = %segment.prefix,
                        offset = state.segment_offset,
                        error = %error,
                        "window exceeded mid-segment, stopping segment early"
                    );
                    report.warnings.push(CapacityWarning {
                        resource: collection.name.clone(),
                        prefix: segment.prefix.clone(),
                        detail: format!(
                            "window exceeded at offset {}; remaining records in this segment were skipped",
                            state.segment_offset
                        ),
                    });
                    state.next_segment();
                    state.touch();
                    self.store.save(state)?;
                    continue;
                }
                Err(source) => return Err(HarvestError::client(&collection.name, source)),
            };

            if page.hits.is_empty() {
                // Fewer records than planned (collection shrank since
                // planning); the segment is done.
                debug!(
                    collection = %collection.name,
                    prefix = %segment.prefix,
                    offset = state.segment_offset,
                    "segment exhausted early"
                );
                state.next_segment();
                state.touch();
                self.store.save(state)?;
                continue;
            }

            for record in &page.hits {
                sink.write_record(record)?;
            }
            sink.flush()?;

            state.advance_segment(page.hits.len() as u64);
            state.touch();
            self.store.save(state)?;
            report.pages_fetched += 1;
            report.records_written += page.hits.len() as u64;

            self.pause_between_pages().await;
        }

        Ok(())
    }

    async fn pause_between_pages(&self) {
        if !self.config.page_delay.is_zero() {
            tokio::time::sleep(self.config.page_delay).await;
        }
    }
}
