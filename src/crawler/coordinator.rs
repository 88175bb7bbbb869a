//! Crawl coordinator - main crawl orchestration logic
//!
//! This module drives a crawl of one target:
//! - Materializing one work unit directory per day in range
//! - Repeated passes over the days that are still pending
//! - Listing each day's changes and harvesting every change detail
//! - Routing failures through the backoff policy
//!
//! Progress lives entirely on disk, so an interrupted crawl resumes by
//! running it again.

use crate::config::{Config, CrawlConfig, ResumeMode, Target};
use crate::crawler::{BackoffPolicy, FetchError, GerritClient};
use crate::storage::{WorkUnit, WorkUnitStore};
use crate::timeframe::{create_time_frames, TimeFrame};
use crate::{HarvestError, Result};
use chrono::{Duration, NaiveTime};
use std::collections::{BTreeMap, HashSet};
use tracing::Instrument;

/// Totals for one run of the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Passes started over pending days
    pub passes: u32,

    /// Days whose listing and details all succeeded
    pub units_completed: usize,

    /// Change files written
    pub changes_written: u64,

    /// Changes already on disk that were not fetched again
    pub changes_skipped: u64,

    /// Failed requests by kind (`http`, `transport`, `parse`)
    pub failures: BTreeMap<&'static str, u64>,
}

impl CrawlReport {
    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    crawl: CrawlConfig,
    client: GerritClient,
    store: WorkUnitStore,
    policy: BackoffPolicy,
    span: tracing::Span,
}

impl Coordinator {
    /// Creates a coordinator for one target
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `target` - The resolved review server to crawl
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - The HTTP client could not be built
    pub fn new(config: &Config, target: Target) -> Result<Self> {
        let store = WorkUnitStore::new(&config.crawl.output_dir, &target.name);
        let span = tracing::info_span!("harvest", server = %target.name);
        let client = GerritClient::new(target, &config.http)?;

        Ok(Self {
            crawl: config.crawl.clone(),
            client,
            store,
            policy: BackoffPolicy::from_config(&config.backoff),
            span,
        })
    }

    /// Replaces the backoff policy built from the configuration
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &WorkUnitStore {
        &self.store
    }

    pub fn target(&self) -> &Target {
        self.client.target()
    }

    /// Partitions the target's history into whole days
    pub fn frames(&self) -> Vec<TimeFrame> {
        let start = self.target().start_date.and_time(NaiveTime::MIN);
        let end = self.crawl.end_date.and_time(NaiveTime::MIN);
        create_time_frames(start, end, Duration::hours(24))
    }

    /// Creates every work unit directory in range
    pub fn setup(&self) -> Result<Vec<WorkUnit>> {
        let frames = self.frames();
        let units = self.store.create_units(&frames)?;
        tracing::info!(
            "Prepared {} days under {}",
            units.len(),
            self.store.changes_dir().display()
        );
        Ok(units)
    }

    /// Runs passes until no day is pending
    ///
    /// Each pass re-derives the pending days from disk and visits them in
    /// day order. The crawl ends after a pass in which every visited day
    /// succeeded, or when no day is pending at the start of a pass. Failed
    /// days are retried in the next pass with no retry limit unless
    /// `max_passes` is configured.
    pub async fn run(&mut self) -> Result<CrawlReport> {
        let span = self.span.clone();
        self.run_passes().instrument(span).await
    }

    async fn run_passes(&mut self) -> Result<CrawlReport> {
        self.setup()?;

        let mut report = CrawlReport::default();
        let mode = self.crawl.resume;

        loop {
            let pending = self.store.pending_units(mode)?;
            if pending.is_empty() {
                tracing::info!("No pending days left");
                break;
            }

            if let Some(max) = self.crawl.max_passes {
                if report.passes >= max {
                    return Err(HarvestError::PassLimit {
                        target: self.target().name.clone(),
                        passes: report.passes,
                        pending: pending.len(),
                    });
                }
            }

            report.passes += 1;
            tracing::info!(
                "Pass {}: {} days to crawl ({} resume)",
                report.passes,
                pending.len(),
                mode.as_str()
            );

            let mut all_succeeded = true;
            for unit in &pending {
                if self.crawl_unit(unit, mode, &mut report).await? {
                    report.units_completed += 1;
                } else {
                    all_succeeded = false;
                }
            }

            if all_succeeded {
                break;
            }

            tracing::warn!(
                "Pass {} finished with failures ({} so far), starting another pass",
                report.passes,
                report.total_failures()
            );
        }

        tracing::info!(
            "Crawl finished after {} passes: {} days completed, {} changes written, {} skipped, {} failed requests",
            report.passes,
            report.units_completed,
            report.changes_written,
            report.changes_skipped,
            report.total_failures()
        );

        Ok(report)
    }

    /// Crawls one day, returning whether every request for it succeeded
    ///
    /// Request failures are absorbed here; only local storage failures are
    /// propagated.
    async fn crawl_unit(
        &self,
        unit: &WorkUnit,
        mode: ResumeMode,
        report: &mut CrawlReport,
    ) -> Result<bool> {
        let removed = self.store.remove_partial_files(unit)?;
        if removed > 0 {
            tracing::debug!("Removed {} partial files for {}", removed, unit.day);
        }

        let frame = TimeFrame::day(unit.day);
        let changes = match self.client.changes_in_frame(&frame).await {
            Ok(changes) => changes,
            Err(e) => {
                tracing::error!("Listing changes for {} failed: {}", unit.day, e);
                self.handle_failure(&e, report).await;
                return Ok(false);
            }
        };

        tracing::info!("{}: {} changes", unit.day, changes.len());

        let mut seen = HashSet::new();
        let mut complete = true;
        for change in &changes {
            let number = change.number;
            if !seen.insert(number) {
                continue;
            }

            if mode == ResumeMode::Change && unit.has_change(number) {
                report.changes_skipped += 1;
                continue;
            }

            let change_id = change.change_id.as_deref().unwrap_or("unknown Change-Id");
            match self.client.change_detail(number).await {
                Ok(detail) => {
                    self.store.write_change(unit, detail.number, &detail.payload)?;
                    tracing::trace!("Stored change {} ({})", number, change_id);
                    report.changes_written += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Fetching change {} ({}, day {}) failed: {}",
                        number,
                        change_id,
                        unit.day,
                        e
                    );
                    self.handle_failure(&e, report).await;
                    complete = false;
                }
            }
        }

        if complete {
            self.store.mark_complete(unit)?;
        }

        Ok(complete)
    }

    async fn handle_failure(&self, error: &FetchError, report: &mut CrawlReport) {
        *report.failures.entry(error.kind()).or_insert(0) += 1;

        let decision = self.policy.decide(error);
        if decision.retryable {
            tracing::debug!("{} failure will be retried in the next pass", error.kind());
        }
        self.policy.apply(&decision).await;
    }
}

/// Runs a complete crawl of one configured target
///
/// # Example
///
/// ```no_run
/// use gerry_harvest::config::Config;
/// use gerry_harvest::crawler::run_harvest;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let report = run_harvest(&Config::builtin(), "golang").await?;
/// println!("{} changes written", report.changes_written);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: &Config, target_name: &str) -> Result<CrawlReport> {
    let target = config.target(target_name)?;
    let mut coordinator = Coordinator::new(config, target)?;
    coordinator.run().await
}
