//! Crawl scheduling
//!
//! The scheduler walks the selected targets once per pass. For each target it
//! picks the sweep's date bounds from the target's persisted state, runs the
//! feed sweep, and writes the per-target bookkeeping. In continuous mode it
//! then sleeps for the update period and starts over, until cancelled.
//!
//! Cancellation is checked between targets and during the inter-pass sleep;
//! a target that has started always runs to the end of its sweep.

use crate::config::Config;
use crate::crawler::paginator::{CursorPaginator, SweepOutcome};
use crate::crawler::parser::parse_target_info;
use crate::graph::{FetchOutcome, RateLimitedFetcher};
use crate::state::SchedulerState;
use crate::storage::{PassStatus, Storage, TargetRecord, TargetRunReport, TargetSnapshot};
use crate::url::{GraphEndpoint, TARGET_INFO_FIELDS};
use crate::{CrawlerError, Result};
use chrono::{Local, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// An explicit backfill window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// What to crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Registered target IDs, crawled in this order
    pub target_ids: Vec<String>,
    /// Run a single pass even when an update period is configured
    pub once: bool,
    /// Sweep every target with these bounds; fresh flags are left alone
    pub range: Option<DateRange>,
}

impl CrawlRequest {
    pub fn new(target_ids: Vec<String>) -> Self {
        Self {
            target_ids,
            once: false,
            range: None,
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.range = Some(DateRange { start, end });
        self
    }

    /// Checks the preconditions for leaving Idle
    pub fn validate(&self) -> Result<()> {
        if self.target_ids.is_empty() {
            return Err(CrawlerError::InvalidRequest(
                "no crawl targets selected".to_string(),
            ));
        }
        if let Some(range) = self.range {
            if range.end < range.start {
                return Err(CrawlerError::InvalidRequest(format!(
                    "end date {} is before start date {}",
                    range.end, range.start
                )));
            }
        }
        Ok(())
    }
}

/// Totals of one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub pass_id: i64,
    pub targets_done: u32,
    pub targets_abandoned: u32,
    pub posts: u64,
    pub cancelled: bool,
}

/// Runs crawl passes over a set of targets
pub struct CrawlScheduler<S: Storage> {
    config: Arc<Config>,
    config_hash: String,
    fetcher: RateLimitedFetcher,
    endpoint: GraphEndpoint,
    storage: S,
    state: watch::Sender<SchedulerState>,
    cancel: CancellationToken,
}

impl<S: Storage> CrawlScheduler<S> {
    /// Creates a scheduler in the Idle state
    ///
    /// The scheduler owns its storage connection; it is never shared with
    /// another worker.
    pub fn new(
        config: Arc<Config>,
        config_hash: impl Into<String>,
        fetcher: RateLimitedFetcher,
        storage: S,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let endpoint = GraphEndpoint::from_config(&config.graph)?;
        let (state, _) = watch::channel(SchedulerState::Idle);
        Ok(Self {
            config,
            config_hash: config_hash.into(),
            fetcher,
            endpoint,
            storage,
            state,
            cancel,
        })
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watches state changes
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn transition(&self, to: SchedulerState) -> Result<()> {
        let from = self.state();
        if !from.can_transition_to(to) {
            return Err(CrawlerError::InvalidTransition { from, to });
        }
        tracing::debug!(%from, %to, "Scheduler transition");
        self.state.send_replace(to);
        Ok(())
    }

    /// Runs passes until done (one-shot) or cancelled (continuous)
    ///
    /// # Returns
    ///
    /// * `Ok(PassSummary)` - Summary of the last pass
    /// * `Err(CrawlerError)` - The request was invalid, or a pass could not be
    ///   recorded
    pub async fn run(&mut self, request: CrawlRequest) -> Result<PassSummary> {
        request.validate()?;
        self.transition(SchedulerState::Running)?;

        let period = if request.once {
            None
        } else {
            self.config.crawl.update_period()
        };
        let log = self.fetcher.log().clone();

        loop {
            let summary = match self.run_pass(&request).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!(error = %e, "Crawl pass failed");
                    self.transition(SchedulerState::Idle)?;
                    return Err(e);
                }
            };

            if summary.cancelled {
                self.transition(SchedulerState::Cancelled)?;
                log.progress("update cancelled");
                return Ok(summary);
            }

            let Some(period) = period else {
                self.transition(SchedulerState::Idle)?;
                log.progress("update finished");
                return Ok(summary);
            };

            let next_run = Local::now() + period;
            log.progress(format!(
                "next update at {}",
                next_run.format("%Y/%m/%d %H:%M:%S")
            ));
            self.transition(SchedulerState::Sleeping)?;

            let wait = period.to_std().unwrap_or_default();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.transition(SchedulerState::Cancelled)?;
                    log.progress("update cancelled");
                    return Ok(summary);
                }
                _ = tokio::time::sleep(wait) => {}
            }

            self.transition(SchedulerState::Running)?;
        }
    }

    async fn run_pass(&mut self, request: &CrawlRequest) -> Result<PassSummary> {
        let pass_id = self.storage.create_pass(&self.config_hash)?;
        tracing::info!(pass_id, targets = request.target_ids.len(), "Starting crawl pass");

        let mut summary = PassSummary {
            pass_id,
            ..PassSummary::default()
        };

        for id in &request.target_ids {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            // Freshness is read once per pass, here
            let target = match self.storage.get_target(id)? {
                Some(target) => target,
                None => {
                    self.fetcher
                        .log()
                        .error(format!("target {} is not registered", id));
                    summary.targets_abandoned += 1;
                    continue;
                }
            };

            match self.crawl_target(&target, request.range).await {
                Ok((SweepOutcome::Completed, posts)) => {
                    summary.targets_done += 1;
                    summary.posts += posts;
                }
                Ok((SweepOutcome::Abandoned(_), posts)) => {
                    summary.targets_abandoned += 1;
                    summary.posts += posts;
                }
                Err(e) => {
                    tracing::error!(target_id = %target.id, error = %e, "Target failed");
                    self.fetcher
                        .log()
                        .error(format!("{} failed: {}", target.name, e));
                    summary.targets_abandoned += 1;
                }
            }
        }

        let status = if summary.cancelled {
            PassStatus::Cancelled
        } else {
            PassStatus::Completed
        };
        self.storage.finish_pass(
            pass_id,
            status,
            summary.targets_done,
            summary.targets_abandoned,
        )?;

        tracing::info!(
            pass_id,
            done = summary.targets_done,
            abandoned = summary.targets_abandoned,
            posts = summary.posts,
            "Crawl pass finished"
        );
        Ok(summary)
    }

    /// Sweep bounds for a target
    ///
    /// Fresh targets go back to `new-target-since` (or all history); others
    /// only re-sweep the recent window. An explicit range overrides both.
    fn bounds(
        &self,
        target: &TargetRecord,
        range: Option<DateRange>,
    ) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match range {
            Some(range) => (Some(range.start), Some(range.end)),
            None if target.is_fresh => (self.config.crawl.new_target_since, None),
            None => {
                let window = chrono::Duration::days(self.config.crawl.recent_window_days.into());
                (Some(Utc::now().date_naive() - window), None)
            }
        }
    }

    async fn crawl_target(
        &mut self,
        target: &TargetRecord,
        range: Option<DateRange>,
    ) -> Result<(SweepOutcome, u64)> {
        let started = Instant::now();
        let (since, until) = self.bounds(target, range);
        self.fetcher
            .log()
            .progress(format!("Now updating {}", target.name));
        tracing::info!(target_id = %target.id, ?since, ?until, fresh = target.is_fresh, "Sweeping target");

        let report = match CursorPaginator::new(
            &self.fetcher,
            &mut self.storage,
            &self.endpoint,
            &self.config,
        )
        .paginate(&target.id, since, until)
        .await
        {
            Ok(report) => report,
            Err(e) => {
                // The failed run still shows up in the target listing
                let run = TargetRunReport {
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    skipped: 0,
                    outcome: "abandoned",
                };
                if let Err(record_err) = self.storage.record_target_run(&target.id, &run) {
                    tracing::warn!(target_id = %target.id, error = %record_err, "Failed to record target run");
                }
                return Err(e);
            }
        };

        // A bounded backfill is not a full crawl
        if report.outcome.is_completed() && target.is_fresh && range.is_none() {
            self.storage.mark_target_crawled(&target.id)?;
        }

        self.storage.record_target_run(
            &target.id,
            &TargetRunReport {
                elapsed_secs: started.elapsed().as_secs_f64(),
                skipped: report.skipped,
                outcome: report.outcome.as_str(),
            },
        )?;

        if self.config.crawl.snapshot_targets {
            self.snapshot(&target.id).await?;
        }

        self.fetcher.log().progress(format!(
            "{} was updated {}",
            target.name,
            report.outcome.as_str()
        ));
        Ok((report.outcome, report.posts))
    }

    /// Appends a snapshot row; a failed info fetch is logged and skipped
    async fn snapshot(&mut self, target_id: &str) -> Result<()> {
        let url = self.endpoint.object(target_id, TARGET_INFO_FIELDS);
        let document = match self.fetcher.fetch(&url, None).await {
            FetchOutcome::Fetched { document, .. } => document,
            FetchOutcome::Abandoned { message, .. } => {
                self.fetcher
                    .log()
                    .error(format!("no snapshot for {}: {}", target_id, message));
                return Ok(());
            }
        };

        let info = match parse_target_info(&document) {
            Ok(info) => info,
            Err(e) => {
                self.fetcher
                    .log()
                    .error(format!("no snapshot for {}: {}", target_id, e));
                return Ok(());
            }
        };

        let snapshot = TargetSnapshot {
            post_count: self.storage.count_posts(Some(target_id))?,
            comment_count: self.storage.count_comments(Some(target_id))?,
            info,
        };
        self.storage.insert_snapshot(&snapshot)?;
        Ok(())
    }
}
