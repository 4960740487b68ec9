//! Batch identity refresh
//!
//! Actors enter the directory with only an ID and display name. This pass
//! re-resolves unresolved actors in bounded batches: one bulk `?ids=` lookup
//! and one CASE update per batch. It runs on its own timer, independent of
//! crawl passes, and a run that starts while another is active is skipped.

use crate::config::Config;
use crate::crawler::parser::parse_identities;
use crate::graph::{FetchOutcome, RateLimitedFetcher};
use crate::storage::{open_storage, Storage};
use crate::url::{GraphEndpoint, IDENTITY_FIELDS};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of one refresh run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another run was active
    Skipped,
    Completed {
        batches: usize,
        /// Identities returned by the provider and applied
        resolved: usize,
        /// Batches whose lookup was abandoned
        abandoned: usize,
    },
}

/// Clears the running flag even if the run is dropped mid-batch
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Re-resolves actor identities in batches
#[derive(Clone)]
pub struct BatchIdentityRefresher {
    config: Arc<Config>,
    fetcher: RateLimitedFetcher,
    endpoint: GraphEndpoint,
    running: Arc<AtomicBool>,
}

impl BatchIdentityRefresher {
    pub fn new(config: Arc<Config>, fetcher: RateLimitedFetcher) -> Result<Self> {
        let endpoint = GraphEndpoint::from_config(&config.graph)?;
        Ok(Self {
            config,
            fetcher,
            endpoint,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs one refresh over every unresolved actor
    ///
    /// Batches are processed oldest-refreshed first; the final batch may be
    /// smaller than `batch-size`.
    pub async fn run<S: Storage>(&self, storage: &mut S) -> Result<RefreshOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Identity refresh already running, skipping");
            return Ok(RefreshOutcome::Skipped);
        }

        let _guard = RunningGuard(&self.running);
        self.refresh_all(storage).await
    }

    async fn refresh_all<S: Storage>(&self, storage: &mut S) -> Result<RefreshOutcome> {
        let ids = storage.unresolved_actor_ids()?;
        let batch_size = self.config.refresh.batch_size.max(1);
        tracing::info!(
            unresolved = ids.len(),
            batch_size,
            "Starting identity refresh"
        );

        let mut batches = 0;
        let mut resolved = 0;
        let mut abandoned = 0;

        for batch in ids.chunks(batch_size) {
            tokio::time::sleep(self.config.refresh.batch_delay()).await;

            let url = self.endpoint.objects(batch, IDENTITY_FIELDS);
            match self.fetcher.fetch(&url, None).await {
                FetchOutcome::Fetched { document, .. } => {
                    let identities = parse_identities(&document);
                    storage.apply_identities(batch, &identities)?;
                    resolved += identities.len();
                }
                FetchOutcome::Abandoned { message, .. } => {
                    self.fetcher
                        .log()
                        .error(format!("identity lookup abandoned: {}", message));
                    abandoned += 1;
                }
            }
            batches += 1;
            tracing::debug!(batch = batches, size = batch.len(), "Identity batch done");
        }

        tracing::info!(batches, resolved, abandoned, "Identity refresh finished");
        Ok(RefreshOutcome::Completed {
            batches,
            resolved,
            abandoned,
        })
    }

    /// Runs a refresh every `interval-minutes` until cancelled
    ///
    /// Each run opens its own connection to the configured database.
    pub async fn run_periodic(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.refresh.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let mut storage = match open_storage(&self.config.storage) {
                Ok(storage) => storage,
                Err(e) => {
                    tracing::error!(error = %e, "Identity refresh cannot open storage");
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.run(&mut storage) => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Identity refresh failed");
                    }
                }
            }
        }

        tracing::debug!("Periodic identity refresh stopped");
    }
}
