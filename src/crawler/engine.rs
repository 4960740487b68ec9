//! Crawl engine
//!
//! Owns the session (configuration, Graph client, operator log) and starts
//! scheduler invocations on their own tasks. At most one invocation is
//! active at a time; a second `start` is rejected, not queued.

use crate::config::Config;
use crate::crawler::scheduler::{CrawlRequest, CrawlScheduler, PassSummary};
use crate::graph::{GraphClient, OperatorLog, RateLimitedFetcher, RetryPolicy};
use crate::state::SchedulerState;
use crate::storage::{open_storage, Storage};
use crate::{CrawlerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Clears the active flag when the worker ends, however it ends
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts and guards crawl invocations
pub struct CrawlEngine {
    config: Arc<Config>,
    config_hash: String,
    client: Arc<dyn GraphClient>,
    log: OperatorLog,
    active: Arc<AtomicBool>,
}

impl CrawlEngine {
    pub fn new(
        config: Arc<Config>,
        config_hash: impl Into<String>,
        client: Arc<dyn GraphClient>,
        log: OperatorLog,
    ) -> Self {
        Self {
            config,
            config_hash: config_hash.into(),
            client,
            log,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// A fetcher sharing this engine's client, policy and log
    pub fn fetcher(&self) -> RateLimitedFetcher {
        RateLimitedFetcher::new(
            self.client.clone(),
            RetryPolicy::from_config(&self.config),
            self.log.clone(),
        )
    }

    /// Returns true while an invocation is running or sleeping
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Starts an invocation on the configured database
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlHandle)` - The worker was spawned
    /// * `Err(CrawlerError::AlreadyRunning)` - Another invocation is active
    /// * `Err(CrawlerError)` - The request is invalid or storage cannot open
    pub fn start(&self, request: CrawlRequest) -> Result<CrawlHandle> {
        request.validate()?;
        let guard = self.acquire()?;
        let storage = open_storage(&self.config.storage)?;
        self.spawn(request, storage, guard)
    }

    /// Starts an invocation on caller-provided storage
    pub fn start_with_storage<S>(&self, request: CrawlRequest, storage: S) -> Result<CrawlHandle>
    where
        S: Storage + Send + 'static,
    {
        request.validate()?;
        let guard = self.acquire()?;
        self.spawn(request, storage, guard)
    }

    fn acquire(&self) -> Result<ActiveGuard> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CrawlerError::AlreadyRunning)?;
        Ok(ActiveGuard(self.active.clone()))
    }

    fn spawn<S>(&self, request: CrawlRequest, storage: S, guard: ActiveGuard) -> Result<CrawlHandle>
    where
        S: Storage + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let mut scheduler = CrawlScheduler::new(
            self.config.clone(),
            self.config_hash.clone(),
            self.fetcher(),
            storage,
            cancel.clone(),
        )?;
        let state = scheduler.subscribe();

        let join = tokio::spawn(async move {
            let _guard = guard;
            scheduler.run(request).await
        });

        Ok(CrawlHandle {
            cancel,
            state,
            join,
        })
    }
}

/// Handle on a running invocation
pub struct CrawlHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SchedulerState>,
    join: JoinHandle<Result<PassSummary>>,
}

impl CrawlHandle {
    /// Requests cancellation at the next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this invocation when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watches state changes
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Waits for the worker to finish
    pub async fn wait(self) -> Result<PassSummary> {
        self.join
            .await
            .map_err(|e| CrawlerError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::graph::testing::ScriptedClient;
    use crate::storage::{SqliteStorage, TargetInfo};
    use serde_json::json;

    fn engine(client: Arc<ScriptedClient>, update_period_days: u32) -> CrawlEngine {
        let mut config = parse_config(
            r#"
            [graph]
            base-url = "https://graph.test/v2.3"
            access-token = "tok"

            [crawl]
            snapshot-targets = false

            [storage]
            database-path = ":memory:"
        "#,
        )
        .unwrap();
        config.crawl.update_period_days = update_period_days;
        CrawlEngine::new(Arc::new(config), "hash", client, OperatorLog::disabled())
    }

    fn storage() -> SqliteStorage {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .insert_target(&TargetInfo {
                id: "42".to_string(),
                name: "Page".to_string(),
                ..TargetInfo::default()
            })
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_active() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(json!({"data": []}))));
        let engine = engine(client, 1);

        let handle = engine
            .start_with_storage(CrawlRequest::new(vec!["42".to_string()]), storage())
            .unwrap();
        assert!(engine.is_running());

        let second =
            engine.start_with_storage(CrawlRequest::new(vec!["42".to_string()]), storage());
        assert!(matches!(second, Err(CrawlerError::AlreadyRunning)));

        handle.cancel();
        handle.wait().await.unwrap();
        assert!(!engine.is_running());

        // Free again once the first invocation ended
        let third = engine
            .start_with_storage(CrawlRequest::new(vec!["42".to_string()]).once(), storage())
            .unwrap();
        let summary = third.wait().await.unwrap();
        assert_eq!(summary.targets_done, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_does_not_take_the_slot() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(json!({"data": []}))));
        let engine = engine(client, 0);

        let result = engine.start_with_storage(CrawlRequest::new(vec![]), storage());
        assert!(matches!(result, Err(CrawlerError::InvalidRequest(_))));
        assert!(!engine.is_running());
    }
}
