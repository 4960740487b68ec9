//! Cursor-driven pagination
//!
//! A sweep walks one container's pages strictly in sequence: fetch, persist
//! every item, follow `paging.next`. It ends on an empty page, a page
//! without a cursor, or an abandoned fetch. Items already written when a
//! sweep is abandoned stay written.

use crate::config::Config;
use crate::crawler::collector::{Parent, SubResourceCollector, SubResourceKind};
use crate::crawler::parser::{next_cursor, page_items, parse_post};
use crate::graph::{ErrorKind, FetchOutcome, RateLimitedFetcher};
use crate::storage::Storage;
use crate::url::{format_provider_date, set_query_param, GraphEndpoint};
use crate::Result;
use chrono::NaiveDate;
use serde_json::Value;

/// How a sweep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed,
    Abandoned(ErrorKind),
}

impl SweepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Abandoned(_) => "abandoned",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Summary of one feed sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub outcome: SweepOutcome,
    /// Posts upserted
    pub posts: u64,
    /// Malformed items skipped, including comments and likes
    pub skipped: u32,
    /// Requests issued for the feed itself
    pub fetches: u32,
}

/// One page of a cursor walk
#[derive(Debug)]
pub(crate) enum Page {
    Fetched(Value),
    Done,
    Abandoned(ErrorKind),
}

/// Position within one paginated sweep
///
/// Exists only for the duration of the sweep. The provider's `next` URL is
/// followed as-is except that the page limit in effect and the original
/// `since` bound are written back onto it.
pub(crate) struct Cursor {
    next_url: Option<String>,
    limit: u32,
    since: Option<NaiveDate>,
    fetches: u32,
}

impl Cursor {
    pub(crate) fn new(first_url: String, limit: u32, since: Option<NaiveDate>) -> Self {
        Self {
            next_url: Some(first_url),
            limit,
            since,
            fetches: 0,
        }
    }

    pub(crate) fn fetches(&self) -> u32 {
        self.fetches
    }

    /// Fetches the next page
    ///
    /// A page with no items is returned once and ends the walk.
    pub(crate) async fn next_page(&mut self, fetcher: &RateLimitedFetcher) -> Page {
        let Some(url) = self.next_url.take() else {
            return Page::Done;
        };

        match fetcher.fetch(&url, Some(self.limit)).await {
            FetchOutcome::Fetched {
                document,
                limit,
                attempts,
            } => {
                self.fetches += attempts;
                if let Some(limit) = limit {
                    self.limit = limit;
                }
                if !page_items(&document).is_empty() {
                    self.next_url = next_cursor(&document).and_then(|next| self.follow(next));
                }
                Page::Fetched(document)
            }
            FetchOutcome::Abandoned { kind, attempts, .. } => {
                self.fetches += attempts;
                Page::Abandoned(kind)
            }
        }
    }

    fn follow(&self, next: &str) -> Option<String> {
        let mut url = set_query_param(next, "limit", &self.limit.to_string());
        if let Some(since) = self.since {
            url = url.and_then(|u| set_query_param(&u, "since", &format_provider_date(since)));
        }
        match url {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed paging cursor");
                None
            }
        }
    }
}

/// Walks a container's feed and persists its posts
pub struct CursorPaginator<'a, S: Storage> {
    fetcher: &'a RateLimitedFetcher,
    storage: &'a mut S,
    endpoint: &'a GraphEndpoint,
    config: &'a Config,
}

impl<'a, S: Storage> CursorPaginator<'a, S> {
    pub fn new(
        fetcher: &'a RateLimitedFetcher,
        storage: &'a mut S,
        endpoint: &'a GraphEndpoint,
        config: &'a Config,
    ) -> Self {
        Self {
            fetcher,
            storage,
            endpoint,
            config,
        }
    }

    /// Sweeps `target_id`'s feed between optional date bounds
    ///
    /// # Returns
    ///
    /// * `Ok(SweepReport)` - The sweep ended, completed or abandoned
    /// * `Err(CrawlerError)` - A write failed in a way reconnecting cannot fix
    pub async fn paginate(
        &mut self,
        target_id: &str,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<SweepReport> {
        let limit = self.config.limits.feed_page_limit;
        let mut cursor = Cursor::new(
            self.endpoint.feed(target_id, limit, since, until),
            limit,
            since,
        );

        let mut posts = 0u64;
        let mut skipped = 0u32;

        let outcome = loop {
            let document = match cursor.next_page(self.fetcher).await {
                Page::Fetched(document) => document,
                Page::Done => break SweepOutcome::Completed,
                Page::Abandoned(kind) => {
                    tracing::warn!(target_id, %kind, "Feed sweep abandoned");
                    break SweepOutcome::Abandoned(kind);
                }
            };

            let items = page_items(&document);
            tracing::debug!(target_id, items = items.len(), "Feed page");

            for item in items {
                let (persisted, item_skipped) = self.persist_post(item, target_id).await?;
                posts += persisted;
                skipped += item_skipped;
            }
        };

        Ok(SweepReport {
            outcome,
            posts,
            skipped,
            fetches: cursor.fetches(),
        })
    }

    /// Collects a post's sub-resources, then upserts it
    ///
    /// Returns posts persisted (0 or 1) and items skipped.
    async fn persist_post(&mut self, item: &Value, target_id: &str) -> Result<(u64, u32)> {
        let mut post = match parse_post(item, target_id) {
            Ok(post) => post,
            Err(e) => {
                self.fetcher
                    .log()
                    .error(format!("skipping post on {}: {}", target_id, e));
                return Ok((0, 1));
            }
        };

        let mut skipped = 0u32;
        let mut collector =
            SubResourceCollector::new(self.fetcher, &mut *self.storage, self.endpoint, self.config);
        let parent = Parent {
            object_id: &post.post_id,
            target_id,
            created_time: post.created_time.as_deref(),
        };

        let comments = if item.get("comments").is_some() {
            let report = collector.collect(&parent, SubResourceKind::Comments).await?;
            skipped += report.skipped;
            Some(report.total_count)
        } else {
            None
        };

        let likes = if item.get("likes").is_some() {
            let report = collector.collect(&parent, SubResourceKind::Likes).await?;
            skipped += report.skipped;
            Some(report.total_count)
        } else {
            None
        };

        if let Some(total) = comments {
            post.comment_count = total as i64;
        }
        if let Some(total) = likes {
            post.like_count = total as i64;
        }

        self.storage.upsert_post(&post)?;
        Ok((1, skipped))
    }
}
