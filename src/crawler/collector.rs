//! Comment and like collection
//!
//! Sub-resource sweeps use the same cursor walk as feeds. The first page is
//! requested with `summary=true` so the provider's `total_count` can be
//! denormalized onto the parent; actors seen on a page are written to the
//! directory and the target's fan list in one batch per table.

use crate::config::{Config, LimitsConfig};
use crate::crawler::paginator::{Cursor, Page, SweepOutcome};
use crate::crawler::parser::{page_items, parse_actor, parse_comment, summary_total_count};
use crate::graph::RateLimitedFetcher;
use crate::storage::{ActorRef, LikeBatch, Storage};
use crate::url::GraphEndpoint;
use crate::Result;
use std::collections::BTreeMap;

/// Which sub-resource to collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubResourceKind {
    Comments,
    Likes,
}

impl SubResourceKind {
    /// Graph edge name
    pub fn edge(&self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::Likes => "likes",
        }
    }

    pub fn page_limit(&self, limits: &LimitsConfig) -> u32 {
        match self {
            Self::Comments => limits.comment_page_limit,
            Self::Likes => limits.like_page_limit,
        }
    }
}

/// The object whose sub-resource is collected
#[derive(Debug, Clone, Copy)]
pub struct Parent<'p> {
    /// Post or comment ID
    pub object_id: &'p str,
    pub target_id: &'p str,
    /// Denormalized onto comments and likes
    pub created_time: Option<&'p str>,
}

/// Summary of one sub-resource sweep
#[derive(Debug, Clone, PartialEq)]
pub struct CollectReport {
    /// Provider-reported total, or the persisted count if none was reported
    pub total_count: u64,
    pub persisted: u64,
    pub skipped: u32,
    pub outcome: SweepOutcome,
}

/// Tally shared by both sub-resource walks
#[derive(Default)]
struct Tally {
    total: Option<u64>,
    persisted: u64,
    skipped: u32,
}

impl Tally {
    fn finish(self, outcome: SweepOutcome) -> CollectReport {
        CollectReport {
            total_count: self.total.unwrap_or(self.persisted),
            persisted: self.persisted,
            skipped: self.skipped,
            outcome,
        }
    }
}

/// Collects comments and likes of a post, or likes of a comment
pub struct SubResourceCollector<'a, S: Storage> {
    fetcher: &'a RateLimitedFetcher,
    storage: &'a mut S,
    endpoint: &'a GraphEndpoint,
    config: &'a Config,
}

impl<'a, S: Storage> SubResourceCollector<'a, S> {
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

    /// Sweeps one sub-resource of `parent`
    ///
    /// Malformed items are logged and skipped, so `total_count` may exceed
    /// `persisted`. An abandoned sweep keeps what it already wrote.
    pub async fn collect(
        &mut self,
        parent: &Parent<'_>,
        kind: SubResourceKind,
    ) -> Result<CollectReport> {
        match kind {
            SubResourceKind::Comments => self.collect_comments(parent).await,
            SubResourceKind::Likes => self.collect_likes(parent).await,
        }
    }

    fn cursor(&self, parent: &Parent<'_>, kind: SubResourceKind) -> Cursor {
        let limit = kind.page_limit(&self.config.limits);
        Cursor::new(
            self.endpoint.sub_resource(parent.object_id, kind.edge(), limit),
            limit,
            None,
        )
    }

    async fn collect_comments(&mut self, parent: &Parent<'_>) -> Result<CollectReport> {
        let mut cursor = self.cursor(parent, SubResourceKind::Comments);
        let mut tally = Tally::default();
        let mut first = true;

        let outcome = loop {
            let document = match cursor.next_page(self.fetcher).await {
                Page::Fetched(document) => document,
                Page::Done => break SweepOutcome::Completed,
                Page::Abandoned(kind) => break SweepOutcome::Abandoned(kind),
            };
            if first {
                tally.total = summary_total_count(&document);
                first = false;
            }

            let mut actors = BTreeMap::new();
            for item in page_items(&document) {
                let mut comment = match parse_comment(
                    item,
                    parent.object_id,
                    parent.target_id,
                    parent.created_time,
                ) {
                    Ok(comment) => comment,
                    Err(e) => {
                        self.fetcher.log().error(format!(
                            "skipping comment on {}: {}",
                            parent.object_id, e
                        ));
                        tally.skipped += 1;
                        continue;
                    }
                };

                // The likes total replaces the embedded count, as for posts
                if self.config.crawl.collect_comment_likes && comment.like_count > 0 {
                    let nested = Parent {
                        object_id: &comment.comment_id,
                        target_id: parent.target_id,
                        created_time: comment.created_time.as_deref(),
                    };
                    let report = self.collect_likes(&nested).await?;
                    tally.skipped += report.skipped;
                    comment.like_count = report.total_count as i64;
                }

                self.storage.upsert_comment(&comment)?;
                tally.persisted += 1;
                actors.insert(comment.from_id.clone(), comment.from_name.clone());
            }

            let actors: Vec<ActorRef> = actors
                .into_iter()
                .map(|(id, name)| ActorRef { id, name })
                .collect();
            self.storage.insert_actors(parent.target_id, &actors)?;
        };

        Ok(tally.finish(outcome))
    }

    async fn collect_likes(&mut self, parent: &Parent<'_>) -> Result<CollectReport> {
        let mut cursor = self.cursor(parent, SubResourceKind::Likes);
        let mut tally = Tally::default();
        let mut first = true;

        let outcome = loop {
            let document = match cursor.next_page(self.fetcher).await {
                Page::Fetched(document) => document,
                Page::Done => break SweepOutcome::Completed,
                Page::Abandoned(kind) => break SweepOutcome::Abandoned(kind),
            };
            if first {
                tally.total = summary_total_count(&document);
                first = false;
            }

            let mut actors = Vec::new();
            for item in page_items(&document) {
                match parse_actor(item) {
                    Ok(actor) => actors.push(actor),
                    Err(e) => {
                        self.fetcher.log().error(format!(
                            "skipping like on {}: {}",
                            parent.object_id, e
                        ));
                        tally.skipped += 1;
                    }
                }
            }
            actors.sort();
            actors.dedup_by(|a, b| a.id == b.id);

            self.storage.insert_likes(&LikeBatch {
                object_id: parent.object_id,
                target_id: parent.target_id,
                object_created_time: parent.created_time,
                actors: &actors,
            })?;
            self.storage.insert_actors(parent.target_id, &actors)?;
            tally.persisted += actors.len() as u64;
        };

        Ok(tally.finish(outcome))
    }
}
