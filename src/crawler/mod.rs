//! Crawler module for Graph feed and sub-resource crawling
//!
//! This module contains the core crawl logic, including:
//! - Parsing Graph documents into records
//! - Cursor-driven feed sweeps and comment/like collection
//! - Pass scheduling with cooperative cancellation
//! - The single-active-pass engine
//! - Batch identity refresh and target registration

mod collector;
mod engine;
mod paginator;
mod parser;
mod refresher;
mod scheduler;
mod targets;

pub use collector::{CollectReport, Parent, SubResourceCollector, SubResourceKind};
pub use engine::{CrawlEngine, CrawlHandle};
pub use paginator::{CursorPaginator, SweepOutcome, SweepReport};
pub use parser::{
    lookup_objects, next_cursor, normalize_time, page_items, parse_actor, parse_comment,
    parse_identities, parse_post, parse_target_info, summary_total_count, MalformedItem,
};
pub use refresher::{BatchIdentityRefresher, RefreshOutcome};
pub use scheduler::{CrawlRequest, CrawlScheduler, DateRange, PassSummary};
pub use targets::{list_targets, register_targets, remove_targets, RegisterReport};
