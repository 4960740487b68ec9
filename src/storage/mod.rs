//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent post and comment upserts keyed by provider ID
//! - Batched like, fan and actor directory writes
//! - Crawl target bookkeeping and snapshots
//! - Pass tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::StorageConfig;
use std::time::Duration;

/// Opens the configured database with its reconnect policy
///
/// Every worker calls this for itself; connections are never shared
/// across tasks.
pub fn open_storage(config: &StorageConfig) -> StorageResult<SqliteStorage> {
    SqliteStorage::open(
        std::path::Path::new(&config.database_path),
        Duration::from_millis(config.reconnect_delay_ms),
    )
}

/// Descriptive information about a crawl target as reported by the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetInfo {
    pub id: String,
    pub name: String,
    pub link: Option<String>,
    pub category: Option<String>,
    pub website: Option<String>,
    pub founded: Option<String>,
    pub about: Option<String>,
    pub likes: i64,
    pub talking_about_count: i64,
}

/// A crawl target (page or group) row
#[derive(Debug, Clone)]
pub struct TargetRecord {
    pub id: String,
    pub name: String,
    pub link: Option<String>,
    pub category: Option<String>,
    /// True until the first full crawl pass over this target completes
    pub is_fresh: bool,
    pub added_at: String,
    pub last_crawled_at: Option<String>,
    pub last_elapsed_secs: Option<f64>,
    pub last_skipped: u32,
    pub last_outcome: Option<String>,
}

/// Per-target bookkeeping written after each sweep
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRunReport {
    pub elapsed_secs: f64,
    pub skipped: u32,
    pub outcome: &'static str,
}

/// A point-in-time copy of a target's provider info and persisted volume
#[derive(Debug, Clone)]
pub struct TargetSnapshot {
    pub info: TargetInfo,
    pub post_count: u64,
    pub comment_count: u64,
}

/// A post row; unique on `post_id`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostRecord {
    pub post_id: String,
    pub target_id: String,
    pub from_id: Option<String>,
    pub from_name: Option<String>,
    pub message: Option<String>,
    pub picture: Option<String>,
    pub link: Option<String>,
    pub name: Option<String>,
    pub caption: Option<String>,
    pub source: Option<String>,
    pub icon: Option<String>,
    pub post_type: Option<String>,
    pub object_id: Option<String>,
    pub description: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

/// A comment row; unique on `comment_id`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentRecord {
    pub comment_id: String,
    pub post_id: String,
    pub target_id: String,
    pub from_id: String,
    pub from_name: String,
    pub message: Option<String>,
    pub like_count: i64,
    pub created_time: Option<String>,
    /// Denormalized from the parent post
    pub post_created_time: Option<String>,
}

/// An actor seen on a comment or like
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActorRef {
    pub id: String,
    pub name: String,
}

/// An actor directory row
#[derive(Debug, Clone, PartialEq)]
pub struct ActorRecord {
    pub id: String,
    pub name: String,
    /// `None` until the identity refresher resolves the actor
    pub username: Option<String>,
    pub gender: Option<String>,
    pub refreshed_at: Option<String>,
}

/// Identity fields returned by a bulk lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorIdentity {
    pub id: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub gender: Option<String>,
}

/// Likes of one object (post or comment), written as one statement
#[derive(Debug, Clone)]
pub struct LikeBatch<'a> {
    pub object_id: &'a str,
    pub target_id: &'a str,
    pub object_created_time: Option<&'a str>,
    pub actors: &'a [ActorRef],
}

/// Represents a crawl pass
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: PassStatus,
    pub targets_done: u32,
    pub targets_abandoned: u32,
}

/// Status of a crawl pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl PassStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
