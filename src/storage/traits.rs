//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    ActorIdentity, ActorRecord, ActorRef, CommentRecord, LikeBatch, PassRecord, PassStatus,
    PostRecord, TargetInfo, TargetRecord, TargetRunReport, TargetSnapshot,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Pass not found: {0}")]
    PassNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes take `&mut self` because a backend may replace its connection
/// while recovering from a failure. Every write is committed on its own, so
/// readers can observe a target mid-sweep.
pub trait Storage {
    // ===== Targets =====

    /// Registers a target as fresh; an existing target is left untouched
    ///
    /// # Returns
    ///
    /// `true` if a new row was inserted
    fn insert_target(&mut self, info: &TargetInfo) -> StorageResult<bool>;

    /// Deletes targets and everything crawled for them
    ///
    /// # Returns
    ///
    /// The number of target rows removed
    fn remove_targets(&mut self, ids: &[String]) -> StorageResult<u64>;

    /// Gets a target by ID
    fn get_target(&self, id: &str) -> StorageResult<Option<TargetRecord>>;

    /// Lists all registered targets in registration order
    fn list_targets(&self) -> StorageResult<Vec<TargetRecord>>;

    /// Clears the fresh flag after a completed full pass
    fn mark_target_crawled(&mut self, id: &str) -> StorageResult<()>;

    /// Records elapsed time, skip count and outcome of the latest sweep
    fn record_target_run(&mut self, id: &str, report: &TargetRunReport) -> StorageResult<()>;

    /// Appends a snapshot row for a target
    fn insert_snapshot(&mut self, snapshot: &TargetSnapshot) -> StorageResult<()>;

    /// Counts snapshot rows for a target
    fn count_snapshots(&self, target_id: &str) -> StorageResult<u64>;

    // ===== Posts and comments =====

    /// Inserts a post or, on conflict, overwrites its counters and message
    fn upsert_post(&mut self, post: &PostRecord) -> StorageResult<()>;

    /// Gets a post by provider ID
    fn get_post(&self, post_id: &str) -> StorageResult<Option<PostRecord>>;

    /// Counts posts, optionally for one target
    fn count_posts(&self, target_id: Option<&str>) -> StorageResult<u64>;

    /// Inserts a comment or, on conflict, updates its like count
    fn upsert_comment(&mut self, comment: &CommentRecord) -> StorageResult<()>;

    /// Gets a comment by provider ID
    fn get_comment(&self, comment_id: &str) -> StorageResult<Option<CommentRecord>>;

    /// Counts comments, optionally for one target
    fn count_comments(&self, target_id: Option<&str>) -> StorageResult<u64>;

    // ===== Likes and actors =====

    /// Writes one object's likes as a single insert-or-ignore statement
    fn insert_likes(&mut self, batch: &LikeBatch<'_>) -> StorageResult<()>;

    /// Counts likes, optionally for one object
    fn count_likes(&self, object_id: Option<&str>) -> StorageResult<u64>;

    /// Adds actors to the directory and to the target's fan list
    ///
    /// One insert-or-ignore statement per table.
    fn insert_actors(&mut self, target_id: &str, actors: &[ActorRef]) -> StorageResult<()>;

    /// Gets an actor directory entry
    fn get_actor(&self, id: &str) -> StorageResult<Option<ActorRecord>>;

    /// Actor IDs whose identity is unresolved, oldest-refreshed first
    fn unresolved_actor_ids(&self) -> StorageResult<Vec<String>>;

    /// Applies one batch of looked-up identities with a single CASE update
    ///
    /// Every ID in `batch` gets its refresh time stamped, whether or not the
    /// provider returned it.
    fn apply_identities(
        &mut self,
        batch: &[String],
        identities: &[ActorIdentity],
    ) -> StorageResult<()>;

    /// Counts actors; `Some(true)` resolved only, `Some(false)` unresolved only
    fn count_actors(&self, resolved: Option<bool>) -> StorageResult<u64>;

    /// Counts fans recorded for a target
    fn count_target_fans(&self, target_id: &str) -> StorageResult<u64>;

    // ===== Passes =====

    /// Creates a new pass row in the running state
    fn create_pass(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Closes a pass with its final status and counters
    fn finish_pass(
        &mut self,
        pass_id: i64,
        status: PassStatus,
        targets_done: u32,
        targets_abandoned: u32,
    ) -> StorageResult<()>;

    /// Gets the most recent pass
    fn get_latest_pass(&self) -> StorageResult<Option<PassRecord>>;

    /// Counts all passes
    fn count_passes(&self) -> StorageResult<u64>;
}
