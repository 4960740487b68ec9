//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//!
//! Writes go through a reconnect-and-retry loop: when SQLite reports a busy,
//! locked, I/O or open failure on a file-backed database the connection is
//! closed, reopened and the statement is re-run until it succeeds. Data that
//! has already been fetched from the provider is never dropped because the
//! database hiccupped.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ActorIdentity, ActorRecord, ActorRef, CommentRecord, LikeBatch, PassRecord, PassStatus,
    PostRecord, TargetInfo, TargetRecord, TargetRunReport, TargetSnapshot,
};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, ToSql};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Where the connection comes from, so it can be reopened
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    location: Location,
    reconnect_delay: Duration,
}

impl SqliteStorage {
    /// Opens (or creates) a file-backed database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `reconnect_delay` - Pause before reopening after a failure
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path, reconnect_delay: Duration) -> StorageResult<Self> {
        let location = Location::File(path.to_path_buf());
        let conn = open_connection(&location)?;
        Ok(Self {
            conn,
            location,
            reconnect_delay,
        })
    }

    /// Creates an in-memory database
    ///
    /// An in-memory database cannot be reopened, so failures are returned
    /// to the caller instead of retried.
    pub fn open_in_memory() -> StorageResult<Self> {
        let location = Location::Memory;
        let conn = open_connection(&location)?;
        Ok(Self {
            conn,
            location,
            reconnect_delay: Duration::ZERO,
        })
    }

    /// Runs a write, reconnecting and retrying on connection-level failures
    fn write<T, F>(&mut self, mut op: F) -> StorageResult<T>
    where
        F: FnMut(&Connection) -> rusqlite::Result<T>,
    {
        let mut attempt: u64 = 0;
        loop {
            let err = match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.can_reconnect(&err) {
                return Err(err.into());
            }

            attempt += 1;
            tracing::warn!(
                attempt,
                error = %err,
                "Database write failed, reconnecting"
            );
            pause(self.reconnect_delay);

            match open_connection(&self.location) {
                Ok(conn) => self.conn = conn,
                Err(reopen_err) => {
                    tracing::error!(error = %reopen_err, "Failed to reopen database");
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn can_reconnect(&self, err: &rusqlite::Error) -> bool {
        matches!(self.location, Location::File(_)) && is_connection_failure(err)
    }
}

/// Sleeps before a reconnect
///
/// Storage calls are synchronous. On a multi-threaded runtime the worker
/// hands its other tasks off before blocking.
fn pause(delay: Duration) {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(delay))
        }
        _ => std::thread::sleep(delay),
    }
}

/// Returns true for errors a fresh connection can plausibly fix
fn is_connection_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
        ),
        _ => false,
    }
}

/// Opens a connection and makes sure the schema exists
fn open_connection(location: &Location) -> Result<Connection, rusqlite::Error> {
    let conn = match location {
        Location::File(path) => {
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
            ",
            )?;
            conn.busy_timeout(Duration::from_secs(5))?;
            conn
        }
        Location::Memory => Connection::open_in_memory()?,
    };

    initialize_schema(&conn)?;
    Ok(conn)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// SQLite's default bound on `?` parameters in one statement
const MAX_VARIABLES: usize = 32_766;

/// Rows per multi-row statement when each row binds `columns` parameters
fn rows_per_statement(columns: usize) -> usize {
    (MAX_VARIABLES / columns).max(1)
}

/// `(?, ?, ...)` groups for a multi-row VALUES clause
fn value_groups(rows: usize, columns: usize) -> String {
    let group = format!("({})", vec!["?"; columns].join(", "));
    vec![group; rows].join(", ")
}

fn count(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> StorageResult<u64> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn target_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TargetRecord> {
    Ok(TargetRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        link: row.get(2)?,
        category: row.get(3)?,
        is_fresh: row.get(4)?,
        added_at: row.get(5)?,
        last_crawled_at: row.get(6)?,
        last_elapsed_secs: row.get(7)?,
        last_skipped: row.get(8)?,
        last_outcome: row.get(9)?,
    })
}

const TARGET_COLUMNS: &str = "id, name, link, category, is_fresh, added_at, last_crawled_at,
     last_elapsed_secs, last_skipped, last_outcome";

impl Storage for SqliteStorage {
    // ===== Targets =====

    fn insert_target(&mut self, info: &TargetInfo) -> StorageResult<bool> {
        let added_at = now();
        let inserted = self.write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO targets
                 (id, name, link, category, website, founded, about, likes, talking_about_count,
                  is_fresh, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
                params![
                    info.id,
                    info.name,
                    info.link,
                    info.category,
                    info.website,
                    info.founded,
                    info.about,
                    info.likes,
                    info.talking_about_count,
                    added_at,
                ],
            )
        })?;
        Ok(inserted > 0)
    }

    fn remove_targets(&mut self, ids: &[String]) -> StorageResult<u64> {
        self.write(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut removed = 0u64;
            for id in ids {
                removed += tx.execute("DELETE FROM targets WHERE id = ?1", params![id])? as u64;
                tx.execute("DELETE FROM posts WHERE target_id = ?1", params![id])?;
                tx.execute("DELETE FROM comments WHERE target_id = ?1", params![id])?;
                tx.execute("DELETE FROM likes WHERE target_id = ?1", params![id])?;
                tx.execute("DELETE FROM target_fans WHERE target_id = ?1", params![id])?;
                tx.execute(
                    "DELETE FROM target_snapshots WHERE target_id = ?1",
                    params![id],
                )?;
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    fn get_target(&self, id: &str) -> StorageResult<Option<TargetRecord>> {
        let sql = format!("SELECT {} FROM targets WHERE id = ?1", TARGET_COLUMNS);
        let target = self
            .conn
            .query_row(&sql, params![id], target_from_row)
            .optional()?;
        Ok(target)
    }

    fn list_targets(&self) -> StorageResult<Vec<TargetRecord>> {
        let sql = format!(
            "SELECT {} FROM targets ORDER BY added_at, id",
            TARGET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn mark_target_crawled(&mut self, id: &str) -> StorageResult<()> {
        let changed = self.write(|conn| {
            conn.execute(
                "UPDATE targets SET is_fresh = 0 WHERE id = ?1",
                params![id],
            )
        })?;
        if changed == 0 {
            return Err(StorageError::TargetNotFound(id.to_string()));
        }
        Ok(())
    }

    fn record_target_run(&mut self, id: &str, report: &TargetRunReport) -> StorageResult<()> {
        let crawled_at = now();
        let changed = self.write(|conn| {
            conn.execute(
                "UPDATE targets SET last_crawled_at = ?1, last_elapsed_secs = ?2,
                 last_skipped = ?3, last_outcome = ?4 WHERE id = ?5",
                params![
                    crawled_at,
                    report.elapsed_secs,
                    report.skipped,
                    report.outcome,
                    id
                ],
            )
        })?;
        if changed == 0 {
            return Err(StorageError::TargetNotFound(id.to_string()));
        }
        Ok(())
    }

    fn insert_snapshot(&mut self, snapshot: &TargetSnapshot) -> StorageResult<()> {
        let taken_at = now();
        let info = &snapshot.info;
        let post_count = snapshot.post_count as i64;
        let comment_count = snapshot.comment_count as i64;
        self.write(|conn| {
            conn.execute(
                "INSERT INTO target_snapshots
                 (target_id, name, link, category, website, founded, about, likes,
                  talking_about_count, post_count, comment_count, taken_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    info.id,
                    info.name,
                    info.link,
                    info.category,
                    info.website,
                    info.founded,
                    info.about,
                    info.likes,
                    info.talking_about_count,
                    post_count,
                    comment_count,
                    taken_at,
                ],
            )
        })?;
        Ok(())
    }

    fn count_snapshots(&self, target_id: &str) -> StorageResult<u64> {
        count(
            &self.conn,
            "SELECT COUNT(*) FROM target_snapshots WHERE target_id = ?1",
            &[&target_id],
        )
    }

    // ===== Posts and comments =====

    fn upsert_post(&mut self, post: &PostRecord) -> StorageResult<()> {
        let seen_at = now();
        self.write(|conn| {
            conn.execute(
                "INSERT INTO posts
                 (post_id, target_id, from_id, from_name, message, picture, link, name, caption,
                  source, icon, post_type, object_id, description, like_count, comment_count,
                  share_count, created_time, updated_time, first_seen_at, refreshed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?20)
                 ON CONFLICT(post_id) DO UPDATE SET
                     message = excluded.message,
                     like_count = excluded.like_count,
                     comment_count = excluded.comment_count,
                     share_count = excluded.share_count,
                     updated_time = excluded.updated_time,
                     refreshed_at = excluded.refreshed_at",
                params![
                    post.post_id,
                    post.target_id,
                    post.from_id,
                    post.from_name,
                    post.message,
                    post.picture,
                    post.link,
                    post.name,
                    post.caption,
                    post.source,
                    post.icon,
                    post.post_type,
                    post.object_id,
                    post.description,
                    post.like_count,
                    post.comment_count,
                    post.share_count,
                    post.created_time,
                    post.updated_time,
                    seen_at,
                ],
            )
        })?;
        Ok(())
    }

    fn get_post(&self, post_id: &str) -> StorageResult<Option<PostRecord>> {
        let post = self
            .conn
            .query_row(
                "SELECT post_id, target_id, from_id, from_name, message, picture, link, name,
                 caption, source, icon, post_type, object_id, description, like_count,
                 comment_count, share_count, created_time, updated_time
                 FROM posts WHERE post_id = ?1",
                params![post_id],
                |row| {
                    Ok(PostRecord {
                        post_id: row.get(0)?,
                        target_id: row.get(1)?,
                        from_id: row.get(2)?,
                        from_name: row.get(3)?,
                        message: row.get(4)?,
                        picture: row.get(5)?,
                        link: row.get(6)?,
                        name: row.get(7)?,
                        caption: row.get(8)?,
                        source: row.get(9)?,
                        icon: row.get(10)?,
                        post_type: row.get(11)?,
                        object_id: row.get(12)?,
                        description: row.get(13)?,
                        like_count: row.get(14)?,
                        comment_count: row.get(15)?,
                        share_count: row.get(16)?,
                        created_time: row.get(17)?,
                        updated_time: row.get(18)?,
                    })
                },
            )
            .optional()?;
        Ok(post)
    }

    fn count_posts(&self, target_id: Option<&str>) -> StorageResult<u64> {
        match target_id {
            Some(id) => count(
                &self.conn,
                "SELECT COUNT(*) FROM posts WHERE target_id = ?1",
                &[&id],
            ),
            None => count(&self.conn, "SELECT COUNT(*) FROM posts", &[]),
        }
    }

    fn upsert_comment(&mut self, comment: &CommentRecord) -> StorageResult<()> {
        let seen_at = now();
        self.write(|conn| {
            conn.execute(
                "INSERT INTO comments
                 (comment_id, post_id, target_id, from_id, from_name, message, like_count,
                  created_time, post_created_time, first_seen_at, refreshed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(comment_id) DO UPDATE SET
                     like_count = excluded.like_count,
                     refreshed_at = excluded.refreshed_at",
                params![
                    comment.comment_id,
                    comment.post_id,
                    comment.target_id,
                    comment.from_id,
                    comment.from_name,
                    comment.message,
                    comment.like_count,
                    comment.created_time,
                    comment.post_created_time,
                    seen_at,
                ],
            )
        })?;
        Ok(())
    }

    fn get_comment(&self, comment_id: &str) -> StorageResult<Option<CommentRecord>> {
        let comment = self
            .conn
            .query_row(
                "SELECT comment_id, post_id, target_id, from_id, from_name, message, like_count,
                 created_time, post_created_time
                 FROM comments WHERE comment_id = ?1",
                params![comment_id],
                |row| {
                    Ok(CommentRecord {
                        comment_id: row.get(0)?,
                        post_id: row.get(1)?,
                        target_id: row.get(2)?,
                        from_id: row.get(3)?,
                        from_name: row.get(4)?,
                        message: row.get(5)?,
                        like_count: row.get(6)?,
                        created_time: row.get(7)?,
                        post_created_time: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(comment)
    }

    fn count_comments(&self, target_id: Option<&str>) -> StorageResult<u64> {
        match target_id {
            Some(id) => count(
                &self.conn,
                "SELECT COUNT(*) FROM comments WHERE target_id = ?1",
                &[&id],
            ),
            None => count(&self.conn, "SELECT COUNT(*) FROM comments", &[]),
        }
    }

    // ===== Likes and actors =====

    fn insert_likes(&mut self, batch: &LikeBatch<'_>) -> StorageResult<()> {
        if batch.actors.is_empty() {
            return Ok(());
        }

        let recorded_at = now();
        for actors in batch.actors.chunks(rows_per_statement(6)) {
            let sql = format!(
                "INSERT OR IGNORE INTO likes
                 (object_id, actor_id, target_id, actor_name, object_created_time, recorded_at)
                 VALUES {}",
                value_groups(actors.len(), 6)
            );

            self.write(|conn| {
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(actors.len() * 6);
                for actor in actors {
                    values.push(&batch.object_id);
                    values.push(&actor.id);
                    values.push(&batch.target_id);
                    values.push(&actor.name);
                    values.push(&batch.object_created_time);
                    values.push(&recorded_at);
                }
                conn.execute(&sql, values.as_slice())
            })?;
        }
        Ok(())
    }

    fn count_likes(&self, object_id: Option<&str>) -> StorageResult<u64> {
        match object_id {
            Some(id) => count(
                &self.conn,
                "SELECT COUNT(*) FROM likes WHERE object_id = ?1",
                &[&id],
            ),
            None => count(&self.conn, "SELECT COUNT(*) FROM likes", &[]),
        }
    }

    fn insert_actors(&mut self, target_id: &str, actors: &[ActorRef]) -> StorageResult<()> {
        if actors.is_empty() {
            return Ok(());
        }

        let seen_at = now();
        for actors in actors.chunks(rows_per_statement(3)) {
            let fans_sql = format!(
                "INSERT OR IGNORE INTO target_fans (target_id, actor_id, name) VALUES {}",
                value_groups(actors.len(), 3)
            );
            // The latest display name seen wins; identity fields are left alone
            let actors_sql = format!(
                "INSERT INTO actors (id, name, username, gender, refreshed_at) VALUES {}
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                vec!["(?, ?, NULL, NULL, ?)"; actors.len()].join(", ")
            );

            self.write(|conn| {
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(actors.len() * 3);
                for actor in actors {
                    values.push(&target_id);
                    values.push(&actor.id);
                    values.push(&actor.name);
                }
                conn.execute(&fans_sql, values.as_slice())
            })?;

            self.write(|conn| {
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(actors.len() * 3);
                for actor in actors {
                    values.push(&actor.id);
                    values.push(&actor.name);
                    values.push(&seen_at);
                }
                conn.execute(&actors_sql, values.as_slice())
            })?;
        }

        Ok(())
    }

    fn get_actor(&self, id: &str) -> StorageResult<Option<ActorRecord>> {
        let actor = self
            .conn
            .query_row(
                "SELECT id, name, username, gender, refreshed_at FROM actors WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ActorRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        username: row.get(2)?,
                        gender: row.get(3)?,
                        refreshed_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(actor)
    }

    fn unresolved_actor_ids(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM actors WHERE username IS NULL ORDER BY refreshed_at ASC, id ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn apply_identities(
        &mut self,
        batch: &[String],
        identities: &[ActorIdentity],
    ) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let refreshed_at = now();

        // Returned actors without a username are still resolved
        let usernames: Vec<String> = identities
            .iter()
            .map(|identity| identity.username.clone().unwrap_or_default())
            .collect();
        let resolved: Vec<(&ActorIdentity, &String)> = identities.iter().zip(&usernames).collect();

        self.write(|conn| {
            let tx = conn.unchecked_transaction()?;

            for ids in batch.chunks(MAX_VARIABLES - 1) {
                let sql = format!(
                    "UPDATE actors SET refreshed_at = ? WHERE id IN ({})",
                    vec!["?"; ids.len()].join(", ")
                );
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(ids.len() + 1);
                values.push(&refreshed_at);
                for id in ids {
                    values.push(id);
                }
                tx.execute(&sql, values.as_slice())?;
            }

            // Three CASE arms of two parameters each, plus the IN entry
            for chunk in resolved.chunks(rows_per_statement(7)) {
                let whens =
                    |then: &str| vec![format!("WHEN ? THEN {}", then); chunk.len()].join(" ");
                let sql = format!(
                    "UPDATE actors SET
                     name = CASE id {} ELSE name END,
                     username = CASE id {} ELSE username END,
                     gender = CASE id {} ELSE gender END
                     WHERE id IN ({})",
                    whens("COALESCE(?, name)"),
                    whens("?"),
                    whens("COALESCE(?, gender)"),
                    vec!["?"; chunk.len()].join(", ")
                );

                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 7);
                for (identity, _) in chunk {
                    values.push(&identity.id);
                    values.push(&identity.name);
                }
                for (identity, username) in chunk {
                    values.push(&identity.id);
                    values.push(*username);
                }
                for (identity, _) in chunk {
                    values.push(&identity.id);
                    values.push(&identity.gender);
                }
                for (identity, _) in chunk {
                    values.push(&identity.id);
                }
                tx.execute(&sql, values.as_slice())?;
            }

            tx.commit()
        })?;
        Ok(())
    }

    fn count_actors(&self, resolved: Option<bool>) -> StorageResult<u64> {
        let sql = match resolved {
            Some(true) => "SELECT COUNT(*) FROM actors WHERE username IS NOT NULL",
            Some(false) => "SELECT COUNT(*) FROM actors WHERE username IS NULL",
            None => "SELECT COUNT(*) FROM actors",
        };
        count(&self.conn, sql, &[])
    }

    fn count_target_fans(&self, target_id: &str) -> StorageResult<u64> {
        count(
            &self.conn,
            "SELECT COUNT(*) FROM target_fans WHERE target_id = ?1",
            &[&target_id],
        )
    }

    // ===== Passes =====

    fn create_pass(&mut self, config_hash: &str) -> StorageResult<i64> {
        let started_at = now();
        self.write(|conn| {
            conn.execute(
                "INSERT INTO passes (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
                params![started_at, config_hash, PassStatus::Running.to_db_string()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn finish_pass(
        &mut self,
        pass_id: i64,
        status: PassStatus,
        targets_done: u32,
        targets_abandoned: u32,
    ) -> StorageResult<()> {
        let finished_at = now();
        let changed = self.write(|conn| {
            conn.execute(
                "UPDATE passes SET status = ?1, finished_at = ?2, targets_done = ?3,
                 targets_abandoned = ?4 WHERE id = ?5",
                params![
                    status.to_db_string(),
                    finished_at,
                    targets_done,
                    targets_abandoned,
                    pass_id
                ],
            )
        })?;
        if changed == 0 {
            return Err(StorageError::PassNotFound(pass_id));
        }
        Ok(())
    }

    fn get_latest_pass(&self) -> StorageResult<Option<PassRecord>> {
        let pass = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, targets_done,
                 targets_abandoned FROM passes ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(PassRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: PassStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(PassStatus::Failed),
                        targets_done: row.get(5)?,
                        targets_abandoned: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(pass)
    }

    fn count_passes(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM passes", &[])
    }
}
