//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl targets (pages and groups)
CREATE TABLE IF NOT EXISTS targets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    link TEXT,
    category TEXT,
    website TEXT,
    founded TEXT,
    about TEXT,
    likes INTEGER NOT NULL DEFAULT 0,
    talking_about_count INTEGER NOT NULL DEFAULT 0,
    is_fresh INTEGER NOT NULL DEFAULT 1,
    added_at TEXT NOT NULL,
    last_crawled_at TEXT,
    last_elapsed_secs REAL,
    last_skipped INTEGER NOT NULL DEFAULT 0,
    last_outcome TEXT
);

-- Point-in-time target info with persisted volume
CREATE TABLE IF NOT EXISTS target_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id TEXT NOT NULL,
    name TEXT NOT NULL,
    link TEXT,
    category TEXT,
    website TEXT,
    founded TEXT,
    about TEXT,
    likes INTEGER NOT NULL DEFAULT 0,
    talking_about_count INTEGER NOT NULL DEFAULT 0,
    post_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    taken_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_target_snapshots_target ON target_snapshots(target_id);

-- Posts, unique on provider post ID
CREATE TABLE IF NOT EXISTS posts (
    post_id TEXT PRIMARY KEY,
    target_id TEXT NOT NULL,
    from_id TEXT,
    from_name TEXT,
    message TEXT,
    picture TEXT,
    link TEXT,
    name TEXT,
    caption TEXT,
    source TEXT,
    icon TEXT,
    post_type TEXT,
    object_id TEXT,
    description TEXT,
    like_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    share_count INTEGER NOT NULL DEFAULT 0,
    created_time TEXT,
    updated_time TEXT,
    first_seen_at TEXT NOT NULL,
    refreshed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_target ON posts(target_id);

-- Comments, unique on provider comment ID
CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    from_id TEXT NOT NULL,
    from_name TEXT NOT NULL,
    message TEXT,
    like_count INTEGER NOT NULL DEFAULT 0,
    created_time TEXT,
    post_created_time TEXT,
    first_seen_at TEXT NOT NULL,
    refreshed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_target ON comments(target_id);
CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

-- Likes of posts and comments
CREATE TABLE IF NOT EXISTS likes (
    object_id TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    actor_name TEXT NOT NULL,
    object_created_time TEXT,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (object_id, actor_id)
);

CREATE INDEX IF NOT EXISTS idx_likes_target ON likes(target_id);

-- Global actor directory
CREATE TABLE IF NOT EXISTS actors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    username TEXT,
    gender TEXT,
    refreshed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_actors_refreshed ON actors(refreshed_at);

-- Actors seen on a target
CREATE TABLE IF NOT EXISTS target_fans (
    target_id TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (target_id, actor_id)
);

-- Crawl passes
CREATE TABLE IF NOT EXISTS passes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    targets_done INTEGER NOT NULL DEFAULT 0,
    targets_abandoned INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
