//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{PassRecord, Storage};
use crate::Result;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Registered targets
    pub total_targets: u64,

    /// Targets that have never completed a full pass
    pub fresh_targets: u64,

    pub total_posts: u64,
    pub total_comments: u64,
    pub total_likes: u64,

    /// Actor directory size
    pub total_actors: u64,

    /// Actors still waiting for identity refresh
    pub unresolved_actors: u64,

    pub total_passes: u64,

    /// Most recent crawl pass
    pub latest_pass: Option<PassRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlerError)` - Failed to query statistics
pub fn load_statistics<S: Storage>(storage: &S) -> Result<CrawlStatistics> {
    let targets = storage.list_targets()?;
    let fresh_targets = targets.iter().filter(|t| t.is_fresh).count() as u64;

    Ok(CrawlStatistics {
        total_targets: targets.len() as u64,
        fresh_targets,
        total_posts: storage.count_posts(None)?,
        total_comments: storage.count_comments(None)?,
        total_likes: storage.count_likes(None)?,
        total_actors: storage.count_actors(None)?,
        unresolved_actors: storage.count_actors(Some(false))?,
        total_passes: storage.count_passes()?,
        latest_pass: storage.get_latest_pass()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Targets:");
    println!("  Registered: {}", stats.total_targets);
    println!("  Fresh (never fully crawled): {}", stats.fresh_targets);
    println!(
        "  Crawled: {}",
        stats.total_targets.saturating_sub(stats.fresh_targets)
    );
    println!();

    println!("Content:");
    println!("  Posts: {}", stats.total_posts);
    println!("  Comments: {}", stats.total_comments);
    println!("  Likes: {}", stats.total_likes);
    println!();

    let resolved = stats.total_actors.saturating_sub(stats.unresolved_actors);
    let resolved_rate = if stats.total_actors > 0 {
        (resolved as f64 / stats.total_actors as f64) * 100.0
    } else {
        0.0
    };
    println!("Actors:");
    println!("  Total: {}", stats.total_actors);
    println!("  Resolved: {} ({:.1}%)", resolved, resolved_rate);
    println!("  Unresolved: {}", stats.unresolved_actors);
    println!();

    println!("Passes: {}", stats.total_passes);
    if let Some(pass) = &stats.latest_pass {
        println!("Latest pass #{}:", pass.id);
        println!("  Status: {}", pass.status.to_db_string());
        println!("  Started: {}", pass.started_at);
        if let Some(finished) = &pass.finished_at {
            println!("  Finished: {}", finished);
        }
        println!(
            "  Targets: {} done, {} abandoned",
            pass.targets_done, pass.targets_abandoned
        );
    }
}
