//! Output module for crawl statistics
//!
//! This module handles loading and printing database-wide crawl statistics.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
