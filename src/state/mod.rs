//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SchedulerState`: lifecycle of one crawl scheduler invocation
//!   (idle, running, sleeping between passes, cancelled)

mod scheduler_state;

pub use scheduler_state::SchedulerState;
