/// Scheduler state definitions
///
/// A scheduler invocation starts Idle, runs passes, optionally sleeps between
/// them in continuous mode, and ends either back in Idle (one-shot) or in
/// Cancelled.
use std::fmt;

/// Represents the current state of a crawl scheduler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// No pass is active
    Idle,

    /// A pass is walking its targets
    Running,

    /// Continuous mode: waiting for the next pass
    Sleeping,

    /// The operator cancelled; no further targets will start
    Cancelled,
}

impl SchedulerState {
    /// Checks whether moving to `next` is a legal transition
    ///
    /// | From | To |
    /// |------|----|
    /// | Idle | Running |
    /// | Running | Idle, Sleeping, Cancelled |
    /// | Sleeping | Running, Cancelled |
    /// | Cancelled | (none) |
    pub fn can_transition_to(&self, next: SchedulerState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Idle)
                | (Self::Running, Self::Sleeping)
                | (Self::Running, Self::Cancelled)
                | (Self::Sleeping, Self::Running)
                | (Self::Sleeping, Self::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Sleeping => "sleeping",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
