//! Error types for the scheduling engine

use crate::priority::Priority;

/// Contract violations inside the job store.
///
/// None of these are reachable through [`FrameScheduler::schedule`](crate::FrameScheduler::schedule);
/// they surface only when the bucket or heap is used directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("empty structure: nothing to take")]
    Empty,
    #[error("cannot age priority {0}: already at the maximum value")]
    PriorityOverflow(Priority),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("frame budget must be greater than zero")]
    ZeroBudget,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A job that panicked while running.
///
/// Handed to the scheduler's failure handler exactly once per failing job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job at priority {priority} panicked: {message}")]
pub struct JobFailure {
    /// Priority the job was taken from (after any aging)
    pub priority: Priority,
    /// Panic payload rendered as text
    pub message: String,
}
