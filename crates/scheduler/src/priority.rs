//! Job priority levels
//!
//! Priorities are plain signed integers. Higher numeric values are serviced
//! first. The named levels are conventions only; any integer is accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job priority
///
/// Wraps an `i64` so the aging pass can raise it one step at a time without
/// colliding with caller-visible integer types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub i64);

impl Priority {
    /// Background work that can wait several frames
    pub const LOWER: Priority = Priority(1);

    /// Low priority
    pub const LOW: Priority = Priority(3);

    /// Default priority for [`ScheduleOptions::default`]
    pub const NORMAL: Priority = Priority(5);

    /// High priority
    pub const HIGH: Priority = Priority(7);

    /// Work that must run as soon as possible
    pub const IMPORTANT: Priority = Priority(10);

    /// Create a priority from a raw value
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw integer value
    pub const fn value(self) -> i64 {
        self.0
    }

    /// The next priority up, or `None` at `i64::MAX`
    pub fn raised(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value.into())
    }
}

/// Per-call options for [`FrameScheduler::schedule`](crate::FrameScheduler::schedule)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    pub priority: Priority,
}

impl ScheduleOptions {
    pub fn with_priority(priority: impl Into<Priority>) -> Self {
        Self { priority: priority.into() }
    }
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self { priority: Priority::NORMAL }
    }
}

impl From<Priority> for ScheduleOptions {
    fn from(priority: Priority) -> Self {
        Self { priority }
    }
}
