//! Frame budget tracking
//!
//! A frame is one run of the drain loop. The budget caps how long a frame may
//! keep executing jobs before control goes back to the host.
//!
//! # Target Frame Times
//! - 60 FPS (standard): 16ms per frame
//! - 120 FPS (ProMotion): 8ms per frame
//!
//! Time comes from a [`Clock`], so the budget can be driven by a synthetic
//! [`ManualClock`] in tests and simulations.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Default frame budget for 60 FPS displays (16ms)
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Frame budget for 120 FPS displays (8ms)
pub const FRAME_BUDGET_120FPS: Duration = Duration::from_millis(8);

/// Source of monotonic time
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The process monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Synthetic clock that only moves when told to
///
/// Clones share the same time.
///
/// # Example
///
/// ```
/// use frame_scheduler::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(20));
/// assert_eq!(clock.now() - start, Duration::from_millis(20));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset: Rc::new(Cell::new(Duration::ZERO)) }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }
}

/// Budget tracker for a single frame
///
/// Started when a frame begins; the drain loop asks [`is_exceeded`](Self::is_exceeded)
/// before taking each job.
pub struct FrameBudget {
    clock: Rc<dyn Clock>,

    /// When this frame started
    frame_start: Instant,

    /// Total budget for this frame
    budget: Duration,

    /// Number of budget checks performed
    check_count: Cell<u32>,
}

impl FrameBudget {
    /// Start a frame now
    pub fn start(clock: Rc<dyn Clock>, budget: Duration) -> Self {
        let frame_start = clock.now();
        Self { clock, frame_start, budget, check_count: Cell::new(0) }
    }

    /// Elapsed time since frame start
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.frame_start)
    }

    /// Remaining time in this frame's budget
    ///
    /// Returns `Duration::ZERO` once the budget is used up.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// `true` once elapsed time is strictly past the budget
    ///
    /// A frame that has used exactly its budget may still take one more job.
    pub fn is_exceeded(&self) -> bool {
        self.check_count.set(self.check_count.get() + 1);
        self.elapsed() > self.budget
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of `is_exceeded` checks performed
    pub fn check_count(&self) -> u32 {
        self.check_count.get()
    }
}
