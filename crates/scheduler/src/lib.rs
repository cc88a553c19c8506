//! Frame Scheduler Library
//!
//! Cooperative, time-boxed job scheduler.
//!
//! Jobs are zero-argument callbacks grouped by integer priority. They run in
//! "frames": each time the host fires the deferral primitive, the scheduler
//! runs as many jobs as fit in the frame budget, highest priority first and
//! FIFO within a priority, then yields. Jobs left over after a frame have
//! their priority raised by one so that nothing starves.
//!
//! # Example
//!
//! ```
//! use frame_scheduler::{FrameScheduler, Priority, ScheduleOptions, TaskQueue};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! // The host event loop: a queue of deferred callbacks
//! let host = TaskQueue::new();
//! let scheduler = FrameScheduler::new(Rc::new(host.clone()));
//!
//! let counter = Rc::new(Cell::new(0));
//! for _ in 0..3 {
//!     let counter = counter.clone();
//!     scheduler.schedule(move || counter.set(counter.get() + 1), ScheduleOptions::default());
//! }
//! scheduler.schedule(|| println!("runs first"), Priority::IMPORTANT);
//!
//! // One frame is pending no matter how many jobs were scheduled
//! assert_eq!(host.pending(), 1);
//! host.run_pending();
//! assert_eq!(counter.get(), 3);
//! ```

mod bucket;
mod config;
pub mod defer;
mod error;
pub mod frame_budget;
pub mod global;
mod heap;
mod priority;
mod scheduler;

// Re-export public API
pub use bucket::{Bucket, Job};
pub use config::{SchedulerConfig, ENV_FRAME_BUDGET_MS};
pub use defer::{Callback, Defer, DeferKind, FrameLoop, HostCapabilities, TaskQueue, Timer};
pub use error::{ConfigError, JobFailure, QueueError};
pub use frame_budget::{Clock, FrameBudget, ManualClock, SystemClock, DEFAULT_FRAME_BUDGET};
pub use heap::PriorityIndexedHeap;
pub use priority::{Priority, ScheduleOptions};
pub use scheduler::{FailureHandler, FrameScheduler, SchedulerBuilder, SchedulerStats};
