//! Deferral primitives
//!
//! The scheduler never decides when a frame runs. It hands its drain routine
//! to a [`Defer`] strategy and the host calls it back later. This module holds
//! the strategy trait, three host adapters, and the capability probe that
//! picks one of them.
//!
//! - [`FrameLoop`]: animation-frame style, one batch of callbacks per paced frame
//! - [`TaskQueue`]: next-tick / macrotask style, pumped by the host event loop
//! - [`Timer`]: delayed callbacks, the fallback when nothing better exists

use crate::frame_budget::{Clock, DEFAULT_FRAME_BUDGET};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Callback handed to a deferral primitive
pub type Callback = Box<dyn FnOnce()>;

/// Host primitive that runs a callback at some later point
pub trait Defer {
    fn defer(&self, callback: Callback);
}

impl<F> Defer for F
where
    F: Fn(Callback),
{
    fn defer(&self, callback: Callback) {
        self(callback)
    }
}

/// FIFO queue of deferred callbacks (next-tick / macrotask semantics)
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Callback>>>,
    deferrals: Rc<Cell<u64>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the callbacks that were queued before this call.
    ///
    /// Callbacks queued while these run wait for the next call. Returns the
    /// number of callbacks run.
    pub fn run_pending(&self) -> usize {
        let count = self.tasks.borrow().len();
        for _ in 0..count {
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => return count,
            }
        }
        count
    }

    /// Keep running until the queue is empty. Returns the number of callbacks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Callbacks waiting to run
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Total number of callbacks ever deferred onto this queue
    pub fn deferrals(&self) -> u64 {
        self.deferrals.get()
    }
}

impl Defer for TaskQueue {
    fn defer(&self, callback: Callback) {
        self.deferrals.set(self.deferrals.get() + 1);
        self.tasks.borrow_mut().push_back(callback);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .field("deferrals", &self.deferrals())
            .finish()
    }
}

/// Animation-frame style host loop
///
/// Callbacks requested during one frame run on the next. [`run_frame`](Self::run_frame)
/// sleeps until the next frame boundary before running them, so a host that
/// calls it in a loop gets a steady frame rate.
#[derive(Clone)]
pub struct FrameLoop {
    queue: TaskQueue,
    interval: Duration,
    next_frame: Rc<Cell<Option<Instant>>>,
}

impl FrameLoop {
    /// Frame loop paced at `interval`
    pub fn new(interval: Duration) -> Self {
        Self { queue: TaskQueue::new(), interval, next_frame: Rc::new(Cell::new(None)) }
    }

    /// Frame loop paced at 60 FPS
    pub fn for_60fps() -> Self {
        Self::new(DEFAULT_FRAME_BUDGET)
    }

    /// Wait for the next frame boundary, then run every callback requested
    /// before it. Returns the number of callbacks run.
    pub fn run_frame(&self) -> usize {
        if let Some(deadline) = self.next_frame.get() {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        self.next_frame.set(Some(Instant::now() + self.interval));
        self.queue.run_pending()
    }

    /// Run frames until no callbacks are waiting. Returns the number of frames.
    pub fn run_until_idle(&self) -> usize {
        let mut frames = 0;
        while self.queue.pending() > 0 {
            self.run_frame();
            frames += 1;
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Defer for FrameLoop {
    fn defer(&self, callback: Callback) {
        self.queue.defer(callback);
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("interval", &self.interval)
            .field("pending", &self.pending())
            .finish()
    }
}

struct TimerEntry {
    due: Instant,
    seq: u64,
    callback: Callback,
}

/// Delayed-callback timer
///
/// Every deferred callback becomes due `delay` after it was requested, as
/// measured by the timer's clock. Callbacks with the same due time run in
/// request order.
#[derive(Clone)]
pub struct Timer {
    clock: Rc<dyn Clock>,
    delay: Duration,
    entries: Rc<RefCell<Vec<TimerEntry>>>,
    next_seq: Rc<Cell<u64>>,
}

impl Timer {
    pub fn new(clock: Rc<dyn Clock>, delay: Duration) -> Self {
        Self {
            clock,
            delay,
            entries: Rc::new(RefCell::new(Vec::new())),
            next_seq: Rc::new(Cell::new(0)),
        }
    }

    /// Zero-delay timer
    pub fn immediate(clock: Rc<dyn Clock>) -> Self {
        Self::new(clock, Duration::ZERO)
    }

    /// Run every callback that is due now. Callbacks that become due while
    /// these run wait for the next call. Returns the number run.
    pub fn run_expired(&self) -> usize {
        let now = self.clock.now();
        let mut due: Vec<TimerEntry> = {
            let mut entries = self.entries.borrow_mut();
            let (ready, waiting): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|entry| entry.due <= now);
            *entries = waiting;
            ready
        };
        due.sort_by_key(|entry| (entry.due, entry.seq));

        let count = due.len();
        for entry in due {
            (entry.callback)();
        }
        count
    }

    /// Earliest due time among waiting callbacks
    pub fn next_due(&self) -> Option<Instant> {
        self.entries.borrow().iter().map(|entry| entry.due).min()
    }

    pub fn pending(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl Defer for Timer {
    fn defer(&self, callback: Callback) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.clock.now() + self.delay;
        self.entries.borrow_mut().push(TimerEntry { due, seq, callback });
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("delay", &self.delay).field("pending", &self.pending()).finish()
    }
}

/// Which primitive the capability probe chose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferKind {
    AnimationFrame,
    Macrotask,
    Timer,
}

/// Deferral primitives the host offers
///
/// The timer is mandatory; the other two are optional.
pub struct HostCapabilities {
    pub animation_frame: Option<Rc<dyn Defer>>,
    pub macrotask: Option<Rc<dyn Defer>>,
    pub timer: Rc<dyn Defer>,
}

impl HostCapabilities {
    /// Host that only offers a timer
    pub fn timer_only(timer: Rc<dyn Defer>) -> Self {
        Self { animation_frame: None, macrotask: None, timer }
    }

    pub fn with_animation_frame(mut self, primitive: Rc<dyn Defer>) -> Self {
        self.animation_frame = Some(primitive);
        self
    }

    pub fn with_macrotask(mut self, primitive: Rc<dyn Defer>) -> Self {
        self.macrotask = Some(primitive);
        self
    }

    /// Pick the preferred primitive: animation frame, then macrotask, then timer.
    pub fn select(self) -> (DeferKind, Rc<dyn Defer>) {
        let (kind, primitive) = if let Some(primitive) = self.animation_frame {
            (DeferKind::AnimationFrame, primitive)
        } else if let Some(primitive) = self.macrotask {
            (DeferKind::Macrotask, primitive)
        } else {
            (DeferKind::Timer, self.timer)
        };
        tracing::debug!(?kind, "selected deferral primitive");
        (kind, primitive)
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("animation_frame", &self.animation_frame.is_some())
            .field("macrotask", &self.macrotask.is_some())
            .finish()
    }
}
