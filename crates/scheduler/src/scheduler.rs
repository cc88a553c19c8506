//! Frame scheduler
//!
//! Owns the priority-indexed job store and drives the drain loop through the
//! injected deferral primitive:
//!
//! 1. `schedule` appends the job to the bucket for its priority and makes sure
//!    exactly one drain is pending with the host.
//! 2. When the host fires the drain, jobs run highest priority first until the
//!    store is empty or the frame budget is spent.
//! 3. Anything left over is aged by one priority step and another drain is
//!    requested.

use crate::bucket::{Bucket, Job};
use crate::config::SchedulerConfig;
use crate::defer::Defer;
use crate::error::{JobFailure, QueueError};
use crate::frame_budget::{Clock, FrameBudget, SystemClock};
use crate::heap::PriorityIndexedHeap;
use crate::priority::{Priority, ScheduleOptions};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

/// Called once for every job that panics
pub type FailureHandler = Rc<dyn Fn(&JobFailure)>;

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total jobs accepted by `schedule`
    pub jobs_scheduled: u64,

    /// Jobs taken from the store and run, including ones that panicked
    pub jobs_executed: u64,

    /// Jobs that panicked
    pub jobs_failed: u64,

    /// Drain routines run by the host
    pub frames_run: u64,

    /// Times the deferral primitive was invoked
    pub deferrals_requested: u64,

    /// Frames that ended with work left over and aged it
    pub aging_passes: u64,

    /// Jobs currently waiting
    pub queued_jobs: usize,
}

struct State {
    jobs: PriorityIndexedHeap<Bucket>,
    drain_pending: bool,
    queued: usize,
    stats: SchedulerStats,
}

impl State {
    fn enqueue(&mut self, priority: Priority, job: Job) {
        match self.jobs.get_mut(priority) {
            Some(bucket) => bucket.push(job),
            None => {
                let mut bucket = Bucket::new();
                bucket.push(job);
                self.jobs.add(priority, bucket);
            }
        }
        self.queued += 1;
        self.stats.jobs_scheduled += 1;
    }

    /// Front job of the highest-priority bucket. A bucket emptied by this
    /// call leaves the heap before the job runs.
    fn take_next(&mut self) -> Result<(Priority, Job), QueueError> {
        let priority = self.jobs.peek_priority().ok_or(QueueError::Empty)?;
        let bucket = self.jobs.peek_mut()?;
        let job = bucket.pop_front()?;
        if bucket.is_empty() {
            self.jobs.poll()?;
        }
        self.queued -= 1;
        self.stats.jobs_executed += 1;
        Ok((priority, job))
    }
}

struct Shared {
    config: SchedulerConfig,
    defer: Rc<dyn Defer>,
    clock: Rc<dyn Clock>,
    on_failure: FailureHandler,
    state: RefCell<State>,
}

/// Cooperative, frame-budgeted job scheduler
///
/// A cheap handle: clones drive the same job store, so jobs can capture a
/// clone and schedule follow-up work. The handle is `!Send`; everything runs
/// on the thread that owns the deferral primitive.
///
/// # Example
///
/// ```
/// use frame_scheduler::{FrameScheduler, Priority, ScheduleOptions, TaskQueue};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let host = TaskQueue::new();
/// let scheduler = FrameScheduler::new(Rc::new(host.clone()));
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// let log = order.clone();
/// scheduler.schedule(move || log.borrow_mut().push("later"), Priority::LOW);
/// let log = order.clone();
/// scheduler.schedule(move || log.borrow_mut().push("sooner"), ScheduleOptions::default());
///
/// host.run_pending();
/// assert_eq!(*order.borrow(), vec!["sooner", "later"]);
/// ```
#[derive(Clone)]
pub struct FrameScheduler {
    shared: Rc<Shared>,
}

impl FrameScheduler {
    /// Scheduler with the default configuration on the system clock
    pub fn new(defer: Rc<dyn Defer>) -> Self {
        Self::builder(defer).build()
    }

    pub fn builder(defer: Rc<dyn Defer>) -> SchedulerBuilder {
        SchedulerBuilder::new(defer)
    }

    /// Queue `job` and make sure a frame is pending.
    ///
    /// Jobs with the same priority run in the order they were scheduled.
    /// Never fails; any priority value is accepted.
    pub fn schedule<F>(&self, job: F, options: impl Into<ScheduleOptions>)
    where
        F: FnOnce() + 'static,
    {
        let ScheduleOptions { priority } = options.into();
        self.shared.state.borrow_mut().enqueue(priority, Box::new(job));
        request_drain(&self.shared);
    }

    /// Jobs waiting to run
    pub fn pending_jobs(&self) -> usize {
        self.shared.state.borrow().queued
    }

    /// A drain has been handed to the host and has not finished yet
    pub fn is_drain_pending(&self) -> bool {
        self.shared.state.borrow().drain_pending
    }

    /// Nothing queued and nothing pending
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.borrow();
        !state.drain_pending && state.queued == 0
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.borrow();
        let mut stats = state.stats.clone();
        stats.queued_jobs = state.queued;
        stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("FrameScheduler")
            .field("config", &self.shared.config)
            .field("queued", &state.queued)
            .field("drain_pending", &state.drain_pending)
            .finish()
    }
}

fn request_drain(shared: &Rc<Shared>) {
    {
        let mut state = shared.state.borrow_mut();
        if state.drain_pending {
            return;
        }
        state.drain_pending = true;
        state.stats.deferrals_requested += 1;
    }

    // The borrow is released first: a host may run the callback right away.
    let handle = Rc::clone(shared);
    shared.defer.defer(Box::new(move || run_frame(&handle)));
}

fn run_frame(shared: &Rc<Shared>) {
    let budget = FrameBudget::start(Rc::clone(&shared.clock), shared.config.frame_budget);
    let mut executed = 0usize;

    loop {
        let next = {
            let mut state = shared.state.borrow_mut();
            if state.jobs.is_empty() || budget.is_exceeded() {
                break;
            }
            state.take_next()
        };

        let (priority, job) = match next {
            Ok(next) => next,
            Err(err) => {
                tracing::error!(%err, "job store out of sync, ending frame");
                break;
            }
        };

        executed += 1;
        tracing::trace!(%priority, "running job");

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            shared.state.borrow_mut().stats.jobs_failed += 1;
            let failure = JobFailure { priority, message: panic_message(payload.as_ref()) };
            report_failure(shared, &failure);
        }
    }

    let remaining = {
        let mut state = shared.state.borrow_mut();
        state.drain_pending = false;
        state.stats.frames_run += 1;

        if !state.jobs.is_empty() {
            match state.jobs.rising() {
                Ok(()) => state.stats.aging_passes += 1,
                Err(err) => tracing::warn!(%err, "skipping aging pass"),
            }
        }
        state.queued
    };

    tracing::debug!(executed, remaining, elapsed = ?budget.elapsed(), "frame finished");

    if remaining > 0 {
        request_drain(shared);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Hand `failure` to the handler. A panicking handler is logged and the
/// frame carries on.
fn report_failure(shared: &Shared, failure: &JobFailure) {
    let handler = AssertUnwindSafe(|| (shared.on_failure)(failure));
    if let Err(payload) = panic::catch_unwind(handler) {
        tracing::error!(
            %failure,
            handler_panic = %panic_message(payload.as_ref()),
            "failure handler panicked"
        );
    }
}

fn log_failure(failure: &JobFailure) {
    tracing::error!(priority = %failure.priority, message = %failure.message, "scheduled job panicked");
}

/// Builder for [`FrameScheduler`]
pub struct SchedulerBuilder {
    defer: Rc<dyn Defer>,
    config: SchedulerConfig,
    clock: Rc<dyn Clock>,
    on_failure: FailureHandler,
}

impl SchedulerBuilder {
    pub fn new(defer: Rc<dyn Defer>) -> Self {
        Self {
            defer,
            config: SchedulerConfig::default(),
            clock: Rc::new(SystemClock),
            on_failure: Rc::new(log_failure),
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn frame_budget(mut self, budget: Duration) -> Self {
        self.config.frame_budget = budget;
        self
    }

    /// Time source for the frame budget
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Rc::new(clock);
        self
    }

    /// Replace the default handler, which logs at error level.
    ///
    /// The handler sees each panicking job exactly once. The process panic
    /// hook still runs first, so with the standard hook every job panic is
    /// also printed to stderr; install a quiet hook to suppress that.
    pub fn on_failure(mut self, handler: impl Fn(&JobFailure) + 'static) -> Self {
        self.on_failure = Rc::new(handler);
        self
    }

    pub fn build(self) -> FrameScheduler {
        FrameScheduler {
            shared: Rc::new(Shared {
                config: self.config,
                defer: self.defer,
                clock: self.clock,
                on_failure: self.on_failure,
                state: RefCell::new(State {
                    jobs: PriorityIndexedHeap::new(),
                    drain_pending: false,
                    queued: 0,
                    stats: SchedulerStats::default(),
                }),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defer::{Callback, TaskQueue};
    use crate::frame_budget::ManualClock;
    use std::cell::Cell;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn setup() -> (TaskQueue, ManualClock, FrameScheduler) {
        let host = TaskQueue::new();
        let clock = ManualClock::new();
        let scheduler =
            FrameScheduler::builder(Rc::new(host.clone())).clock(clock.clone()).build();
        (host, clock, scheduler)
    }

    #[test]
    fn test_scheduler_basic() {
        let (host, _clock, scheduler) = setup();
        assert!(scheduler.is_idle());

        let counter = Rc::new(Cell::new(0));
        let c = counter.clone();
        scheduler.schedule(move || c.set(c.get() + 1), ScheduleOptions::default());

        assert_eq!(scheduler.pending_jobs(), 1);
        assert!(scheduler.is_drain_pending());
        assert!(!scheduler.is_idle());
        assert_eq!(counter.get(), 0);

        host.run_pending();

        assert_eq!(counter.get(), 1);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_single_deferral_outstanding() {
        let (host, _clock, scheduler) = setup();
        for _ in 0..3 {
            scheduler.schedule(|| {}, ScheduleOptions::default());
        }

        assert_eq!(host.pending(), 1);
        assert_eq!(scheduler.stats().deferrals_requested, 1);
    }

    #[test]
    fn test_priority_ordering_within_frame() {
        let (host, _clock, scheduler) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (name, priority) in [("low", 3), ("important", 10), ("lower", 1), ("high", 7)] {
            let order = order.clone();
            scheduler.schedule(move || order.borrow_mut().push(name), Priority(priority));
        }

        host.run_pending();
        assert_eq!(*order.borrow(), vec!["important", "high", "low", "lower"]);
    }

    #[test]
    fn test_budget_splits_work_across_frames() {
        let (host, clock, scheduler) = setup();
        let counter = Rc::new(Cell::new(0));

        for _ in 0..4 {
            let counter = counter.clone();
            let clock = clock.clone();
            scheduler.schedule(
                move || {
                    counter.set(counter.get() + 1);
                    clock.advance(Duration::from_millis(10));
                },
                ScheduleOptions::default(),
            );
        }

        // 0ms and 10ms are within the 16ms budget, 20ms is not.
        host.run_pending();
        assert_eq!(counter.get(), 2);
        assert_eq!(scheduler.pending_jobs(), 2);
        assert!(scheduler.is_drain_pending());

        host.run_pending();
        assert_eq!(counter.get(), 4);
        assert!(scheduler.is_idle());

        let stats = scheduler.stats();
        assert_eq!(stats.frames_run, 2);
        assert_eq!(stats.deferrals_requested, 2);
        assert_eq!(stats.aging_passes, 1);
    }

    #[test]
    fn test_leftover_jobs_are_aged() {
        let (host, clock, scheduler) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        let c = clock.clone();
        scheduler.schedule(
            move || {
                o.borrow_mut().push("first");
                c.advance(Duration::from_millis(17));
            },
            Priority(5),
        );
        let o = order.clone();
        scheduler.schedule(move || o.borrow_mut().push("waiting"), Priority(4));

        host.run_pending();
        assert_eq!(*order.borrow(), vec!["first"]);

        // Aged from 4 to 5, so a fresh priority-5 job lands in the same bucket behind it.
        let o = order.clone();
        scheduler.schedule(move || o.borrow_mut().push("newcomer"), Priority(5));
        host.run_pending();
        assert_eq!(*order.borrow(), vec!["first", "waiting", "newcomer"]);
    }

    #[test]
    fn test_panicking_job_reported_once_and_frame_continues() {
        let host = TaskQueue::new();
        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = failures.clone();
        let scheduler = FrameScheduler::builder(Rc::new(host.clone()))
            .clock(ManualClock::new())
            .on_failure(move |failure| sink.borrow_mut().push(failure.clone()))
            .build();

        let result = Rc::new(Cell::new(0));
        let r = result.clone();
        scheduler.schedule(move || r.set(r.get() + 2), ScheduleOptions::default());
        scheduler.schedule(|| panic!("boom"), ScheduleOptions::default());
        let r = result.clone();
        scheduler.schedule(move || r.set(r.get() + 3), ScheduleOptions::default());

        host.run_until_idle();

        assert_eq!(result.get(), 5);
        assert_eq!(host.deferrals(), 1);
        let failures = failures.borrow();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].message, "boom");
        assert_eq!(failures[0].priority, Priority::NORMAL);
        assert_eq!(scheduler.stats().jobs_failed, 1);
        assert_eq!(scheduler.stats().jobs_executed, 3);
    }

    #[test]
    fn test_panicking_failure_handler_does_not_stall_scheduler() {
        let host = TaskQueue::new();
        let scheduler = FrameScheduler::builder(Rc::new(host.clone()))
            .clock(ManualClock::new())
            .on_failure(|_| panic!("handler broke"))
            .build();

        let ran = Rc::new(Cell::new(0));
        scheduler.schedule(|| panic!("job broke"), Priority::HIGH);
        let r = ran.clone();
        scheduler.schedule(move || r.set(r.get() + 1), Priority::LOW);
        host.run_until_idle();

        assert_eq!(ran.get(), 1);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.stats().jobs_failed, 1);

        let r = ran.clone();
        scheduler.schedule(move || r.set(r.get() + 1), ScheduleOptions::default());
        assert!(scheduler.is_drain_pending());
        assert_eq!(host.pending(), 1);

        host.run_until_idle();
        assert_eq!(ran.get(), 2);
        assert!(scheduler.is_idle());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_default_handler_logs_each_failure_once() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (host, _clock, scheduler) = setup();
            scheduler.schedule(|| panic!("first failure"), Priority::HIGH);
            scheduler.schedule(|| {}, ScheduleOptions::default());
            scheduler.schedule(|| panic!("second failure"), Priority::LOW);
            host.run_until_idle();
            assert_eq!(scheduler.stats().jobs_failed, 2);
        });

        let logs = buffer.contents();
        assert_eq!(logs.matches("scheduled job panicked").count(), 2);
        assert_eq!(logs.matches("first failure").count(), 1);
        assert_eq!(logs.matches("second failure").count(), 1);
    }

    #[test]
    fn test_job_can_schedule_more_work() {
        let (host, _clock, scheduler) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));

        let inner = scheduler.clone();
        let o = order.clone();
        scheduler.schedule(
            move || {
                o.borrow_mut().push("parent");
                let o = o.clone();
                inner.schedule(move || o.borrow_mut().push("child"), Priority::NORMAL);
            },
            Priority::NORMAL,
        );
        let o = order.clone();
        scheduler.schedule(move || o.borrow_mut().push("sibling"), Priority::LOW);

        host.run_pending();

        assert_eq!(*order.borrow(), vec!["parent", "child", "sibling"]);
        assert_eq!(host.deferrals(), 1);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_synchronous_host() {
        let ran = Rc::new(Cell::new(false));
        let immediate = |callback: Callback| callback();
        let scheduler = FrameScheduler::new(Rc::new(immediate));

        let r = ran.clone();
        scheduler.schedule(move || r.set(true), ScheduleOptions::default());

        assert!(ran.get());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_rescheduling_after_idle() {
        let (host, _clock, scheduler) = setup();

        scheduler.schedule(|| {}, ScheduleOptions::default());
        host.run_pending();
        assert!(scheduler.is_idle());

        scheduler.schedule(|| {}, ScheduleOptions::default());
        assert_eq!(host.pending(), 1);
        host.run_pending();

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_scheduled, 2);
        assert_eq!(stats.frames_run, 2);
        assert_eq!(stats.deferrals_requested, 2);
        assert_eq!(stats.queued_jobs, 0);
    }

    #[test]
    fn test_builder_config() {
        let scheduler = FrameScheduler::builder(Rc::new(TaskQueue::new()))
            .frame_budget(Duration::from_millis(8))
            .build();
        assert_eq!(scheduler.config().frame_budget, Duration::from_millis(8));

        let scheduler = FrameScheduler::builder(Rc::new(TaskQueue::new()))
            .config(SchedulerConfig::default().with_frame_budget_ms(33))
            .build();
        assert_eq!(scheduler.config().frame_budget, Duration::from_millis(33));
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "non-string panic payload");
    }
}
