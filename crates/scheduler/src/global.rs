//! Per-thread default scheduler
//!
//! For callers that do not want to thread a [`FrameScheduler`] handle around.
//! Each thread lazily gets its own scheduler bound to its own [`TaskQueue`];
//! the host event loop pumps it with [`run_pending`] or [`run_until_idle`].
//! The budget comes from [`SchedulerConfig::from_env`], falling back to the
//! defaults when the environment holds an invalid value.

use crate::config::SchedulerConfig;
use crate::defer::TaskQueue;
use crate::priority::ScheduleOptions;
use crate::scheduler::FrameScheduler;
use std::rc::Rc;

struct DefaultInstance {
    host: TaskQueue,
    scheduler: FrameScheduler,
}

impl DefaultInstance {
    fn new() -> Self {
        let config = SchedulerConfig::from_env().unwrap_or_else(|err| {
            tracing::warn!(%err, "ignoring scheduler environment configuration");
            SchedulerConfig::default()
        });
        let host = TaskQueue::new();
        let scheduler = FrameScheduler::builder(Rc::new(host.clone())).config(config).build();
        Self { host, scheduler }
    }
}

thread_local! {
    static DEFAULT: DefaultInstance = DefaultInstance::new();
}

/// Schedule `job` on this thread's default scheduler
pub fn schedule<F>(job: F, options: impl Into<ScheduleOptions>)
where
    F: FnOnce() + 'static,
{
    let options = options.into();
    DEFAULT.with(|instance| instance.scheduler.schedule(job, options));
}

/// Handle to this thread's default scheduler
pub fn default_scheduler() -> FrameScheduler {
    DEFAULT.with(|instance| instance.scheduler.clone())
}

/// Run the frames that were pending before this call. Returns how many ran.
pub fn run_pending() -> usize {
    let host = DEFAULT.with(|instance| instance.host.clone());
    host.run_pending()
}

/// Run frames until this thread's default scheduler is idle. Returns how many ran.
pub fn run_until_idle() -> usize {
    let host = DEFAULT.with(|instance| instance.host.clone());
    host.run_until_idle()
}
