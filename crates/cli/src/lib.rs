use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frame_scheduler::{
    FrameScheduler, JobFailure, ManualClock, Priority, SchedulerConfig, SchedulerStats, TaskQueue,
};
use serde::Serialize;
use std::cell::RefCell;
use std::ffi::OsString;
use std::path::PathBuf;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "frame-scheduler-cli")]
#[command(about = "Drive simulated workloads through the frame scheduler")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run jobs on a synthetic clock and print the execution report as JSON.
    Simulate {
        /// Job to schedule up front, as LABEL or LABEL:PRIORITY.
        #[arg(long = "job", short = 'j', value_name = "LABEL[:PRIORITY]")]
        jobs: Vec<JobSpec>,
        /// Job scheduled again before each of the first --frames frames.
        #[arg(long, value_name = "LABEL[:PRIORITY]")]
        resubmit: Option<JobSpec>,
        /// Number of frames that get a resubmitted job.
        #[arg(long, default_value_t = 0)]
        frames: u32,
        /// Synthetic time each job takes.
        #[arg(long, default_value_t = 0)]
        job_cost_ms: u64,
        /// Frame budget; overrides the config file.
        #[arg(long)]
        budget_ms: Option<u64>,
        /// JSON scheduler configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Label of a job that panics instead of completing.
        #[arg(long = "panic-on", value_name = "LABEL")]
        panic_on: Vec<String>,
    },
    /// Print CLI version.
    Version,
}

/// A job on the command line: a label and an optional priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub label: String,
    pub priority: Priority,
}

impl FromStr for JobSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, priority) = match s.rsplit_once(':') {
            Some((label, priority)) => (label, parse_priority(priority)?),
            None => (s, Priority::NORMAL),
        };

        if label.is_empty() {
            return Err(format!("missing job label in {s:?}"));
        }

        Ok(Self { label: label.to_owned(), priority })
    }
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    match value.to_ascii_lowercase().as_str() {
        "lower" => Ok(Priority::LOWER),
        "low" => Ok(Priority::LOW),
        "normal" => Ok(Priority::NORMAL),
        "high" => Ok(Priority::HIGH),
        "important" => Ok(Priority::IMPORTANT),
        other => other
            .parse::<i64>()
            .map(Priority::new)
            .map_err(|_| format!("invalid priority {value:?}")),
    }
}

#[derive(Debug, Serialize)]
struct SimulationOutput {
    frames: u64,
    order: Vec<String>,
    failures: Vec<String>,
    elapsed_ms: u64,
    stats: StatsOutput,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    jobs_scheduled: u64,
    jobs_executed: u64,
    jobs_failed: u64,
    frames_run: u64,
    deferrals_requested: u64,
    aging_passes: u64,
}

impl From<SchedulerStats> for StatsOutput {
    fn from(stats: SchedulerStats) -> Self {
        Self {
            jobs_scheduled: stats.jobs_scheduled,
            jobs_executed: stats.jobs_executed,
            jobs_failed: stats.jobs_failed,
            frames_run: stats.frames_run,
            deferrals_requested: stats.deferrals_requested,
            aging_passes: stats.aging_passes,
        }
    }
}

struct SimulationPlan {
    jobs: Vec<JobSpec>,
    resubmit: Option<JobSpec>,
    frames: u32,
    job_cost: Duration,
    panic_on: Vec<String>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Simulate { jobs, resubmit, frames, job_cost_ms, budget_ms, config, panic_on } => {
            let config = load_config(config, budget_ms)?;
            let plan = SimulationPlan {
                jobs,
                resubmit,
                frames,
                job_cost: Duration::from_millis(job_cost_ms),
                panic_on,
            };
            let output = simulate(config, plan);
            let json = serde_json::to_string_pretty(&output)?;
            println!("{json}");
            Ok(())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A second call in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).try_init();
}

fn load_config(path: Option<PathBuf>, budget_ms: Option<u64>) -> Result<SchedulerConfig> {
    let mut config = match path {
        Some(path) => SchedulerConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SchedulerConfig::from_env().context("invalid scheduler environment")?,
    };

    if let Some(ms) = budget_ms {
        config = config.with_frame_budget_ms(ms);
    }
    config.validate().context("invalid scheduler configuration")?;

    Ok(config)
}

fn simulate(config: SchedulerConfig, plan: SimulationPlan) -> SimulationOutput {
    let host = TaskQueue::new();
    let clock = ManualClock::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let failures = Rc::new(RefCell::new(Vec::new()));

    let sink = failures.clone();
    let scheduler = FrameScheduler::builder(Rc::new(host.clone()))
        .config(config)
        .clock(clock.clone())
        .on_failure(move |failure: &JobFailure| {
            tracing::error!(%failure, "simulated job failed");
            sink.borrow_mut().push(failure.message.clone());
        })
        .build();

    let submit = |spec: &JobSpec| {
        let order = order.clone();
        let clock = clock.clone();
        let label = spec.label.clone();
        let panics = plan.panic_on.contains(&spec.label);
        let cost = plan.job_cost;
        scheduler.schedule(
            move || {
                clock.advance(cost);
                if panics {
                    panic!("job {label} failed");
                }
                order.borrow_mut().push(label);
            },
            spec.priority,
        );
    };

    for spec in &plan.jobs {
        submit(spec);
    }

    for _ in 0..plan.frames {
        if let Some(spec) = &plan.resubmit {
            submit(spec);
        }
        host.run_pending();
    }
    host.run_until_idle();

    let stats = scheduler.stats();
    let order = order.borrow().clone();
    let failures = failures.borrow().clone();

    SimulationOutput {
        frames: stats.frames_run,
        order,
        failures,
        elapsed_ms: clock.elapsed().as_millis() as u64,
        stats: stats.into(),
    }
}
