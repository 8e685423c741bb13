//! scheduler-worker: standalone process hosting a cadence scheduler.
//!
//! Registers a small set of housekeeping tasks:
//! - `warmup`: one-shot, runs immediately
//! - `heartbeat`: interval task logging liveness, gated on `warmup`
//! - `report`: cron task logging lifecycle counters as JSON, gated on `warmup`
//!
//! Runs until Ctrl-C, then stops dispatching and waits for in-flight work.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use cadence_core::config::load_dotenv;
use cadence_core::Config;
use cadence_scheduler::{
    ExecutionError, Priority, Schedule, Scheduler, SchedulerConfig, SchedulerListener, TaskContext,
    TaskId, TaskSpec,
};

/// Every five minutes, UTC.
const REPORT_CRON: &str = "*/5 * * * *";

// ── CLI ─────────────────────────────────────────────────────────────

/// Cadence scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "scheduler-worker", version, about)]
struct Cli {
    /// Path to a cadence TOML config file. Environment config is used when unset.
    #[arg(long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Heartbeat interval in seconds.
    #[arg(long, env = "CADENCE_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "CADENCE_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── Lifecycle counters ──────────────────────────────────────────────

/// Listener counting lifecycle events. Only touches atomics, so it is safe
/// to call from inside the scheduler's critical section.
#[derive(Default)]
struct EventCounter {
    scheduled: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Serialize)]
struct EventReport {
    at: DateTime<Utc>,
    scheduled: u64,
    started: u64,
    completed: u64,
    retried: u64,
    failed: u64,
    cancelled: u64,
}

impl EventCounter {
    fn report(&self) -> EventReport {
        EventReport {
            at: Utc::now(),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl SchedulerListener for EventCounter {
    fn on_scheduled(&self, _id: TaskId, _at: DateTime<Utc>) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    fn on_started(&self, _id: TaskId, _attempt: u32) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn on_completed(&self, _id: TaskId, _recurring: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_failed(&self, _id: TaskId, _error: &ExecutionError, retry_at: Option<DateTime<Utc>>) {
        match retry_at {
            Some(_) => self.retried.fetch_add(1, Ordering::Relaxed),
            None => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn on_cancelled(&self, _id: TaskId) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Tasks ───────────────────────────────────────────────────────────

fn register_tasks(
    scheduler: &Scheduler,
    counter: &Arc<EventCounter>,
    heartbeat: Duration,
) -> anyhow::Result<()> {
    let warmup = scheduler.schedule(
        TaskSpec::new("warmup", |ctx: &TaskContext| -> anyhow::Result<()> {
            info!(task_id = %ctx.task_id, "warm-up complete");
            Ok(())
        })
        .priority(Priority::Critical),
    )?;

    scheduler.schedule(
        TaskSpec::new("heartbeat", |ctx: &TaskContext| -> anyhow::Result<()> {
            info!(scheduled_for = %ctx.scheduled_for, "heartbeat");
            Ok(())
        })
        .schedule(Schedule::every(heartbeat))
        .priority(Priority::High)
        .depends_on([warmup]),
    )?;

    let counter = Arc::clone(counter);
    scheduler.schedule(
        TaskSpec::new("report", move |_: &TaskContext| -> anyhow::Result<()> {
            let report = serde_json::to_string(&counter.report())?;
            info!(report = %report, "lifecycle report");
            Ok(())
        })
        .schedule(Schedule::cron(REPORT_CRON, "UTC")?)
        .priority(Priority::Low)
        .depends_on([warmup]),
    )?;

    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> (Config, Option<String>) {
    let Some(path) = &cli.config else {
        return (Config::from_env(), None);
    };
    match Config::from_file(path) {
        Ok(config) => (config, None),
        Err(e) => (
            Config::from_env(),
            Some(format!("{}: {}", path.display(), e)),
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    let (config, load_error) = load_config(&cli);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    if let Some(e) = load_error {
        warn!(error = %e, "failed to load config file, using environment");
    }
    config.log_summary();

    let scheduler = Scheduler::new(SchedulerConfig::from(&config.scheduler))?;
    let counter = Arc::new(EventCounter::default());
    scheduler.add_listener(counter.clone());
    register_tasks(&scheduler, &counter, Duration::from_secs(cli.heartbeat_secs.max(1)))?;

    let dispatcher = {
        let scheduler = scheduler.clone();
        std::thread::Builder::new()
            .name("cadence-dispatch".into())
            .spawn(move || scheduler.run())?
    };

    info!(workers = scheduler.worker_count(), "scheduler-worker starting");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.shutdown();

    let joined = tokio::time::timeout(
        Duration::from_secs(cli.shutdown_timeout),
        tokio::task::spawn_blocking(move || dispatcher.join()),
    )
    .await;
    match joined {
        Ok(Ok(Ok(()))) => info!("scheduler-worker exited cleanly"),
        Ok(Ok(Err(_))) => anyhow::bail!("dispatch thread panicked"),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => warn!(
            timeout_secs = cli.shutdown_timeout,
            "in-flight tasks still running at shutdown timeout"
        ),
    }

    Ok(())
}
