//! In-process task scheduler.
//!
//! Tasks are registered with a [`Schedule`] (one-time, interval, daily,
//! weekly or cron), a [`Priority`] used to break ties between tasks due at
//! the same instant, a retry limit and an optional set of upstream tasks
//! that must complete first. A [`Scheduler`] dispatches due tasks to a
//! fixed-size rayon pool and applies the outcome of each run: completion,
//! the next recurrence, a delayed retry or terminal failure.
//!
//! ```no_run
//! use std::time::Duration;
//! use cadence_scheduler::{Schedule, Scheduler, SchedulerConfig, TaskSpec};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! scheduler.schedule(
//!     TaskSpec::new("heartbeat", |_| Ok(()))
//!         .schedule(Schedule::every(Duration::from_secs(30))),
//! )?;
//! scheduler.run();
//! # Ok::<(), cadence_scheduler::SchedulerError>(())
//! ```

pub mod clock;
pub mod config;
pub mod dependency;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod queue;
pub mod recurrence;
pub mod registry;
pub mod retry;
pub mod runner;
mod state;
pub mod task;

pub use cadence_core::{Priority, TaskId, TaskStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryConfig, RetryStrategy, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use listener::SchedulerListener;
pub use metrics::SchedulerMetrics;
pub use recurrence::{CronExpr, Schedule};
pub use registry::TaskSnapshot;
pub use retry::RetryPolicy;
pub use runner::Scheduler;
pub use task::{ExecutionError, TaskContext, TaskSpec, Work};
