//! Error types for the scheduler API.

use cadence_core::TaskId;
use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors returned synchronously by the scheduler API.
///
/// Failures of the work itself never surface here; they are recorded on the
/// task and reported to listeners (see [`ExecutionError`](crate::task::ExecutionError)).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed schedule rejected before any state is created.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Unknown IANA time zone name.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Cron parsing error.
    #[error("Cron parsing error: {0}")]
    CronParse(#[from] cron::error::Error),

    /// A dependency references a task the registry has never seen.
    #[error("Unknown dependency: {0}")]
    UnknownDependency(TaskId),

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Scheduler configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Worker pool could not be started.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
