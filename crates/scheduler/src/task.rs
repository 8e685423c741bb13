use std::collections::HashSet;
use std::sync::Arc;

use cadence_core::{Priority, TaskId};
use chrono::{DateTime, Utc};

use crate::recurrence::Schedule;
use crate::retry::RetryPolicy;

/// Error recorded when a work unit does not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Task failed: {0}")]
    Failed(String),
    #[error("Task panicked: {0}")]
    Panicked(String),
    /// The schedule ran out of occurrences while the task was still
    /// waiting on its dependencies; the work unit never ran.
    #[error("schedule exhausted before dependencies resolved")]
    ScheduleExhausted,
}

/// Information handed to a work unit for one execution.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub name: String,
    /// 0 on the first attempt, incremented per retry.
    pub attempt: u32,
    /// Instant the task was due.
    pub scheduled_for: DateTime<Utc>,
}

/// A unit of deferred work.
///
/// The scheduler treats the work as a black box: it either returns `Ok` or
/// an error (a panic counts as an error). Work runs on pool threads and may
/// block for as long as it needs.
pub trait Work: Send + Sync {
    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()>;
}

impl<F> Work for F
where
    F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Request to schedule a task.
pub struct TaskSpec {
    pub(crate) name: String,
    pub(crate) work: Arc<dyn Work>,
    pub(crate) schedule: Option<Schedule>,
    pub(crate) priority: Priority,
    pub(crate) max_retries: Option<u32>,
    pub(crate) dependencies: HashSet<TaskId>,
    pub(crate) retry_policy: Option<RetryPolicy>,
}

impl TaskSpec {
    /// Task for a closure. Runs once, immediately, at medium priority
    /// unless configured otherwise.
    pub fn new<F>(name: impl Into<String>, work: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_work(name, Arc::new(work))
    }

    /// Task for any [`Work`] implementation.
    pub fn from_work(name: impl Into<String>, work: Arc<dyn Work>) -> Self {
        Self {
            name: name.into(),
            work,
            schedule: None,
            priority: Priority::default(),
            max_retries: None,
            dependencies: HashSet::new(),
            retry_policy: None,
        }
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the scheduler's default retry limit.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Tasks that must reach COMPLETED before this one may run.
    pub fn depends_on(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(ids);
        self
    }

    /// Override the scheduler's retry backoff for this task.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn builder_collects_fields() {
        let a = TaskId::new();
        let b = TaskId::new();
        let spec = TaskSpec::new("report", |_| Ok(()))
            .schedule(Schedule::every(Duration::from_secs(60)))
            .priority(Priority::High)
            .max_retries(5)
            .depends_on([a, b, a]);

        assert_eq!(spec.name, "report");
        assert_eq!(spec.priority, Priority::High);
        assert_eq!(spec.max_retries, Some(5));
        assert_eq!(spec.dependencies.len(), 2);
        assert!(spec.schedule.is_some());
    }

    #[test]
    fn closures_are_work() {
        let work = |ctx: &TaskContext| -> anyhow::Result<()> {
            anyhow::ensure!(ctx.attempt < 1, "attempt {} rejected", ctx.attempt);
            Ok(())
        };
        let mut ctx = TaskContext {
            task_id: TaskId::new(),
            name: "probe".into(),
            attempt: 0,
            scheduled_for: Utc::now(),
        };
        assert!(work.run(&ctx).is_ok());
        ctx.attempt = 1;
        assert!(work.run(&ctx).is_err());
    }
}
