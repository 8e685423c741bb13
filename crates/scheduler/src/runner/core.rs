use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cadence_core::{TaskId, TaskStatus};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::listener::SchedulerListener;
use crate::metrics::SchedulerMetrics;
use crate::recurrence::Schedule;
use crate::registry::{TaskRecord, TaskSnapshot};
use crate::retry::RetryPolicy;
use crate::state::SharedState;
use crate::task::TaskSpec;

/// Task scheduler. Cheap to clone; clones drive the same instance.
///
/// Tasks are registered with [`schedule`](Self::schedule) and dispatched to
/// a fixed-size worker pool by [`tick`](Self::tick), which [`run`](Self::run)
/// calls in a loop until [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct Scheduler {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) config: SchedulerConfig,
    /// Backoff for tasks without their own policy.
    pub(super) retry_policy: RetryPolicy,
    pub(super) workers: usize,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) shared: SharedState,
    pub(super) pool: rayon::ThreadPool,
    pub(super) shutdown: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler on wall-clock time.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a scheduler reading time from `clock`.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let workers = config.resolved_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cadence-worker-{i}"))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                retry_policy: config.retry_policy(),
                config,
                workers,
                clock,
                shared: SharedState::default(),
                pool,
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Register a task and return its id.
    ///
    /// A [`TaskSpec`] without a schedule runs once, immediately. Every
    /// dependency must name a task this scheduler already knows; a task whose
    /// dependencies have not all completed starts out
    /// [`WaitingForDependency`](TaskStatus::WaitingForDependency).
    pub fn schedule(&self, spec: TaskSpec) -> Result<TaskId> {
        let now = self.inner.clock.now();
        let schedule = spec.schedule.unwrap_or(Schedule::once(now));
        schedule.validate()?;
        let schedule = schedule.anchored_at(now);

        let mut guard = self.inner.shared.lock();
        let state = &mut *guard;

        if let Some(missing) = spec
            .dependencies
            .iter()
            .find(|dep| !state.registry.contains(dep))
        {
            return Err(SchedulerError::UnknownDependency(*missing));
        }

        let first = if state.resolver.is_ready(&spec.dependencies) {
            let at = schedule.first_occurrence(now).ok_or_else(|| {
                SchedulerError::InvalidSchedule(format!("'{}' never occurs after {}", schedule, now))
            })?;
            Some(at)
        } else {
            None
        };

        let id = TaskId::new();
        if first.is_none() {
            state.resolver.block(id, &spec.dependencies);
        }

        let name = spec.name;
        debug!(task_id = %id, name = %name, schedule = %schedule, priority = %spec.priority, "Registering task");
        state.registry.insert(TaskRecord {
            id,
            name,
            work: spec.work,
            schedule,
            priority: spec.priority,
            dependencies: spec.dependencies,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: spec
                .max_retries
                .unwrap_or(self.inner.config.default_max_retries),
            retry_policy: spec.retry_policy,
            next_execution_time: None,
            created_at: now,
            last_executed_at: None,
            last_error: None,
            run_count: 0,
        });

        match first {
            Some(at) => state.enqueue(id, at),
            None => {
                if let Some(record) = state.registry.get_mut(&id) {
                    record.status = TaskStatus::WaitingForDependency;
                }
                debug!(task_id = %id, "Task waiting for dependencies");
            }
        }

        Ok(id)
    }

    /// Cancel a task. Returns `false` if it is unknown or already terminal.
    ///
    /// A running task is marked cancelled straight away, but its work unit is
    /// not interrupted; when it finishes, nothing is rescheduled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut guard = self.inner.shared.lock();
        let state = &mut *guard;
        let Some(record) = state.registry.get_mut(&id) else {
            return false;
        };

        match record.status {
            status if status.is_terminal() => return false,
            TaskStatus::Scheduled => {
                state.queue.remove_if_present(&id);
            }
            TaskStatus::WaitingForDependency => {
                state.resolver.remove_waiting(&id);
            }
            _ => {}
        }

        let previous = record.status;
        record.status = TaskStatus::Cancelled;
        record.next_execution_time = None;
        info!(task_id = %id, name = %record.name, %previous, "Task cancelled");
        state.listeners.cancelled(id);
        true
    }

    pub fn status(&self, id: TaskId) -> Result<TaskStatus> {
        self.inner
            .shared
            .lock()
            .registry
            .get(&id)
            .map(|record| record.status)
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    pub fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.inner
            .shared
            .lock()
            .registry
            .get(&id)
            .map(TaskRecord::snapshot)
    }

    /// Snapshots of every known task, in no particular order.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.inner
            .shared
            .lock()
            .registry
            .iter()
            .map(TaskRecord::snapshot)
            .collect()
    }

    /// Register a lifecycle listener. See [`crate::listener`] for the rules
    /// listeners must follow.
    pub fn add_listener(&self, listener: Arc<dyn SchedulerListener>) {
        self.inner.shared.lock().listeners.add(listener);
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut state = self.inner.shared.lock();
        state.refresh_gauges(self.inner.workers);
        state.metrics.clone()
    }

    /// Entries currently in the ready queue.
    pub fn queue_len(&self) -> usize {
        self.inner.shared.lock().queue.len()
    }

    /// Size of the worker pool.
    pub fn worker_count(&self) -> usize {
        self.inner.workers
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Signal [`run`](Self::run) to stop after in-flight work finishes.
    pub fn shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.inner.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.inner.workers)
            .field("config", &self.inner.config)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
