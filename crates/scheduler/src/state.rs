//! Mutable scheduler state shared by the dispatcher and completing workers.
//!
//! Registry, ready queue, dependency resolver, listeners and metrics live
//! behind a single mutex so every status transition (and the queue and
//! resolver updates that go with it) is atomic.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cadence_core::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::dependency::DependencyResolver;
use crate::listener::ListenerSet;
use crate::metrics::SchedulerMetrics;
use crate::queue::ReadyQueue;
use crate::registry::TaskRegistry;
use crate::task::ExecutionError;

#[derive(Default)]
pub(crate) struct SchedulerState {
    pub(crate) registry: TaskRegistry,
    pub(crate) queue: ReadyQueue,
    pub(crate) resolver: DependencyResolver,
    pub(crate) listeners: ListenerSet,
    pub(crate) metrics: SchedulerMetrics,
    /// Work units handed to the pool and not yet reported back.
    pub(crate) in_flight: usize,
}

impl SchedulerState {
    /// Mark `id` SCHEDULED for `at` and queue it.
    pub(crate) fn enqueue(&mut self, id: TaskId, at: DateTime<Utc>) {
        let Some(record) = self.registry.get_mut(&id) else {
            return;
        };
        record.status = TaskStatus::Scheduled;
        record.next_execution_time = Some(at);
        let priority = record.priority;
        self.queue.insert(id, at, priority);
        debug!(task_id = %id, due_at = %at, "Task scheduled");
        self.listeners.scheduled(id, at);
    }

    /// Record that `id` reached COMPLETED and promote every task that was
    /// only waiting on it.
    ///
    /// A dependent whose schedule has no occurrence left fails without
    /// running; its own dependents stay waiting.
    pub(crate) fn release_dependents(&mut self, id: TaskId, now: DateTime<Utc>) {
        for dependent in self.resolver.on_task_completed(id) {
            let Some(record) = self.registry.get_mut(&dependent) else {
                continue;
            };
            if record.status != TaskStatus::WaitingForDependency {
                continue;
            }
            match record.schedule.first_occurrence(now) {
                Some(at) => {
                    debug!(task_id = %dependent, "Dependencies satisfied");
                    self.enqueue(dependent, at);
                }
                None => {
                    let err = ExecutionError::ScheduleExhausted;
                    warn!(task_id = %dependent, name = %record.name, error = %err, "Task failed without running");
                    record.status = TaskStatus::Failed;
                    record.next_execution_time = None;
                    record.last_error = Some(err.to_string());
                    self.listeners.failed(dependent, &err, None);
                }
            }
        }
    }

    pub(crate) fn refresh_gauges(&mut self, workers: usize) {
        let queue_depth = self.queue.len();
        let waiting = self.resolver.waiting_count();
        self.metrics
            .update_gauges(queue_depth, waiting, self.in_flight, workers);
    }
}

/// [`SchedulerState`] plus a condition variable signalled whenever a work
/// unit reports back.
#[derive(Default)]
pub(crate) struct SharedState {
    state: Mutex<SchedulerState>,
    settled: Condvar,
}

impl SharedState {
    /// Lock the state, recovering from poisoning.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_settled(&self) {
        self.settled.notify_all();
    }

    /// Block until no work is in flight.
    pub(crate) fn wait_until_idle(&self) {
        let mut state = self.lock();
        while state.in_flight > 0 {
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_until_idle`](Self::wait_until_idle) but gives up after
    /// `timeout`. Returns whether the state is idle.
    pub(crate) fn wait_until_idle_for(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .settled
            .wait_timeout_while(state, timeout, |s| s.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.in_flight == 0
    }
}
