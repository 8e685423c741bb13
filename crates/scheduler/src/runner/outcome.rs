use std::time::Duration;

use cadence_core::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::retry::RetryPolicy;
use crate::state::SchedulerState;
use crate::task::ExecutionError;

use super::core::Inner;

impl Inner {
    /// Apply the outcome of one execution of `id`.
    pub(super) fn complete(
        &self,
        id: TaskId,
        outcome: Result<(), ExecutionError>,
        duration: Duration,
    ) {
        let now = self.clock.now();
        {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            state.in_flight = state.in_flight.saturating_sub(1);

            if let Some(record) = state.registry.get_mut(&id) {
                record.last_executed_at = Some(now);
                record.run_count += 1;
                if let Err(e) = &outcome {
                    record.last_error = Some(e.to_string());
                }
                state
                    .metrics
                    .record_execution(&record.name, duration, now, outcome.is_ok());

                if record.status == TaskStatus::Cancelled {
                    debug!(task_id = %id, "Cancelled task finished; outcome recorded only");
                } else {
                    match outcome {
                        Ok(()) => on_success(state, id, now),
                        Err(e) => on_failure(state, id, e, now, &self.retry_policy),
                    }
                }
            }

            state.refresh_gauges(self.workers);
        }
        self.shared.notify_settled();
    }
}

fn on_success(state: &mut SchedulerState, id: TaskId, now: DateTime<Utc>) {
    let Some(record) = state.registry.get_mut(&id) else {
        return;
    };
    debug!(task_id = %id, name = %record.name, "Task succeeded");

    if record.schedule.is_recurring() {
        record.retry_count = 0;
        if let Some(next) = record.schedule.next_occurrence(now) {
            state.listeners.completed(id, true);
            state.enqueue(id, next);
            return;
        }
        warn!(task_id = %id, "Recurring schedule exhausted");
    }

    record.status = TaskStatus::Completed;
    record.next_execution_time = None;
    state.listeners.completed(id, false);
    state.release_dependents(id, now);
}

fn on_failure(
    state: &mut SchedulerState,
    id: TaskId,
    err: ExecutionError,
    now: DateTime<Utc>,
    default_policy: &RetryPolicy,
) {
    let Some(record) = state.registry.get_mut(&id) else {
        return;
    };

    if record.retry_count < record.max_retries {
        let policy = record.retry_policy.as_ref().unwrap_or(default_policy);
        let delay = policy.next_delay(record.retry_count);
        let retry_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d));

        if let Some(retry_at) = retry_at {
            record.retry_count += 1;
            warn!(
                task_id = %id,
                name = %record.name,
                retry = record.retry_count,
                max_retries = record.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Task failed, retry scheduled"
            );
            state.metrics.retries_scheduled += 1;
            state.listeners.failed(id, &err, Some(retry_at));
            state.enqueue(id, retry_at);
            return;
        }
        warn!(task_id = %id, ?delay, "Retry delay out of range; not retrying");
    }

    record.status = TaskStatus::Failed;
    record.next_execution_time = None;
    error!(
        task_id = %id,
        name = %record.name,
        retries = record.retry_count,
        error = %err,
        "Task failed permanently"
    );
    state.metrics.retries_exhausted += 1;
    state.listeners.failed(id, &err, None);
}
