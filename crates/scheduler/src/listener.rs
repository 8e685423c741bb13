//! Lifecycle notifications.
//!
//! Listeners are called synchronously, while the scheduler holds its state
//! lock, in the order the transitions happen. A slow listener therefore
//! delays dispatch and completion handling for every task. A listener must
//! not call back into the [`Scheduler`](crate::Scheduler): the lock is not
//! reentrant and doing so deadlocks. Hand the event to a channel instead if
//! real work has to happen in response.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cadence_core::TaskId;
use chrono::{DateTime, Utc};
use tracing::error;

use crate::task::ExecutionError;

/// Observer of task state transitions. Every method defaults to a no-op.
pub trait SchedulerListener: Send + Sync {
    /// The task entered SCHEDULED and will be due at `at`.
    fn on_scheduled(&self, _id: TaskId, _at: DateTime<Utc>) {}

    /// The task was handed to a worker. `attempt` is its retry count.
    fn on_started(&self, _id: TaskId, _attempt: u32) {}

    /// The work succeeded. `recurring` is true when another occurrence follows.
    fn on_completed(&self, _id: TaskId, _recurring: bool) {}

    /// The work failed. `retry_at` is set when a retry has been queued and
    /// `None` when the task is now FAILED.
    fn on_failed(&self, _id: TaskId, _error: &ExecutionError, _retry_at: Option<DateTime<Utc>>) {}

    /// The task was cancelled.
    fn on_cancelled(&self, _id: TaskId) {}
}

/// Registered listeners, notified in registration order.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn SchedulerListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn SchedulerListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn scheduled(&self, id: TaskId, at: DateTime<Utc>) {
        self.each("on_scheduled", |l| l.on_scheduled(id, at));
    }

    pub fn started(&self, id: TaskId, attempt: u32) {
        self.each("on_started", |l| l.on_started(id, attempt));
    }

    pub fn completed(&self, id: TaskId, recurring: bool) {
        self.each("on_completed", |l| l.on_completed(id, recurring));
    }

    pub fn failed(&self, id: TaskId, err: &ExecutionError, retry_at: Option<DateTime<Utc>>) {
        self.each("on_failed", |l| l.on_failed(id, err, retry_at));
    }

    pub fn cancelled(&self, id: TaskId) {
        self.each("on_cancelled", |l| l.on_cancelled(id));
    }

    fn each(&self, event: &'static str, notify: impl Fn(&dyn SchedulerListener)) {
        for listener in &self.listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| notify(listener.as_ref())));
            if let Err(payload) = outcome {
                error!(event, panic = %panic_message(payload.as_ref()), "Listener panicked");
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
