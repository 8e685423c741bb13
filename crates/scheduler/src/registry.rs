//! Authoritative map from task id to task record.
//!
//! The registry owns records and nothing else: status transitions are made
//! by the scheduler while it holds the state lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cadence_core::{Priority, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::recurrence::Schedule;
use crate::retry::RetryPolicy;
use crate::task::{TaskContext, Work};

/// Mutable state of a single task.
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub work: Arc<dyn Work>,
    pub schedule: Schedule,
    pub priority: Priority,
    pub dependencies: HashSet<TaskId>,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Per-task override of the scheduler's policy.
    pub retry_policy: Option<RetryPolicy>,
    /// Set iff the task is SCHEDULED.
    pub next_execution_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Finished executions, successful or not.
    pub run_count: u64,
}

impl TaskRecord {
    pub(crate) fn context(&self, scheduled_for: DateTime<Utc>) -> TaskContext {
        TaskContext {
            task_id: self.id,
            name: self.name.clone(),
            attempt: self.retry_count,
            scheduled_for,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            schedule: self.schedule.to_string(),
            priority: self.priority,
            dependencies: self.dependencies.iter().copied().collect(),
            status: self.status,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            next_execution_time: self.next_execution_time,
            created_at: self.created_at,
            last_executed_at: self.last_executed_at,
            last_error: self.last_error.clone(),
            run_count: self.run_count,
        }
    }
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("next_execution_time", &self.next_execution_time)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a task, safe to hand out of the lock.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub schedule: String,
    pub priority: Priority,
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: TaskRecord) {
        self.tasks.insert(record.id, record);
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    /// Number of tasks per status.
    pub fn count_by_status(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for record in self.tasks.values() {
            *counts.entry(record.status).or_default() += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
