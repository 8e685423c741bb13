use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Finished executions by task name, successful or not.
    pub tasks_executed: HashMap<String, u64>,
    /// Failed executions by task name.
    pub tasks_failed: HashMap<String, u64>,
    /// Retries queued across all tasks.
    pub retries_scheduled: u64,
    /// Tasks that ended FAILED after exhausting their retries.
    pub retries_exhausted: u64,
    /// Average execution duration by task name.
    pub avg_task_duration: HashMap<String, Duration>,
    /// Last finish time by task name.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Entries waiting in the ready queue.
    pub queue_depth: usize,
    /// Tasks blocked on dependencies.
    pub waiting_on_dependencies: usize,
    /// Work units currently executing.
    pub in_flight: usize,
    /// Worker utilization ratio (0.0 - 1.0).
    pub worker_utilization: f64,
}

impl SchedulerMetrics {
    /// Record a finished execution.
    pub fn record_execution(
        &mut self,
        task_name: &str,
        duration: Duration,
        finished_at: DateTime<Utc>,
        succeeded: bool,
    ) {
        let count = {
            let count = self.tasks_executed.entry(task_name.to_string()).or_default();
            *count += 1;
            *count
        };
        if !succeeded {
            *self.tasks_failed.entry(task_name.to_string()).or_default() += 1;
        }
        self.last_run.insert(task_name.to_string(), finished_at);

        let prev_avg = self
            .avg_task_duration
            .get(task_name)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(task_name.to_string(), new_avg);
    }

    /// Refresh the gauges from current scheduler state.
    pub fn update_gauges(&mut self, queue_depth: usize, waiting: usize, in_flight: usize, workers: usize) {
        self.queue_depth = queue_depth;
        self.waiting_on_dependencies = waiting;
        self.in_flight = in_flight;
        self.worker_utilization = if workers == 0 {
            0.0
        } else {
            in_flight as f64 / workers as f64
        };
    }
}
