use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_core::TaskStatus;
use tracing::{debug, info};

use crate::listener::panic_message;
use crate::task::{ExecutionError, TaskContext, Work};

use super::core::Inner;
use super::Scheduler;

/// Floor for the run loop's sleep so an entry due "now" cannot spin it.
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// A work unit handed to the pool.
pub(super) struct Job {
    pub(super) ctx: TaskContext,
    pub(super) work: Arc<dyn Work>,
}

impl Scheduler {
    /// Dispatch every task that is due, as long as workers are free.
    ///
    /// Due tasks that do not fit in the pool stay queued for the next tick.
    /// Returns the number of tasks handed to workers.
    pub fn tick(&self) -> usize {
        let now = self.inner.clock.now();
        let jobs = {
            let mut guard = self.inner.shared.lock();
            let state = &mut *guard;
            let mut jobs = Vec::new();

            while state.in_flight < self.inner.workers {
                let Some(entry) = state.queue.pop_due(now) else {
                    break;
                };
                let Some(record) = state.registry.get_mut(&entry.id) else {
                    continue;
                };
                if record.status != TaskStatus::Scheduled {
                    continue;
                }

                record.status = TaskStatus::Running;
                record.next_execution_time = None;
                let job = Job {
                    ctx: record.context(entry.due_at),
                    work: Arc::clone(&record.work),
                };
                debug!(
                    task_id = %entry.id,
                    name = %record.name,
                    attempt = job.ctx.attempt,
                    priority = %entry.priority,
                    "Dispatching task"
                );
                state.in_flight += 1;
                state.listeners.started(entry.id, job.ctx.attempt);
                jobs.push(job);
            }

            state.refresh_gauges(self.inner.workers);
            jobs
        };

        let dispatched = jobs.len();
        for job in jobs {
            let inner = Arc::clone(&self.inner);
            self.inner.pool.spawn(move || inner.execute(job));
        }
        dispatched
    }

    /// Run the dispatch loop. Blocks until [`shutdown`](Self::shutdown) is
    /// signalled, then waits for in-flight work to finish.
    pub fn run(&self) {
        info!(
            workers = self.inner.workers,
            tick_interval_ms = self.inner.config.tick_interval_ms,
            tasks = self.inner.shared.lock().registry.len(),
            "Scheduler starting"
        );

        while !self.is_shutdown() {
            self.tick();
            std::thread::sleep(self.idle_sleep());
        }

        self.wait_idle();
        info!("Scheduler stopped");
    }

    /// Block until no work unit is executing.
    pub fn wait_idle(&self) {
        self.inner.shared.wait_until_idle();
    }

    /// Like [`wait_idle`](Self::wait_idle), giving up after `timeout`.
    /// Returns whether the scheduler went idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        self.inner.shared.wait_until_idle_for(timeout)
    }

    /// Time to sleep before the next tick: the tick interval, or less if the
    /// next entry falls due sooner.
    fn idle_sleep(&self) -> Duration {
        let tick = self.inner.config.tick_interval();
        let next_due = self.inner.shared.lock().queue.next_due_at();
        let Some(at) = next_due else {
            return tick;
        };
        match (at - self.inner.clock.now()).to_std() {
            Ok(until_due) => until_due.clamp(MIN_SLEEP, tick.max(MIN_SLEEP)),
            // Already due: the pool was full this tick.
            Err(_) => tick,
        }
    }
}

impl Inner {
    /// Run a job on the current (pool) thread and report its outcome.
    /// Errors and panics from the work unit are contained here.
    fn execute(&self, job: Job) {
        let started = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.work.run(&job.ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ExecutionError::Failed(format!("{e:#}"))),
            Err(payload) => Err(ExecutionError::Panicked(panic_message(payload.as_ref()))),
        };
        self.complete(job.ctx.task_id, outcome, started.elapsed());
    }
}
