use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use jobvisor_core::Configuration;

use crate::error::{JobError, SchedulerError};
use crate::job::{Job, JobState, WorkerSpec};

use super::{BusyEntry, JobScheduler};

impl JobScheduler {
    /// Append a job to the queue tail.
    ///
    /// Only jobs still in `Created` are accepted, and a job id is tracked at
    /// most once.
    pub fn enqueue(&self, job: impl Into<Arc<Job>>) -> Result<Arc<Job>, SchedulerError> {
        let job = job.into();
        let id = job.id();
        if job.state() != JobState::Created {
            return Err(SchedulerError::NotCreated(id));
        }

        let queue_ids = {
            let mut c = self.collections();
            if !c.tracked.insert(id) {
                return Err(SchedulerError::AlreadyTracked(id));
            }
            c.queue.push_back(Arc::clone(&job));
            c.queue_ids()
        };
        self.with_metrics(|m| m.jobs_enqueued += 1);
        debug!(job_id = %id, name = %job.name(), handle = %job.handle(), "job enqueued");

        self.shared.queue_changed.emit(queue_ids);
        self.shared.wake.notify_one();
        Ok(job)
    }

    /// Build a job for `config` with a fresh id and enqueue it.
    pub fn submit(&self, config: Configuration, worker: WorkerSpec) -> Result<Arc<Job>, SchedulerError> {
        self.enqueue(self.create_job(config, worker))
    }

    /// Allow dispatching. Running jobs are unaffected either way.
    pub fn start(&self) {
        if !self.shared.is_running.swap(true, Ordering::AcqRel) {
            info!("job scheduler started");
        }
        self.shared.wake.notify_one();
    }

    /// Stop dispatching new jobs. Running jobs keep running.
    pub fn pause(&self) {
        if self.shared.is_running.swap(false, Ordering::AcqRel) {
            info!("job scheduler paused");
        }
    }

    /// Set the concurrency cap, clamped to `[1, max_kernels]`. Returns the
    /// effective value. Lowering it never stops running jobs; it only holds
    /// back dispatch until the busy set drains below the new cap.
    pub fn set_concurrency(&self, requested: usize) -> usize {
        let effective = requested.clamp(1, self.shared.max_kernels.max(1));
        let previous = self
            .shared
            .available_kernels
            .swap(effective, Ordering::AcqRel);
        if effective != requested {
            warn!(requested, effective, "concurrency clamped to [1, max_kernels]");
        }
        if previous != effective {
            info!(previous, effective, "concurrency cap changed");
        }
        self.shared.wake.notify_one();
        effective
    }

    /// Start queued jobs, oldest first, until the cap is reached or the queue
    /// is empty. Returns how many were started.
    ///
    /// Jobs are supervised on tokio tasks, so this must run inside a tokio
    /// runtime. Called from anywhere else it logs an error and starts nothing.
    pub fn tick(&self) -> usize {
        if self.is_running() && tokio::runtime::Handle::try_current().is_err() {
            error!("tick called outside a tokio runtime, nothing dispatched");
            return 0;
        }
        let mut dispatched = 0;
        while self.is_running() {
            let cap = self.available_kernels();
            let (job, queue_ids, busy_ids) = {
                let mut c = self.collections();
                if c.busy.len() >= cap {
                    break;
                }
                let Some(job) = c.queue.pop_front() else {
                    break;
                };
                // Subscribe before start so a worker that dies instantly is still seen.
                let (subscription, attached) = self.connect_completion(&job);
                c.busy.push(BusyEntry {
                    job: Arc::clone(&job),
                    subscription,
                    attached,
                });
                (job, c.queue_ids(), c.busy_ids())
            };

            let busy = busy_ids.len();
            self.with_metrics(|m| {
                m.jobs_dispatched += 1;
                m.update_utilization(busy, cap);
            });
            self.shared.queue_changed.emit(queue_ids);
            self.shared.busy_changed.emit(busy_ids);

            match job.start(self.shared.timing) {
                Ok(()) => {
                    info!(job_id = %job.id(), name = %job.name(), handle = %job.handle(), busy, cap, "job dispatched");
                }
                Err(JobError::AlreadyStarted(id)) => {
                    error!(job_id = %id, "queued job was started outside the scheduler, dropping it");
                    self.drop_busy(id);
                }
                // The job is already Failed and its finished signal has moved it to done.
                Err(e) => warn!(job_id = %job.id(), error = %e, "job failed to start"),
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Run [`tick`](Self::tick) every `tick_interval` on a background task
    /// until [`shutdown`](Self::shutdown).
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let period = scheduler.shared.config.tick_interval();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(tick_ms = period.as_millis() as u64, "dispatch loop started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = scheduler.shared.wake.notified() => {}
                }
                if scheduler.shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                scheduler.tick();
            }
            info!("dispatch loop stopped");
        })
    }

    /// Stop the background dispatch loop. Does not touch running jobs.
    pub fn shutdown(&self) {
        info!("job scheduler shutdown requested");
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}
