use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jobvisor_core::SubscriptionId;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::job::{Job, JobId, JobState};

use super::{JobScheduler, Stage};

impl JobScheduler {
    /// Connect the completion handler to a job's finished signal.
    ///
    /// The handler holds the scheduler weakly so a job outliving its
    /// scheduler does not keep it alive.
    pub(super) fn connect_completion(&self, job: &Job) -> (SubscriptionId, Arc<AtomicBool>) {
        let shared = Arc::downgrade(&self.shared);
        let attached = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&attached);
        let subscription = job.finished_signal().connect(move |id| {
            if let Some(shared) = shared.upgrade() {
                JobScheduler { shared }.settle(*id, Some(&flag));
            }
        });
        (subscription, attached)
    }

    /// Move a finished job from busy to done.
    ///
    /// # Panics
    ///
    /// Panics with [`SchedulerError::NotBusy`] if `id` is not in the busy
    /// set. Only the finished signal of a dispatched job calls this, so a
    /// miss means the collections are corrupt.
    pub(crate) fn complete(&self, id: JobId) {
        self.settle(id, None);
    }

    /// Completion with the handler's attachment flag. A cleared flag means
    /// the busy entry was discarded after the finished signal fired.
    pub(super) fn settle(&self, id: JobId, attached: Option<&AtomicBool>) {
        let (job, subscription, busy_ids, done_ids) = {
            let mut c = self.collections();
            let Some(pos) = c.busy.iter().position(|entry| entry.job.id() == id) else {
                if attached.is_some_and(|flag| !flag.load(Ordering::Acquire)) {
                    debug!(job_id = %id, "detached job finished");
                    return;
                }
                drop(c);
                panic!("{}", SchedulerError::NotBusy(id));
            };
            let entry = c.busy.remove(pos);
            c.done.push(Arc::clone(&entry.job));
            (entry.job, entry.subscription, c.busy_ids(), c.done_ids())
        };
        job.finished_signal().disconnect(subscription);

        let busy = busy_ids.len();
        let cap = self.available_kernels();
        self.with_metrics(|m| {
            m.record_completion(job.handle(), job.state() == JobState::Finished, job.duration());
            m.update_utilization(busy, cap);
        });
        info!(job_id = %id, state = %job.state(), busy, "job moved to done");

        self.shared.busy_changed.emit(busy_ids);
        self.shared.done_changed.emit(done_ids);
        self.shared.settled.notify_waiters();
        self.shared.wake.notify_one();
    }

    /// Remove a busy entry without moving it to done.
    pub(super) fn drop_busy(&self, id: JobId) {
        let removed = {
            let mut c = self.collections();
            let removed = c
                .busy
                .iter()
                .position(|entry| entry.job.id() == id)
                .map(|pos| c.busy.remove(pos));
            if let Some(entry) = &removed {
                entry.detach();
                c.tracked.remove(&id);
            }
            removed.map(|entry| (entry, c.busy_ids()))
        };
        if let Some((entry, busy_ids)) = removed {
            entry.job.finished_signal().disconnect(entry.subscription);
            self.shared.busy_changed.emit(busy_ids);
            self.shared.settled.notify_waiters();
        }
    }

    /// Remove a job from whichever collection holds it.
    ///
    /// Discarding a busy job detaches its completion handler; the worker
    /// process keeps running to completion but the scheduler forgets it.
    pub fn discard(&self, id: JobId) -> Result<Arc<Job>, SchedulerError> {
        let (job, stage, ids, subscription) = {
            let mut c = self.collections();
            let found = if let Some(pos) = c.queue.iter().position(|job| job.id() == id) {
                c.queue
                    .remove(pos)
                    .map(|job| (job, Stage::Queued, None))
            } else if let Some(pos) = c.busy.iter().position(|entry| entry.job.id() == id) {
                let entry = c.busy.remove(pos);
                entry.detach();
                Some((entry.job, Stage::Busy, Some(entry.subscription)))
            } else if let Some(pos) = c.done.iter().position(|job| job.id() == id) {
                Some((c.done.remove(pos), Stage::Done, None))
            } else {
                None
            };
            let Some((job, stage, subscription)) = found else {
                return Err(SchedulerError::UnknownJob(id));
            };
            c.tracked.remove(&id);
            let ids = match stage {
                Stage::Queued => c.queue_ids(),
                Stage::Busy => c.busy_ids(),
                Stage::Done => c.done_ids(),
            };
            (job, stage, ids, subscription)
        };

        if let Some(subscription) = subscription {
            job.finished_signal().disconnect(subscription);
            warn!(job_id = %id, "discarded a running job, its worker keeps running");
        } else {
            info!(job_id = %id, %stage, "job discarded");
        }

        match stage {
            Stage::Queued => self.shared.queue_changed.emit(ids),
            Stage::Busy => self.shared.busy_changed.emit(ids),
            Stage::Done => self.shared.done_changed.emit(ids),
        };
        if stage != Stage::Done {
            self.shared.settled.notify_waiters();
            self.shared.wake.notify_one();
        }
        Ok(job)
    }

    /// Drop every finished job from the done list, returning them.
    pub fn clear_done(&self) -> Vec<Arc<Job>> {
        let cleared: Vec<Arc<Job>> = {
            let mut c = self.collections();
            let cleared: Vec<Arc<Job>> = c.done.drain(..).collect();
            for job in &cleared {
                c.tracked.remove(&job.id());
            }
            cleared
        };
        if !cleared.is_empty() {
            self.shared.done_changed.emit(Vec::new());
        }
        cleared
    }

    /// Wait until both queue and busy set are empty.
    ///
    /// Never returns while the scheduler is paused with jobs still queued.
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.shared.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            if self.is_idle() {
                return;
            }
            settled.await;
        }
    }
}
