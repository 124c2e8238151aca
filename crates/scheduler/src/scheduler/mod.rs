//! Job scheduler -- moves jobs through queue → busy → done under a concurrency cap.
//!
//! Split into focused submodules:
//! - `dispatch`: enqueueing, the tick that starts queued jobs, and the background loop
//! - `completion`: the finished-signal handler, discard, and idle waiting
//!
//! All three collections live under one mutex. Signals are always emitted
//! after that mutex is released, so subscribers may call back into the
//! scheduler.

mod completion;
mod dispatch;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::info;

use jobvisor_core::{Configuration, Signal, SubscriptionId};

use crate::job::{Job, JobId, JobIdAllocator, WorkerSpec};
use crate::metrics::SchedulerMetrics;
use crate::types::{SchedulerConfig, SupervisionTiming};
use crate::worker::default_worker_program;

/// Which collection currently holds a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Busy,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Busy => "busy",
            Self::Done => "done",
        })
    }
}

/// Handle to a scheduler. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobScheduler {
    pub(super) shared: Arc<Shared>,
}

pub(super) struct Shared {
    pub(super) config: SchedulerConfig,
    pub(super) timing: SupervisionTiming,
    pub(super) ids: Arc<JobIdAllocator>,
    pub(super) collections: Mutex<Collections>,
    pub(super) is_running: AtomicBool,
    pub(super) max_kernels: usize,
    pub(super) available_kernels: AtomicUsize,
    pub(super) metrics: RwLock<SchedulerMetrics>,
    pub(super) shutdown: AtomicBool,
    /// Wakes the dispatch loop ahead of its next tick.
    pub(super) wake: Notify,
    /// Notified whenever a job leaves queue or busy.
    pub(super) settled: Notify,
    pub(super) queue_changed: Signal<Vec<JobId>>,
    pub(super) busy_changed: Signal<Vec<JobId>>,
    pub(super) done_changed: Signal<Vec<JobId>>,
}

#[derive(Default)]
pub(super) struct Collections {
    pub(super) queue: VecDeque<Arc<Job>>,
    pub(super) busy: Vec<BusyEntry>,
    pub(super) done: Vec<Arc<Job>>,
    /// Ids present in any of the three collections.
    pub(super) tracked: HashSet<JobId>,
}

pub(super) struct BusyEntry {
    pub(super) job: Arc<Job>,
    /// Completion handler connected to the job's finished signal.
    pub(super) subscription: SubscriptionId,
    /// Shared with the completion handler. Cleared under the collections
    /// lock when the entry is removed without completing, so a finished
    /// signal already in flight is ignored instead of treated as corruption.
    pub(super) attached: Arc<AtomicBool>,
}

impl BusyEntry {
    /// Mark the entry as removed. Call with the collections lock held.
    pub(super) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}

impl Collections {
    pub(super) fn queue_ids(&self) -> Vec<JobId> {
        self.queue.iter().map(|job| job.id()).collect()
    }

    pub(super) fn busy_ids(&self) -> Vec<JobId> {
        self.busy.iter().map(|entry| entry.job.id()).collect()
    }

    pub(super) fn done_ids(&self) -> Vec<JobId> {
        self.done.iter().map(|job| job.id()).collect()
    }
}

impl JobScheduler {
    /// Create a scheduler with its own id allocator.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_ids(config, Arc::new(JobIdAllocator::new()))
    }

    /// Create a scheduler that issues job ids from `ids`.
    pub fn with_ids(config: SchedulerConfig, ids: Arc<JobIdAllocator>) -> Self {
        let max_kernels = config.resolved_max_kernels();
        let available = config.resolved_available_kernels(max_kernels);
        info!(
            max_kernels,
            available_kernels = available,
            autostart = config.autostart,
            "creating job scheduler"
        );
        Self {
            shared: Arc::new(Shared {
                timing: config.supervision(),
                is_running: AtomicBool::new(config.autostart),
                config,
                ids,
                collections: Mutex::new(Collections::default()),
                max_kernels,
                available_kernels: AtomicUsize::new(available),
                metrics: RwLock::new(SchedulerMetrics::default()),
                shutdown: AtomicBool::new(false),
                wake: Notify::new(),
                settled: Notify::new(),
                queue_changed: Signal::new("queue_changed"),
                busy_changed: Signal::new("busy_changed"),
                done_changed: Signal::new("done_changed"),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn id_allocator(&self) -> Arc<JobIdAllocator> {
        Arc::clone(&self.shared.ids)
    }

    /// Launch description for `handle` using the configured worker program.
    pub fn worker_spec(&self, handle: impl Into<String>) -> WorkerSpec {
        let program = self
            .shared
            .config
            .worker_program
            .clone()
            .unwrap_or_else(default_worker_program);
        WorkerSpec::new(program, handle)
    }

    /// Build a job with a fresh id from this scheduler's allocator.
    pub fn create_job(&self, config: Configuration, worker: WorkerSpec) -> Job {
        Job::new(self.shared.ids.next_id(), config, worker)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    pub fn max_kernels(&self) -> usize {
        self.shared.max_kernels
    }

    pub fn available_kernels(&self) -> usize {
        self.shared.available_kernels.load(Ordering::Acquire)
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn queue_jobs(&self) -> Vec<Arc<Job>> {
        self.collections().queue.iter().cloned().collect()
    }

    pub fn busy_jobs(&self) -> Vec<Arc<Job>> {
        self.collections()
            .busy
            .iter()
            .map(|entry| Arc::clone(&entry.job))
            .collect()
    }

    pub fn done_jobs(&self) -> Vec<Arc<Job>> {
        self.collections().done.clone()
    }

    pub fn find(&self, id: JobId) -> Option<Arc<Job>> {
        let c = self.collections();
        c.queue
            .iter()
            .chain(c.busy.iter().map(|entry| &entry.job))
            .chain(c.done.iter())
            .find(|job| job.id() == id)
            .cloned()
    }

    pub fn stage_of(&self, id: JobId) -> Option<Stage> {
        let c = self.collections();
        if c.queue.iter().any(|job| job.id() == id) {
            Some(Stage::Queued)
        } else if c.busy.iter().any(|entry| entry.job.id() == id) {
            Some(Stage::Busy)
        } else if c.done.iter().any(|job| job.id() == id) {
            Some(Stage::Done)
        } else {
            None
        }
    }

    /// True when nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        let c = self.collections();
        c.queue.is_empty() && c.busy.is_empty()
    }

    /// Emitted with the queue's ids whenever the queue changes.
    pub fn queue_changed(&self) -> &Signal<Vec<JobId>> {
        &self.shared.queue_changed
    }

    /// Emitted with the busy set's ids whenever it changes.
    pub fn busy_changed(&self) -> &Signal<Vec<JobId>> {
        &self.shared.busy_changed
    }

    /// Emitted with the done list's ids whenever it changes.
    pub fn done_changed(&self) -> &Signal<Vec<JobId>> {
        &self.shared.done_changed
    }

    pub(super) fn collections(&self) -> MutexGuard<'_, Collections> {
        self.shared
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn with_metrics(&self, update: impl FnOnce(&mut SchedulerMetrics)) {
        let mut metrics = self
            .shared
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics);
    }
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.collections();
        f.debug_struct("JobScheduler")
            .field("running", &self.is_running())
            .field("available_kernels", &self.available_kernels())
            .field("queued", &c.queue.len())
            .field("busy", &c.busy.len())
            .field("done", &c.done.len())
            .finish()
    }
}
