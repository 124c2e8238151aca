//! A single configuration run as an isolated worker process.
//!
//! Split into focused submodules:
//! - `id`: job identity and the injected id allocator
//! - `state`: lifecycle states and worker exit status
//! - `result`: live metric history and the final result map
//! - `spec`: how to launch the worker process
//! - `supervisor`: spawning the worker and draining its progress channel

mod id;
mod result;
mod spec;
mod state;
mod supervisor;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use jobvisor_core::{Configuration, Signal};

use crate::error::JobError;
use crate::types::SupervisionTiming;
use crate::worker::protocol::{Frame, ProgressUpdate};

pub use id::{JobId, JobIdAllocator};
pub use result::{LiveResult, LiveUpdate, ResultMap};
pub use spec::WorkerSpec;
pub use state::{JobState, WorkerExit};

/// One configuration paired with the handle that processes it.
///
/// Shared as `Arc<Job>` between the scheduler's collections and the
/// supervisor task. All mutable state sits behind atomics or locks so
/// observers can read it while the job runs.
pub struct Job {
    id: JobId,
    config: Configuration,
    worker: WorkerSpec,
    created_at: DateTime<Utc>,
    state: watch::Sender<JobState>,
    progress: AtomicU8,
    alive: AtomicBool,
    live_result: RwLock<LiveResult>,
    final_result: OnceLock<ResultMap>,
    error: RwLock<Option<String>>,
    exit: RwLock<Option<WorkerExit>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
    live_update: Signal<LiveUpdate>,
    finished: Signal<JobId>,
}

impl Job {
    pub fn new(id: JobId, config: Configuration, worker: WorkerSpec) -> Self {
        let (state, _) = watch::channel(JobState::Created);
        Self {
            id,
            config,
            worker,
            created_at: Utc::now(),
            state,
            progress: AtomicU8::new(0),
            alive: AtomicBool::new(true),
            live_result: RwLock::new(LiveResult::new()),
            final_result: OnceLock::new(),
            error: RwLock::new(None),
            exit: RwLock::new(None),
            started_at: RwLock::new(None),
            finished_at: RwLock::new(None),
            live_update: Signal::new("live_update"),
            finished: Signal::new("finished"),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn worker(&self) -> &WorkerSpec {
        &self.worker
    }

    pub fn handle(&self) -> &str {
        &self.worker.handle
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Last reported progress, 0–100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    /// True from construction until worker exit has been observed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// The final result once set, otherwise the live metric history.
    pub fn result(&self) -> ResultMap {
        match self.final_result.get() {
            Some(result) => result.clone(),
            None => read(&self.live_result).to_result_map(),
        }
    }

    pub fn live_result(&self) -> LiveResult {
        read(&self.live_result).clone()
    }

    pub fn final_result(&self) -> Option<&ResultMap> {
        self.final_result.get()
    }

    /// Set the final result. Succeeds at most once per job.
    pub fn set_final_result(&self, result: ResultMap) -> Result<(), JobError> {
        self.final_result
            .set(result)
            .map_err(|_| JobError::ResultAlreadySet(self.id))
    }

    /// Error reported by the worker, or why supervision failed.
    pub fn error(&self) -> Option<String> {
        read(&self.error).clone()
    }

    pub fn exit(&self) -> Option<WorkerExit> {
        *read(&self.exit)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *read(&self.started_at)
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *read(&self.finished_at)
    }

    /// Wall time between start and finish, once both are known.
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at()?;
        let finished = self.finished_at()?;
        (finished - started).to_std().ok()
    }

    /// Emitted for every progress frame applied to this job.
    pub fn live_update_signal(&self) -> &Signal<LiveUpdate> {
        &self.live_update
    }

    /// Emitted exactly once, with this job's id, after it reaches a terminal state.
    pub fn finished_signal(&self) -> &Signal<JobId> {
        &self.finished
    }

    /// Wait until the job reaches `Finished` or `Failed`.
    pub async fn wait_finished(&self) -> JobState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Spawn the worker process and its supervisor task.
    ///
    /// Must be called from within a tokio runtime. A job starts at most once:
    /// any call after the first returns [`JobError::AlreadyStarted`].
    pub fn start(self: &Arc<Self>, timing: SupervisionTiming) -> Result<(), JobError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == JobState::Created {
                *state = JobState::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(JobError::AlreadyStarted(self.id));
        }
        *write(&self.started_at) = Some(Utc::now());
        debug!(job_id = %self.id, handle = %self.handle(), "starting job");

        if let Err(err) = supervisor::launch(Arc::clone(self), timing) {
            self.record_error(err.to_string());
            let _ = self.set_final_result(ResultMap::new());
            self.conclude(JobState::Failed, None);
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn apply_frame(&self, frame: Frame) {
        match frame {
            Frame::Update { values } => self.apply_update(ProgressUpdate::from_values(values)),
            Frame::Error { message } => {
                warn!(job_id = %self.id, error = %message, "worker reported an error");
                self.record_error(message);
            }
        }
    }

    fn apply_update(&self, update: ProgressUpdate) {
        if let Some(progress) = update.progress {
            self.progress.store(progress, Ordering::Release);
        }
        if !update.metrics.is_empty() {
            write(&self.live_result).append(&update.metrics);
        }
        self.live_update.emit(LiveUpdate {
            job_id: self.id,
            progress: self.progress(),
            metrics: update.metrics,
        });
    }

    pub(crate) fn record_error(&self, message: String) {
        write(&self.error).get_or_insert(message);
    }

    /// Move to a terminal state and notify `finished` subscribers.
    pub(crate) fn conclude(&self, state: JobState, exit: Option<WorkerExit>) {
        if state == JobState::Finished {
            self.progress.store(100, Ordering::Release);
        }
        *write(&self.exit) = exit;
        *write(&self.finished_at) = Some(Utc::now());
        self.alive.store(false, Ordering::Release);
        self.state.send_replace(state);
        self.finished.emit(self.id);
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.config.name())
            .field("handle", &self.worker.handle)
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
