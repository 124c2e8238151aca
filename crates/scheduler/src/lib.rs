//! Job scheduling and worker-process supervision.
//!
//! A [`Job`] pairs a validated [`Configuration`](jobvisor_core::Configuration)
//! with a [`WorkerSpec`] naming the handle to run. The [`JobScheduler`] moves
//! jobs through queue → busy → done under a concurrency cap, starting each
//! one as an isolated `jobvisor-worker` process whose progress frames are
//! streamed back and applied to the job while it runs.

pub mod error;
pub mod handles;
pub mod job;
pub mod metrics;
pub mod scheduler;
pub mod types;
pub mod worker;

pub use error::{HandleError, JobError, SchedulerError, StoreError, WorkerError};
pub use job::{
    Job, JobId, JobIdAllocator, JobState, LiveResult, LiveUpdate, ResultMap, WorkerExit,
    WorkerSpec,
};
pub use metrics::SchedulerMetrics;
pub use scheduler::{JobScheduler, Stage};
pub use types::{SchedulerConfig, SupervisionTiming};
pub use worker::{
    default_worker_program, run_worker, FnHandle, Frame, Handle, HandleRegistry, ProgressSink,
    ProgressUpdate, ResultStore,
};

#[cfg(test)]
pub(crate) mod testing;
