use thiserror::Error;

use crate::job::JobId;

/// Errors raised by a job's lifecycle operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} has already been started")]
    AlreadyStarted(JobId),

    #[error("job {0}: once set, the final result is immutable")]
    ResultAlreadySet(JobId),

    #[error("job {job}: failed to spawn worker process: {source}")]
    Spawn {
        job: JobId,
        #[source]
        source: std::io::Error,
    },

    #[error("job {0}: worker process pipe was not captured")]
    MissingPipe(JobId),

    #[error("result store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors reading or writing the shared result store file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("result store is not a JSON object: {0}")]
    Format(#[from] serde_json::Error),
}

/// Failure reported by a handle running inside a worker process.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("{0}")]
    Failed(String),

    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("progress channel closed: {0}")]
    Channel(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the worker-process entrypoint before or around the handle.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no handle named '{0}' is registered")]
    UnknownHandle(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration on stdin: {0}")]
    Input(#[from] jobvisor_core::CoreError),

    #[error("configuration on stdin is not JSON: {0}")]
    InputFormat(#[from] serde_json::Error),

    #[error("failed to read configuration from stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("handle failed: {0}")]
    Handle(#[from] HandleError),
}

/// Scheduler errors. [`SchedulerError::NotBusy`] is an internal invariant violation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler invariant violated: finished job {0} is not tracked as busy")]
    NotBusy(JobId),

    #[error("job {0} is not in the created state")]
    NotCreated(JobId),

    #[error("job {0} is already tracked by this scheduler")]
    AlreadyTracked(JobId),

    #[error("job {0} is not tracked by this scheduler")]
    UnknownJob(JobId),

    #[error("duplicate handle name '{0}'")]
    DuplicateHandle(String),

    #[error("invalid scheduler config: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
