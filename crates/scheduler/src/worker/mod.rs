//! The worker-process side of a job.
//!
//! Split into focused submodules:
//! - `protocol`: stdout frame format and environment variable names
//! - `handle`: the `Handle` trait, closure adapter, and name registry
//! - `sink`: progress channel writer handed to a running handle
//! - `store`: JSON-file result store shared with the supervisor
//! - `entry`: worker-process entrypoint and exit codes

mod entry;
mod handle;
pub mod protocol;
pub(crate) mod sink;
mod store;

use std::path::PathBuf;

pub use entry::{
    execute, exit_status, run_invocation, run_worker, WorkerInvocation, EXIT_HANDLE_FAILED,
    EXIT_USAGE,
};
pub use handle::{FnHandle, Handle, HandleRegistry};
pub use protocol::{Frame, ProgressUpdate};
pub use sink::ProgressSink;
pub use store::ResultStore;

/// File name of the worker binary shipped with this crate.
pub const WORKER_BIN: &str = "jobvisor-worker";

/// `jobvisor-worker` next to the current executable, falling back to a
/// `PATH` lookup when the current executable cannot be resolved.
pub fn default_worker_program() -> PathBuf {
    let file_name = format!("{WORKER_BIN}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .unwrap_or_else(|| PathBuf::from(file_name))
}
