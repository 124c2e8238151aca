use std::path::{Path, PathBuf};
use std::process::Stdio;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::worker::protocol::{HANDLE_ENV, RESULT_STORE_ENV};

/// How to launch the worker process for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Worker executable, usually `jobvisor-worker`.
    pub program: PathBuf,
    /// Handle the worker should run, passed as `JOBVISOR_HANDLE`.
    pub handle: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

impl WorkerSpec {
    pub fn new(program: impl Into<PathBuf>, handle: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            handle: handle.into(),
            args: Vec::new(),
            env: IndexMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command with all three stdio pipes captured. The child is killed if
    /// its handle is dropped before it is reaped.
    pub(crate) fn command(&self, store_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .env(HANDLE_ENV, &self.handle)
            .env(RESULT_STORE_ENV, store_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}
