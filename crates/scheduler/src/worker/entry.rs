use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use jobvisor_core::env::env_opt;
use jobvisor_core::Configuration;

use crate::error::WorkerError;

use super::protocol::{HANDLE_ENV, RESULT_STORE_ENV};
use super::{HandleRegistry, ProgressSink, ResultStore};

/// Exit code when the handle itself failed.
pub const EXIT_HANDLE_FAILED: u8 = 1;
/// Exit code when the worker could not run the handle at all.
pub const EXIT_USAGE: u8 = 2;

/// What a worker process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub handle: String,
    pub result_store: PathBuf,
}

impl WorkerInvocation {
    /// Read `JOBVISOR_HANDLE` and `JOBVISOR_RESULT_STORE`.
    pub fn from_env() -> Result<Self, WorkerError> {
        Ok(Self {
            handle: env_opt(HANDLE_ENV).ok_or(WorkerError::MissingEnv(HANDLE_ENV))?,
            result_store: env_opt(RESULT_STORE_ENV)
                .map(PathBuf::from)
                .ok_or(WorkerError::MissingEnv(RESULT_STORE_ENV))?,
        })
    }
}

/// Worker-process entrypoint: environment for the handle and store,
/// configuration JSON on stdin, progress frames on stdout.
pub fn run_worker(registry: &HandleRegistry) -> ExitCode {
    match WorkerInvocation::from_env() {
        Ok(invocation) => run_invocation(registry, &invocation),
        Err(e) => {
            error!(error = %e, "cannot start worker");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Run one invocation against stdin/stdout and map the outcome to an exit code.
pub fn run_invocation(registry: &HandleRegistry, invocation: &WorkerInvocation) -> ExitCode {
    let mut sink = ProgressSink::stdout();
    let outcome = execute(registry, invocation, io::stdin().lock(), &mut sink);
    ExitCode::from(exit_status(outcome, &mut sink))
}

/// Decode the configuration from `input` and run the requested handle.
pub fn execute(
    registry: &HandleRegistry,
    invocation: &WorkerInvocation,
    mut input: impl Read,
    sink: &mut ProgressSink,
) -> Result<(), WorkerError> {
    let handle = registry
        .get(&invocation.handle)
        .ok_or_else(|| WorkerError::UnknownHandle(invocation.handle.clone()))?;

    let mut raw = String::new();
    input.read_to_string(&mut raw).map_err(WorkerError::Stdin)?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    let config = Configuration::from_json(&json)?;
    let mut store = ResultStore::open(&invocation.result_store)?;

    info!(handle = %invocation.handle, config = %config.name(), "running handle");
    handle.run(&config, sink, &mut store)?;
    info!(
        handle = %invocation.handle,
        frames = sink.frames_sent(),
        stored = store.len(),
        "handle completed"
    );
    Ok(())
}

/// Map an outcome to the process exit status. Handle failures are also
/// reported on the progress channel as an error frame.
pub fn exit_status(outcome: Result<(), WorkerError>, sink: &mut ProgressSink) -> u8 {
    match outcome {
        Ok(()) => 0,
        Err(WorkerError::Handle(e)) => {
            error!(error = %e, "handle failed");
            if let Err(io) = sink.error(&e.to_string()) {
                error!(error = %io, "could not report failure on the progress channel");
            }
            EXIT_HANDLE_FAILED
        }
        Err(e) => {
            error!(error = %e, "worker could not run the handle");
            EXIT_USAGE
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::HandleError;
    use crate::worker::protocol::Frame;
    use crate::worker::sink::tests::SharedBuf;
    use crate::worker::FnHandle;

    const CONFIG: &str = r#"{"run_a": {"train": {"x": 1, "tags": ["a", "b"]}}}"#;

    fn registry() -> HandleRegistry {
        let mut registry = HandleRegistry::new();
        registry
            .register(FnHandle::new(
                "copy",
                |config: &Configuration, progress: &mut ProgressSink, store: &mut ResultStore| {
                    for (_, param, value) in config.parameters() {
                        store.insert(param, value.to_json())?;
                    }
                    progress.progress(100)
                },
            ))
            .unwrap();
        registry
            .register(FnHandle::new(
                "broken",
                |_: &Configuration, _: &mut ProgressSink, _: &mut ResultStore| {
                    Err(HandleError::Failed("exploded".into()))
                },
            ))
            .unwrap();
        registry
    }

    fn invocation(handle: &str, dir: &tempfile::TempDir) -> WorkerInvocation {
        WorkerInvocation {
            handle: handle.into(),
            result_store: dir.path().join("result.json"),
        }
    }

    #[test]
    fn invocation_from_env() {
        std::env::set_var(HANDLE_ENV, "copy");
        std::env::remove_var(RESULT_STORE_ENV);
        assert!(matches!(
            WorkerInvocation::from_env(),
            Err(WorkerError::MissingEnv(name)) if name == RESULT_STORE_ENV
        ));

        std::env::set_var(RESULT_STORE_ENV, "/tmp/result.json");
        let inv = WorkerInvocation::from_env().unwrap();
        assert_eq!(inv.handle, "copy");
        assert_eq!(inv.result_store, PathBuf::from("/tmp/result.json"));

        std::env::remove_var(HANDLE_ENV);
        std::env::remove_var(RESULT_STORE_ENV);
    }

    #[test]
    fn runs_handle_against_stdin_config() {
        let dir = tempfile::tempdir().unwrap();
        let inv = invocation("copy", &dir);
        let buf = SharedBuf::default();
        let mut sink = ProgressSink::new(buf.clone());

        execute(&registry(), &inv, CONFIG.as_bytes(), &mut sink).unwrap();

        let stored = ResultStore::read(&inv.result_store).unwrap();
        assert_eq!(stored["x"], json!(1));
        assert_eq!(stored["tags"], json!(["a", "b"]));
        assert_eq!(buf.lines(), [r#"{"kind":"update","values":{"progress":100}}"#]);
    }

    #[test]
    fn unknown_handle_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ProgressSink::new(SharedBuf::default());
        let err = execute(&registry(), &invocation("nope", &dir), CONFIG.as_bytes(), &mut sink)
            .unwrap_err();
        assert!(matches!(err, WorkerError::UnknownHandle(ref name) if name == "nope"));
        assert_eq!(exit_status(Err(err), &mut sink), EXIT_USAGE);
    }

    #[test]
    fn invalid_config_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ProgressSink::new(SharedBuf::default());

        let not_json = execute(&registry(), &invocation("copy", &dir), &b"not json"[..], &mut sink);
        assert!(matches!(not_json, Err(WorkerError::InputFormat(_))));

        let bad_shape = execute(
            &registry(),
            &invocation("copy", &dir),
            &br#"{"a": {"g": {"p": null}}}"#[..],
            &mut sink,
        );
        assert!(matches!(bad_shape, Err(WorkerError::Input(_))));
    }

    #[test]
    fn handle_failure_sends_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let buf = SharedBuf::default();
        let mut sink = ProgressSink::new(buf.clone());

        let outcome = execute(&registry(), &invocation("broken", &dir), CONFIG.as_bytes(), &mut sink);
        assert_eq!(exit_status(outcome, &mut sink), EXIT_HANDLE_FAILED);

        let lines = buf.lines();
        assert_eq!(
            Frame::parse(&lines[0]),
            Some(Frame::Error {
                message: "exploded".into()
            })
        );
    }
}
