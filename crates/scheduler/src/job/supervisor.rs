//! Worker process supervision.
//!
//! The worker's stdout is the progress channel: a reader task decodes it
//! line by line into [`Frame`]s and forwards them over an mpsc channel. The
//! supervisor task reads that channel with a bounded wait while the worker
//! is alive, then drains what is left once it exits and finalizes the job.

use std::process::ExitStatus;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{JobError, StoreError};
use crate::types::SupervisionTiming;
use crate::worker::protocol::Frame;
use crate::worker::ResultStore;

use super::{Job, JobId, JobState, ResultMap, WorkerExit};

const STORE_FILE: &str = "result.json";

/// Spawn the worker for `job` and hand it to a supervisor task.
pub(super) fn launch(job: Arc<Job>, timing: SupervisionTiming) -> Result<(), JobError> {
    let id = job.id();
    let store_dir = tempfile::Builder::new()
        .prefix("jobvisor-")
        .tempdir()
        .map_err(StoreError::from)?;
    let store_path = store_dir.path().join(STORE_FILE);
    ResultStore::create(&store_path)?;

    let mut child = job
        .worker()
        .command(&store_path)
        .spawn()
        .map_err(|source| JobError::Spawn { job: id, source })?;
    let pid = child.id();

    let stdout = child.stdout.take().ok_or(JobError::MissingPipe(id))?;
    if let Some(stdin) = child.stdin.take() {
        tokio::spawn(feed_config(id, stdin, job.config().to_json().to_string()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(id, stderr));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_frames(id, stdout, tx));

    info!(
        job_id = %id,
        handle = %job.handle(),
        pid = pid.unwrap_or_default(),
        "worker spawned"
    );

    tokio::spawn(supervise(job, child, rx, reader, store_dir, timing));
    Ok(())
}

/// Write the configuration JSON to the worker's stdin, then close it.
async fn feed_config(id: JobId, mut stdin: ChildStdin, payload: String) {
    if let Err(e) = stdin.write_all(payload.as_bytes()).await {
        debug!(job_id = %id, error = %e, "worker did not read its configuration");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(job_id = %id, error = %e, "failed to close worker stdin");
    }
}

async fn forward_stderr(id: JobId, stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    while let Ok(Some(line)) = next_line(&mut reader, &mut buf).await {
        debug!(job_id = %id, "worker: {line}");
    }
}

/// Read one `\n`-terminated line, decoding invalid UTF-8 lossily so a
/// garbled line never ends the stream. `Ok(None)` is EOF.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf[..]);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

async fn read_frames(id: JobId, stdout: ChildStdout, tx: mpsc::UnboundedSender<Frame>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => match Frame::parse(&line) {
                Some(frame) => {
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
                None => debug!(job_id = %id, line = %line, "ignoring non-protocol output"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(job_id = %id, error = %e, "progress channel read failed");
                break;
            }
        }
    }
}

async fn supervise(
    job: Arc<Job>,
    mut child: Child,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    mut reader: JoinHandle<()>,
    store_dir: TempDir,
    timing: SupervisionTiming,
) {
    let id = job.id();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {}
            Err(e) => break Err(e),
        }
        match tokio::time::timeout(timing.read_timeout, frames.recv()).await {
            Ok(Some(frame)) => job.apply_frame(frame),
            // stdout closed; nothing more can arrive, so wait for the exit itself
            Ok(None) => break child.wait().await,
            Err(_) => warn!(
                job_id = %id,
                timeout_ms = timing.read_timeout.as_millis() as u64,
                "no progress from worker within read timeout, retrying"
            ),
        }
    };

    if tokio::time::timeout(timing.drain_timeout, &mut reader)
        .await
        .is_err()
    {
        warn!(job_id = %id, "worker output still open after exit, dropping the rest");
        reader.abort();
    }
    while let Ok(frame) = frames.try_recv() {
        job.apply_frame(frame);
    }

    finalize(&job, &store_dir);
    drop(store_dir);

    let (state, exit) = outcome(&job, status);
    if state == JobState::Finished {
        info!(job_id = %id, "job finished");
    } else {
        let error = job.error().unwrap_or_default();
        warn!(job_id = %id, exit = ?exit, error = %error, "job failed");
    }
    job.conclude(state, exit);
}

/// Final result: the shared store when the worker wrote to it, else the live history.
fn finalize(job: &Job, store_dir: &TempDir) {
    let stored = match ResultStore::read(store_dir.path().join(STORE_FILE)) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(job_id = %job.id(), error = %e, "unreadable result store, using live result");
            ResultMap::new()
        }
    };
    let result = if stored.is_empty() {
        job.live_result().to_result_map()
    } else {
        stored
    };
    if let Err(e) = job.set_final_result(result) {
        warn!(job_id = %job.id(), error = %e, "final result was already set");
    }
}

fn outcome(job: &Job, status: std::io::Result<ExitStatus>) -> (JobState, Option<WorkerExit>) {
    match status {
        Ok(status) => {
            let exit = WorkerExit::from(status);
            if exit.success() {
                (JobState::Finished, Some(exit))
            } else {
                job.record_error(format!("worker exited with {exit}"));
                (JobState::Failed, Some(exit))
            }
        }
        Err(e) => {
            job.record_error(format!("failed to wait for worker: {e}"));
            (JobState::Failed, None)
        }
    }
}
