//! End-to-end scheduling through the real `jobvisor-worker` binary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use jobvisor_core::{parse_configurations, Configuration};
use jobvisor_scheduler::{JobScheduler, JobState, SchedulerConfig, Stage, WorkerSpec};

const WAIT: Duration = Duration::from_secs(30);

fn worker_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_jobvisor-worker"))
}

fn scheduler(available_kernels: usize) -> JobScheduler {
    JobScheduler::new(SchedulerConfig {
        max_kernels: 4,
        available_kernels,
        tick_interval_ms: 20,
        read_timeout_ms: 100,
        drain_timeout_ms: 2000,
        worker_program: Some(worker_bin()),
        ..Default::default()
    })
}

fn config(yaml: &str) -> Configuration {
    parse_configurations(yaml).unwrap().remove(0)
}

fn ramp(name: &str, steps: i64, delay_ms: i64) -> Configuration {
    config(&format!("{name}:\n  ramp:\n    steps: {steps}\n    delay_ms: {delay_ms}\n"))
}

fn sleeper(name: &str, duration_ms: i64) -> Configuration {
    config(&format!("{name}:\n  sleep:\n    duration_ms: {duration_ms}\n"))
}

async fn drain(scheduler: &JobScheduler) {
    scheduler.start();
    let handle = scheduler.spawn();
    timeout(WAIT, scheduler.wait_idle()).await.unwrap();
    scheduler.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn progress_only_handle_keeps_live_result() {
    let scheduler = scheduler(1);
    let job = scheduler
        .submit(ramp("ramp_run", 10, 5), scheduler.worker_spec("ramp"))
        .unwrap();
    let mut updates = job.live_update_signal().subscribe();

    drain(&scheduler).await;

    assert_eq!(job.state(), JobState::Finished);
    let mut progress = Vec::new();
    while let Ok(update) = updates.try_recv() {
        progress.push(update.progress);
    }
    assert_eq!(progress, (1..=10).map(|i| i * 10).collect::<Vec<u8>>());

    let live = job.live_result().to_result_map();
    assert_eq!(job.final_result(), Some(&live));
    assert_eq!(live["step"], json!((1..=10).collect::<Vec<i64>>()));
}

#[tokio::test]
async fn store_handle_result_is_final() {
    let scheduler = scheduler(1);
    let job = scheduler
        .submit(config("store_run:\n  params:\n    x: 1\n"), scheduler.worker_spec("store"))
        .unwrap();

    drain(&scheduler).await;

    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(serde_json::to_value(job.result()).unwrap(), json!({"x": 1}));
}

#[tokio::test]
async fn one_tick_fills_the_cap() {
    let scheduler = scheduler(2);
    let jobs: Vec<_> = (0..3)
        .map(|i| {
            scheduler
                .submit(sleeper(&format!("long_{i}"), 500), scheduler.worker_spec("sleep"))
                .unwrap()
        })
        .collect();
    scheduler.start();

    assert_eq!(scheduler.tick(), 2);
    assert_eq!(scheduler.busy_jobs().len(), 2);
    assert_eq!(scheduler.queue_jobs().len(), 1);
    assert_eq!(scheduler.stage_of(jobs[2].id()), Some(Stage::Queued));

    drain(&scheduler).await;
    assert_eq!(scheduler.done_jobs().len(), 3);
}

#[tokio::test]
async fn lowered_cap_waits_for_a_running_job() {
    let scheduler = scheduler(2);
    let first = scheduler
        .submit(sleeper("a", 400), scheduler.worker_spec("sleep"))
        .unwrap();
    let second = scheduler
        .submit(sleeper("b", 400), scheduler.worker_spec("sleep"))
        .unwrap();
    let third = scheduler
        .submit(sleeper("c", 50), scheduler.worker_spec("sleep"))
        .unwrap();
    scheduler.start();
    assert_eq!(scheduler.tick(), 2);

    scheduler.set_concurrency(1);
    assert_eq!(scheduler.tick(), 0);
    assert_eq!(scheduler.busy_jobs().len(), 2);
    assert_eq!(third.state(), JobState::Created);

    drain(&scheduler).await;

    assert_eq!(first.state(), JobState::Finished);
    assert_eq!(second.state(), JobState::Finished);
    let third_started = third.started_at().unwrap();
    assert!(third_started >= first.finished_at().unwrap());
    assert!(third_started >= second.finished_at().unwrap());
}

#[tokio::test]
async fn finished_job_moves_to_done_with_one_notification() {
    let scheduler = scheduler(1);
    let done_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done_events);
    scheduler.done_changed().connect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let job = scheduler
        .submit(ramp("one", 2, 5), scheduler.worker_spec("ramp"))
        .unwrap();
    drain(&scheduler).await;

    assert!(scheduler.busy_jobs().is_empty());
    assert_eq!(scheduler.stage_of(job.id()), Some(Stage::Done));
    assert_eq!(done_events.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispatch_is_fifo_with_one_kernel() {
    let scheduler = scheduler(1);
    let jobs: Vec<_> = ["A", "B", "C"]
        .iter()
        .map(|name| {
            scheduler
                .submit(ramp(name, 2, 5), scheduler.worker_spec("ramp"))
                .unwrap()
        })
        .collect();

    drain(&scheduler).await;

    let done: Vec<_> = scheduler.done_jobs().iter().map(|j| j.name().to_string()).collect();
    assert_eq!(done, ["A", "B", "C"]);
    for pair in jobs.windows(2) {
        assert!(pair[0].finished_at().unwrap() <= pair[1].started_at().unwrap());
    }
}

#[tokio::test]
async fn failing_handle_is_reported() {
    let scheduler = scheduler(2);
    let bad = scheduler
        .submit(
            config("bad:\n  params:\n    message: \"no data\"\n    progress: 20\n"),
            scheduler.worker_spec("fail"),
        )
        .unwrap();
    let good = scheduler
        .submit(ramp("good", 2, 5), scheduler.worker_spec("ramp"))
        .unwrap();

    drain(&scheduler).await;

    assert_eq!(bad.state(), JobState::Failed);
    assert_eq!(bad.error().as_deref(), Some("no data"));
    assert_eq!(bad.progress(), 20);
    assert_eq!(good.state(), JobState::Finished);
    assert_eq!(scheduler.metrics().jobs_failed["fail"], 1);
}

#[tokio::test]
async fn unknown_handle_exits_with_usage_error() {
    let scheduler = scheduler(1);
    let job = scheduler
        .submit(ramp("x", 1, 0), scheduler.worker_spec("no_such_handle"))
        .unwrap();

    drain(&scheduler).await;

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.exit().map(|e| e.to_string()).as_deref(), Some("exit code 2"));
}

#[tokio::test]
async fn echo_handle_sees_the_whole_configuration() {
    let scheduler = scheduler(1);
    let job = scheduler
        .submit(
            config("echoed:\n  model:\n    layers: [64, 32]\n  data:\n    path: \"train.csv\"\n"),
            WorkerSpec::new(worker_bin(), "echo"),
        )
        .unwrap();

    drain(&scheduler).await;

    let result = job.result();
    assert_eq!(result["name"], json!("echoed"));
    assert_eq!(
        result["settings"],
        json!({"model": {"layers": [64, 32]}, "data": {"path": "train.csv"}})
    );
}

#[tokio::test]
async fn worker_binary_lists_builtins() {
    let output = tokio::process::Command::new(worker_bin())
        .arg("--list")
        .output()
        .await
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for name in ["ramp", "store", "sleep", "fail", "echo"] {
        assert!(stdout.contains(name), "missing {name} in {stdout}");
    }
}

#[tokio::test]
async fn worker_binary_without_environment_is_a_usage_error() {
    let output = tokio::process::Command::new(worker_bin())
        .env_remove("JOBVISOR_HANDLE")
        .env_remove("JOBVISOR_RESULT_STORE")
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn worker_binary_flags_run_one_invocation() {
    use tokio::io::AsyncWriteExt;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("result.json");
    let mut child = tokio::process::Command::new(worker_bin())
        .args(["--handle", "store", "--result-store"])
        .arg(&store)
        .env_remove("JOBVISOR_HANDLE")
        .env_remove("JOBVISOR_RESULT_STORE")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(br#"{"manual": {"g": {"x": 3}}}"#).await.unwrap();
    drop(stdin);

    let output = child.wait_with_output().await.unwrap();
    assert!(output.status.success());
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(stored, json!({"x": 3}));
}
