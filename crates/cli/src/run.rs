use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use jobvisor_core::load_configurations;
use jobvisor_scheduler::{
    Job, JobId, JobScheduler, JobState, ResultMap, SchedulerConfig, SchedulerMetrics, WorkerExit,
};

use crate::cli::RunArgs;
use crate::config::apply_overrides;

/// Outcome of one job, as written to the run report.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub name: String,
    pub handle: String,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<WorkerExit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: ResultMap,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id(),
            name: job.name().to_string(),
            handle: job.handle().to_string(),
            state: job.state(),
            progress: job.progress(),
            exit: job.exit(),
            error: job.error(),
            duration_ms: job.duration().map(|d| d.as_millis() as u64),
            started_at: job.started_at(),
            finished_at: job.finished_at(),
            result: job.result(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    pub metrics: SchedulerMetrics,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.jobs.iter().filter(|j| j.state == JobState::Failed).count()
    }
}

/// Queue every configuration in `args.file`, dispatch until idle (or Ctrl-C)
/// and emit the JSON report.
pub async fn run(mut config: SchedulerConfig, args: RunArgs) -> Result<()> {
    let configs = load_configurations(&args.file)
        .with_context(|| format!("failed to load configurations: {}", args.file.display()))?;
    if configs.is_empty() {
        bail!("no configurations in {}", args.file.display());
    }

    apply_overrides(&mut config, args.worker_bin);
    let scheduler = JobScheduler::new(config);
    if let Some(requested) = args.concurrency {
        scheduler.set_concurrency(requested);
    }

    let mut jobs: Vec<Arc<Job>> = Vec::with_capacity(configs.len());
    for config in configs {
        let job = scheduler.submit(config, scheduler.worker_spec(&args.handle))?;
        let name = job.name().to_string();
        job.live_update_signal().connect(move |update| {
            info!(job = %update.job_id, name = %name, progress = update.progress, "progress");
        });
        jobs.push(job);
    }

    info!(
        jobs = jobs.len(),
        handle = %args.handle,
        concurrency = scheduler.available_kernels(),
        "Starting run"
    );
    scheduler.start();
    let dispatch = scheduler.spawn();

    tokio::select! {
        _ = scheduler.wait_idle() => {
            info!("All jobs finished");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(
                queued = scheduler.queue_jobs().len(),
                busy = scheduler.busy_jobs().len(),
                "Interrupted, stopping dispatch"
            );
            scheduler.pause();
        }
    }
    scheduler.shutdown();
    dispatch.await.context("dispatch loop panicked")?;

    let report = RunReport {
        jobs: jobs.iter().map(|job| JobReport::from_job(job)).collect(),
        metrics: scheduler.metrics(),
    };
    write_report(&report, args.output.as_deref())?;

    let failed = report.failed();
    if failed > 0 {
        bail!("{failed} of {} jobs failed", report.jobs.len());
    }
    Ok(())
}

fn write_report(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report: {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
