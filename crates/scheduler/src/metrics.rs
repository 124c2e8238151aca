use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Jobs accepted into the queue.
    pub jobs_enqueued: u64,
    /// Jobs moved from queue to busy.
    pub jobs_dispatched: u64,
    /// Jobs that finished successfully, by handle.
    pub jobs_finished: HashMap<String, u64>,
    /// Jobs that failed, by handle.
    pub jobs_failed: HashMap<String, u64>,
    /// Average job duration by handle.
    pub avg_job_duration: HashMap<String, Duration>,
    /// Last completion time by handle.
    pub last_finished: HashMap<String, DateTime<Utc>>,
    /// Busy jobs over the concurrency cap at the last change (0.0 - 1.0+).
    pub busy_utilization: f64,
    /// Completions with a known duration, by handle.
    #[serde(skip)]
    timed: HashMap<String, u64>,
}

impl SchedulerMetrics {
    /// Record a completed job.
    pub fn record_completion(&mut self, handle: &str, succeeded: bool, duration: Option<Duration>) {
        let bucket = if succeeded {
            &mut self.jobs_finished
        } else {
            &mut self.jobs_failed
        };
        *bucket.entry(handle.to_string()).or_default() += 1;
        self.last_finished.insert(handle.to_string(), Utc::now());

        if let Some(duration) = duration {
            self.record_duration(handle, duration);
        }
    }

    /// Total completions (finished + failed) for a handle.
    pub fn completed(&self, handle: &str) -> u64 {
        self.jobs_finished.get(handle).copied().unwrap_or_default()
            + self.jobs_failed.get(handle).copied().unwrap_or_default()
    }

    pub fn update_utilization(&mut self, busy: usize, cap: usize) {
        self.busy_utilization = if cap == 0 {
            0.0
        } else {
            busy as f64 / cap as f64
        };
    }

    fn record_duration(&mut self, handle: &str, duration: Duration) {
        let count = {
            let timed = self.timed.entry(handle.to_string()).or_default();
            *timed += 1;
            *timed
        };
        let prev_avg = self
            .avg_job_duration
            .get(handle)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count <= 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_job_duration.insert(handle.to_string(), new_avg);
    }
}
