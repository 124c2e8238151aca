//! Wire format between a worker process and its supervisor.
//!
//! The worker writes one JSON object per line to stdout. Lines that do not
//! decode as a [`Frame`] are ignored, so stray prints from a handle never
//! break the channel.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable carrying the handle name.
pub const HANDLE_ENV: &str = "JOBVISOR_HANDLE";
/// Environment variable carrying the result-store file path.
pub const RESULT_STORE_ENV: &str = "JOBVISOR_RESULT_STORE";
/// Reserved key inside an update frame holding the 0–100 progress value.
pub const PROGRESS_KEY: &str = "progress";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Progress and/or metric values.
    Update { values: IndexMap<String, Value> },
    /// The handle failed; the worker exits nonzero right after.
    Error { message: String },
}

impl Frame {
    /// Decode one stdout line. `None` for blank or non-protocol lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A progress observation: an optional progress value plus named metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub progress: Option<u8>,
    pub metrics: IndexMap<String, Value>,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn metric(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    /// Split a raw update map. A numeric `progress` entry is taken out and
    /// clamped to 0–100; everything else stays a metric.
    pub fn from_values(mut values: IndexMap<String, Value>) -> Self {
        let progress = values.get(PROGRESS_KEY).and_then(Value::as_f64).map(clamp_progress);
        if progress.is_some() {
            values.shift_remove(PROGRESS_KEY);
        }
        Self {
            progress,
            metrics: values,
        }
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        let mut values = IndexMap::with_capacity(self.metrics.len() + 1);
        if let Some(progress) = self.progress {
            values.insert(PROGRESS_KEY.to_string(), Value::from(progress));
        }
        values.extend(self.metrics);
        values
    }
}

fn clamp_progress(raw: f64) -> u8 {
    raw.clamp(0.0, 100.0).round() as u8
}
