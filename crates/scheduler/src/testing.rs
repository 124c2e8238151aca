//! Shared fixtures for unit tests: inline `sh` workers and small configurations.

use std::time::Duration;

use jobvisor_core::{Configuration, Group, ParamValue, Settings};

use crate::job::WorkerSpec;
use crate::types::{SchedulerConfig, SupervisionTiming};

pub(crate) const INLINE: &str = "inline";

/// Single-group configuration `{name: {params: {x: 1}}}`.
pub(crate) fn config(name: &str) -> Configuration {
    let mut group = Group::new();
    group.insert("x".into(), ParamValue::Int(1));
    let mut settings = Settings::new();
    settings.insert("params".into(), group);
    Configuration::new(name, settings).unwrap()
}

/// Worker that runs `script` under `sh -c`.
pub(crate) fn sh(script: &str) -> WorkerSpec {
    WorkerSpec::new("sh", INLINE).arg("-c").arg(script)
}

pub(crate) fn missing_program() -> WorkerSpec {
    WorkerSpec::new("/nonexistent/jobvisor-worker", INLINE)
}

pub(crate) fn fast_timing() -> SupervisionTiming {
    SupervisionTiming {
        read_timeout: Duration::from_millis(50),
        drain_timeout: Duration::from_secs(2),
    }
}

pub(crate) fn scheduler_config(max_kernels: usize, available_kernels: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_kernels,
        available_kernels,
        tick_interval_ms: 20,
        read_timeout_ms: 50,
        drain_timeout_ms: 2000,
        ..Default::default()
    }
}

/// Update frame line for use inside `echo '...'`.
pub(crate) fn update_frame(values: &str) -> String {
    format!(r#"{{"kind":"update","values":{values}}}"#)
}
