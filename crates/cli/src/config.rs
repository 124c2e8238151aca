use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use jobvisor_scheduler::SchedulerConfig;

/// Load the scheduler config from `path`, or from `JOBVISOR_*` variables
/// when no file is given.
pub fn load_scheduler_config(path: Option<&Path>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => {
            debug!(config_path = %path.display(), "Loading scheduler config");
            SchedulerConfig::from_file(path)
                .with_context(|| format!("failed to load scheduler config: {}", path.display()))
        }
        None => {
            debug!("No config file, reading scheduler config from environment");
            SchedulerConfig::from_env().context("invalid JOBVISOR_* environment")
        }
    }
}

/// Command-line overrides win over file and environment values.
pub fn apply_overrides(config: &mut SchedulerConfig, worker_bin: Option<PathBuf>) {
    if let Some(program) = worker_bin {
        config.worker_program = Some(program);
    }
    // The CLI drives dispatch itself once every job is queued.
    config.autostart = false;
}
