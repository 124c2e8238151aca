use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use jobvisor_core::env::{env_flag, env_opt, env_parse, load_dotenv};

use crate::error::SchedulerError;

/// Scheduler configuration, parsed from TOML or the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Parallelism ceiling. 0 = host available parallelism.
    #[serde(default)]
    pub max_kernels: usize,
    /// Initial concurrency cap. 0 = `max_kernels`.
    #[serde(default)]
    pub available_kernels: usize,
    /// Dispatch tick period in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Bounded wait for one progress frame in milliseconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// How long to wait for buffered frames after worker exit, in milliseconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
    /// Start dispatching immediately after construction.
    #[serde(default)]
    pub autostart: bool,
    /// Worker binary used by [`JobScheduler::worker_spec`](crate::JobScheduler::worker_spec).
    /// `None` = `jobvisor-worker` next to the current executable.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
}

fn default_tick_interval() -> u64 { 200 }
fn default_read_timeout() -> u64 { 500 }
fn default_drain_timeout() -> u64 { 2000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_kernels: 0,
            available_kernels: 0,
            tick_interval_ms: default_tick_interval(),
            read_timeout_ms: default_read_timeout(),
            drain_timeout_ms: default_drain_timeout(),
            autostart: false,
            worker_program: None,
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from `JOBVISOR_*` environment variables (loads `.env` first).
    pub fn from_env() -> Result<Self, SchedulerError> {
        load_dotenv();
        let defaults = Self::default();
        let config = Self {
            max_kernels: env_parse("JOBVISOR_MAX_KERNELS", defaults.max_kernels),
            available_kernels: env_parse("JOBVISOR_AVAILABLE_KERNELS", defaults.available_kernels),
            tick_interval_ms: env_parse("JOBVISOR_TICK_INTERVAL_MS", defaults.tick_interval_ms),
            read_timeout_ms: env_parse("JOBVISOR_READ_TIMEOUT_MS", defaults.read_timeout_ms),
            drain_timeout_ms: env_parse("JOBVISOR_DRAIN_TIMEOUT_MS", defaults.drain_timeout_ms),
            autostart: env_flag("JOBVISOR_AUTOSTART", defaults.autostart),
            worker_program: env_opt("JOBVISOR_WORKER_PROGRAM").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero-length intervals.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for (field, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(SchedulerError::Config(format!("{field} must be greater than 0")));
            }
        }
        Ok(())
    }

    /// Resolve the parallelism ceiling (0 means use available parallelism).
    pub fn resolved_max_kernels(&self) -> usize {
        if self.max_kernels == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.max_kernels
        }
    }

    /// Resolve the initial concurrency cap, clamped to `[1, max_kernels]`.
    pub fn resolved_available_kernels(&self, max_kernels: usize) -> usize {
        match self.available_kernels {
            0 => max_kernels,
            n => n.clamp(1, max_kernels.max(1)),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn supervision(&self) -> SupervisionTiming {
        SupervisionTiming {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }
}

/// Timing knobs for a job's supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionTiming {
    /// Bounded wait for one progress frame while the worker is alive.
    pub read_timeout: Duration,
    /// Upper bound on waiting for the stdout reader to hit EOF after exit.
    pub drain_timeout: Duration,
}

impl Default for SupervisionTiming {
    fn default() -> Self {
        SchedulerConfig::default().supervision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_kernels, 0);
        assert_eq!(config.available_kernels, 0);
        assert_eq!(config.tick_interval_ms, 200);
        assert_eq!(config.read_timeout_ms, 500);
        assert_eq!(config.drain_timeout_ms, 2000);
        assert!(!config.autostart);
        assert!(config.worker_program.is_none());
    }

    #[test]
    fn resolved_max_kernels() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_max_kernels() > 0);

        config.max_kernels = 8;
        assert_eq!(config.resolved_max_kernels(), 8);
    }

    #[test]
    fn resolved_available_kernels_clamps() {
        let mut config = SchedulerConfig::default();
        assert_eq!(config.resolved_available_kernels(4), 4);

        config.available_kernels = 16;
        assert_eq!(config.resolved_available_kernels(4), 4);

        config.available_kernels = 2;
        assert_eq!(config.resolved_available_kernels(4), 2);
    }

    #[test]
    fn parse_partial_toml() {
        let config = SchedulerConfig::from_toml(
            r#"
max_kernels = 4
tick_interval_ms = 50
worker_program = "/opt/jobvisor/jobvisor-worker"
"#,
        )
        .unwrap();
        assert_eq!(config.max_kernels, 4);
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.read_timeout_ms, 500);
        assert_eq!(
            config.worker_program.as_deref(),
            Some(Path::new("/opt/jobvisor/jobvisor-worker"))
        );
    }

    #[test]
    fn zero_tick_interval_rejected() {
        let err = SchedulerConfig::from_toml("tick_interval_ms = 0").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(msg) if msg.contains("tick_interval_ms")));
    }

    #[test]
    fn supervision_timing_from_config() {
        let config = SchedulerConfig {
            read_timeout_ms: 100,
            drain_timeout_ms: 300,
            ..Default::default()
        };
        let timing = config.supervision();
        assert_eq!(timing.read_timeout, Duration::from_millis(100));
        assert_eq!(timing.drain_timeout, Duration::from_millis(300));
    }
}
