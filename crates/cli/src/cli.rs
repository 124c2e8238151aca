use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Run parameter configurations as supervised worker jobs.
///
/// Each configuration in a YAML file becomes one job. Jobs are dispatched
/// to `jobvisor-worker` processes under a concurrency cap.
#[derive(Parser, Debug)]
#[command(name = "jobvisor", about = "Schedule and supervise configuration jobs")]
pub struct CliArgs {
    /// Scheduler config file (TOML). Falls back to JOBVISOR_* variables.
    #[arg(long, global = true, env = "JOBVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a configuration file
    Validate {
        /// YAML file holding one or more configurations
        file: PathBuf,
    },
    /// Run every configuration in a file through one handle
    Run(RunArgs),
    /// List the built-in handles
    Handles,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML file holding one or more configurations
    pub file: PathBuf,

    /// Handle every job runs
    #[arg(long)]
    pub handle: String,

    /// Concurrency cap (clamped to the scheduler's max kernels)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Worker binary override
    #[arg(long)]
    pub worker_bin: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
