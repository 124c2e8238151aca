mod cli;
mod config;
mod run;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use jobvisor_core::env::{env_or, load_dotenv};
use jobvisor_core::load_configurations;
use jobvisor_scheduler::handles::builtin_registry;

use crate::cli::{CliArgs, Command};
use crate::config::load_scheduler_config;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    // Stdout carries the run report, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(env_or("JOBVISOR_LOG", "info"))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::Validate { file } => {
            let configs = load_configurations(&file)
                .with_context(|| format!("invalid configuration file: {}", file.display()))?;
            for config in &configs {
                println!("{config}");
            }
            info!(count = configs.len(), file = %file.display(), "Configurations are valid");
        }
        Command::Run(run_args) => {
            let config = load_scheduler_config(args.config.as_deref())?;
            run::run(config, run_args).await?;
        }
        Command::Handles => {
            for handle in builtin_registry().iter() {
                println!("{:<8} {}", handle.name(), handle.description());
            }
        }
    }

    Ok(())
}
