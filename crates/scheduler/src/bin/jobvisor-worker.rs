//! Worker process for jobvisor jobs.
//!
//! Spawned by a job's supervisor with the configuration as JSON on stdin and
//! the handle and result store named in `JOBVISOR_*` variables. The
//! `--handle`/`--result-store` flags run one invocation by hand.
//! Stdout is the progress channel, so all logging goes to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use jobvisor_scheduler::handles::builtin_registry;
use jobvisor_scheduler::worker::{run_invocation, run_worker, WorkerInvocation};

#[derive(Parser, Debug)]
#[command(name = "jobvisor-worker", about = "Run one jobvisor handle against a configuration read from stdin")]
struct Cli {
    /// Handle to run (default: JOBVISOR_HANDLE)
    #[arg(long, requires = "result_store")]
    handle: Option<String>,

    /// Result store file shared with the supervisor (default: JOBVISOR_RESULT_STORE)
    #[arg(long, requires = "handle")]
    result_store: Option<PathBuf>,

    /// List the registered handles and exit
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let registry = builtin_registry();

    if cli.list {
        for handle in registry.iter() {
            println!("{:<8} {}", handle.name(), handle.description());
        }
        return ExitCode::SUCCESS;
    }

    match (cli.handle, cli.result_store) {
        (Some(handle), Some(result_store)) => run_invocation(
            &registry,
            &WorkerInvocation {
                handle,
                result_store,
            },
        ),
        // Spawned by a supervisor: everything comes from the environment.
        _ => run_worker(&registry),
    }
}
