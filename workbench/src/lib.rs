//! Workbench CLI library: session context, prepare/run orchestration, and
//! the command handlers behind the `workbench` binary.

mod cli;
mod commands;
pub mod orchestrator;
pub mod session;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use workbench_core::observability::{init_tracing, TracingMode};

pub use orchestrator::{Orchestrator, PrepareReport, PrepareState};
pub use session::{Session, SessionConfig};

/// Run the CLI: parse args, set up tracing and the runtime, dispatch.
/// Returns the process exit code.
pub fn run_cli() -> Result<i32> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, Commands::Shell { .. });
    init_tracing(if interactive {
        TracingMode::Interactive
    } else {
        TracingMode::Default
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(dispatch(cli.command))
}

async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Prepare {
            project_dir,
            prepare,
        } => commands::prepare::cmd_prepare(&project_dir, &prepare).await,
        Commands::Run {
            project_dir,
            prepare,
            start_command,
            force,
        } => commands::run::cmd_run(&project_dir, &prepare, start_command, force).await,
        Commands::Shell { project_dir } => commands::shell::cmd_shell(&project_dir).await,
        Commands::Scan { project_dir, json } => commands::scan::cmd_scan(&project_dir, json),
        Commands::Cache { action } => commands::cache::cmd_cache(action).await,
    }
}
