//! `workbench run`: prepare, then keep the start command running until it
//! exits or the user interrupts.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use workbench_sandbox::StdoutSink;

use super::open_workspace;
use super::prepare::{exit_code_for, print_summary};
use crate::cli::PrepareArgs;

pub async fn cmd_run(
    project_dir: &str,
    prepare: &PrepareArgs,
    start_command: Option<String>,
    force: bool,
) -> Result<i32> {
    let (mut project, orchestrator) = open_workspace(project_dir, prepare, start_command).await?;
    let report = orchestrator.prepare(&mut project, &StdoutSink).await;
    print_summary(&report);
    if !report.succeeded() && !force {
        eprintln!("Not starting: preparation failed (use --force to start anyway)");
        return Ok(exit_code_for(&report));
    }

    let mut ready = orchestrator.server_ready();
    tokio::spawn(async move {
        loop {
            match ready.recv().await {
                Ok(event) => eprintln!("Server ready on port {}: {}", event.port, event.url),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut handle = orchestrator.start(Arc::new(StdoutSink))?;
    let code = tokio::select! {
        code = handle.wait() => code,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, stopping '{}'", handle.command());
            handle.cancel();
            handle.wait().await
        }
    };
    Ok(code)
}
