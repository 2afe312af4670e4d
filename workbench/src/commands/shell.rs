//! `workbench shell`: line-oriented bridge from the terminal to the session shell.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use workbench_sandbox::StdoutSink;

use super::project_store;
use crate::session::{Session, SessionConfig};

pub async fn cmd_shell(project_dir: &str) -> Result<i32> {
    let project = project_store(project_dir)?;
    let session = Session::local(project.root(), false, SessionConfig::from_env());
    let shell = session.shell();
    shell
        .start(Arc::new(StdoutSink))
        .await
        .with_context(|| format!("Failed to start shell '{}'", session.config().shell.program))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while shell.is_live().await {
        match lines.next_line().await.context("Failed to read stdin")? {
            Some(line) => shell.write(&format!("{}\n", line)).await,
            None => break,
        }
    }
    shell.dispose().await;
    Ok(0)
}
