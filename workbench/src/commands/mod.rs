//! Command handlers. Each returns the process exit code.

pub mod cache;
pub mod prepare;
pub mod run;
pub mod scan;
pub mod shell;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use workbench_core::project::DirFileStore;

use crate::cli::PrepareArgs;
use crate::orchestrator::Orchestrator;
use crate::session::{Session, SessionConfig};

/// File store over an existing project directory.
pub(crate) fn project_store(project_dir: &str) -> Result<DirFileStore> {
    let root = PathBuf::from(project_dir);
    if !root.is_dir() {
        bail!("Project directory not found: {}", root.display());
    }
    Ok(DirFileStore::new(root))
}

/// Project store plus an orchestrator over a local sandbox. With
/// `--sandbox-dir` the project is copied into that directory first.
pub(crate) async fn open_workspace(
    project_dir: &str,
    prepare: &PrepareArgs,
    start_command: Option<String>,
) -> Result<(DirFileStore, Orchestrator)> {
    let project = project_store(project_dir)?;
    let mut config = SessionConfig::from_env();
    config.commands = config.commands.with_cli_overrides(
        prepare.install_command.clone(),
        start_command,
        prepare.install_timeout_ms,
    );

    let sandbox_root = prepare
        .sandbox_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| project.root().to_path_buf());
    let session = Session::local(&sandbox_root, !prepare.no_persist, config);
    let orchestrator = Orchestrator::new(Arc::new(session));

    if prepare.sandbox_dir.is_some() {
        let files = orchestrator
            .mount_project(&project)
            .await
            .with_context(|| format!("Failed to copy project into {}", sandbox_root.display()))?;
        tracing::info!(files, sandbox = %sandbox_root.display(), "Project mounted");
    }
    Ok((project, orchestrator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_store_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(project_store(&dir.path().join("missing").to_string_lossy()).is_err());
        assert!(project_store(&dir.path().to_string_lossy()).is_ok());
    }

    #[tokio::test]
    async fn test_open_workspace_copies_project_into_sandbox_dir() {
        let project = tempfile::tempdir().unwrap();
        let sandbox = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project.path().join("src")).unwrap();
        std::fs::write(project.path().join("package.json"), "{}").unwrap();
        std::fs::write(project.path().join("src/main.js"), "import 'x'").unwrap();

        let args = PrepareArgs {
            sandbox_dir: Some(sandbox.path().to_string_lossy().to_string()),
            no_persist: true,
            ..PrepareArgs::default()
        };
        let (store, _orchestrator) =
            open_workspace(&project.path().to_string_lossy(), &args, None)
                .await
                .unwrap();
        assert_eq!(store.root(), project.path());
        assert_eq!(
            std::fs::read_to_string(sandbox.path().join("src/main.js")).unwrap(),
            "import 'x'"
        );
    }
}
