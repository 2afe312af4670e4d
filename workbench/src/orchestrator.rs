//! Prepare-and-run flow.
//!
//! ```text
//! Idle → Scanning → CacheCheck → Skip ──────────────────────────→ Done
//!                              ↘ RestoreLockfile → Installing → Caching → Done
//! Scanning, Installing → Error
//! ```
//!
//! Scanning adds undeclared imports to the manifest, which is then written
//! to the sandbox first and the caller's file store second. The whole flow
//! runs under the install cache's single-flight lock, so an overlapping
//! trigger waits and then finds the cache valid.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use workbench_core::config::split_command_line;
use workbench_core::observability;
use workbench_core::project::{
    resolve_missing, scan_files, Allowlist, FileStore, FileTree, Manifest, MANIFEST_FILE,
};
use workbench_sandbox::log::notice;
use workbench_sandbox::{OutputSink, RunHandle, ServerReady};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareState {
    Idle,
    Scanning,
    CacheCheck,
    Skip,
    RestoreLockfile,
    Installing,
    Caching,
    Done,
    Error,
}

impl fmt::Display for PrepareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::CacheCheck => "cache-check",
            Self::Skip => "skip",
            Self::RestoreLockfile => "restore-lockfile",
            Self::Installing => "installing",
            Self::Caching => "caching",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Outcome of one prepare run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareReport {
    /// Every state entered, starting with `Idle`.
    pub states: Vec<PrepareState>,
    /// Dependencies added to the manifest, sorted.
    pub added: Vec<String>,
    /// Exit code of the install command, when it ran.
    pub exit_code: Option<i32>,
    /// The sandbox got the updated manifest but the project files did not.
    pub manifest_diverged: bool,
}

impl PrepareReport {
    fn new() -> Self {
        Self {
            states: vec![PrepareState::Idle],
            added: Vec::new(),
            exit_code: None,
            manifest_diverged: false,
        }
    }

    pub fn final_state(&self) -> PrepareState {
        self.states.last().copied().unwrap_or(PrepareState::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.final_state() == PrepareState::Done
    }

    pub fn visited(&self, state: PrepareState) -> bool {
        self.states.contains(&state)
    }

    fn enter(&mut self, next: PrepareState) {
        let prev = self.final_state();
        tracing::info!(from = %prev, to = %next, "Prepare transition");
        self.states.push(next);
    }
}

pub struct Orchestrator {
    session: Arc<Session>,
}

impl Orchestrator {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Copy every file of `store` into the sandbox.
    pub async fn mount_project(&self, store: &dyn FileStore) -> Result<usize> {
        let tree = FileTree::from_store(store);
        self.session.sandbox().mount(&tree).await?;
        Ok(tree.file_count())
    }

    /// Scan, resolve, and install if needed. Never fails; the outcome is in
    /// the report and every failure is also written to `sink`.
    pub async fn prepare(&self, store: &mut dyn FileStore, sink: &dyn OutputSink) -> PrepareReport {
        let cache = self.session.cache();
        let _flight = self.session.flights().acquire(cache.key()).await;
        let mut report = PrepareReport::new();

        report.enter(PrepareState::Scanning);
        let Some(manifest) = self.scan(store, sink, &mut report).await else {
            return report;
        };

        report.enter(PrepareState::CacheCheck);
        if !cache.needs_install(&manifest).await {
            sink.emit(&notice("dependencies cached, skipping install"));
            report.enter(PrepareState::Skip);
            report.enter(PrepareState::Done);
            return report;
        }

        report.enter(PrepareState::RestoreLockfile);
        if let Some(name) = cache.restore_lockfile().await {
            sink.emit(&notice(format_args!("restored cached {}", name)));
        }

        report.enter(PrepareState::Installing);
        let commands = &self.session.config().commands;
        let Some((program, args)) = split_command_line(&commands.install_command) else {
            sink.emit(&notice("install command is empty"));
            report.enter(PrepareState::Error);
            return report;
        };
        let code = self
            .session
            .supervisor()
            .run(&program, &args, sink, commands.install_timeout())
            .await;
        report.exit_code = Some(code);
        if code != 0 {
            sink.emit(&notice(format_args!(
                "'{}' failed with exit code {}",
                commands.install_command, code
            )));
            report.enter(PrepareState::Error);
            return report;
        }

        report.enter(PrepareState::Caching);
        // Non-fatal: the next prepare reinstalls.
        if let Err(e) = cache.persist(&manifest).await {
            tracing::warn!(error = %e, "Could not update install cache");
        }
        report.enter(PrepareState::Done);
        report
    }

    /// Read the manifest, add undeclared imports, and sync it back. `None`
    /// ends the flow; the report already holds the terminal state.
    async fn scan(
        &self,
        store: &mut dyn FileStore,
        sink: &dyn OutputSink,
        report: &mut PrepareReport,
    ) -> Option<Manifest> {
        let Some(text) = store.read(MANIFEST_FILE) else {
            sink.emit(&notice(format_args!("no {}, skipping install", MANIFEST_FILE)));
            report.enter(PrepareState::Skip);
            report.enter(PrepareState::Done);
            return None;
        };
        let mut manifest = match Manifest::parse(&text) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(error = %e, "Manifest unreadable, not resolving dependencies");
                sink.emit(&notice(format_args!("{} is invalid ({}), skipping install", MANIFEST_FILE, e)));
                report.enter(PrepareState::Skip);
                report.enter(PrepareState::Done);
                return None;
            }
        };

        let imports = scan_files(&*store);
        let allowlist = Allowlist::from_config(&self.session.config().resolver);
        let added = resolve_missing(&mut manifest, &imports, &allowlist);
        if added.is_empty() {
            return Some(manifest);
        }

        let text = manifest.to_json_pretty();
        if let Err(e) = self.session.sandbox().write_file(MANIFEST_FILE, &text).await {
            tracing::error!(error = %e, "Could not write manifest to sandbox");
            sink.emit(&notice(format_args!("could not update {}: {}", MANIFEST_FILE, e)));
            report.enter(PrepareState::Error);
            return None;
        }
        if let Err(e) = store.write(MANIFEST_FILE, &text) {
            tracing::warn!(error = %e, "Could not write manifest back to project files");
            sink.emit(&notice(format_args!(
                "sandbox {} updated but the project copy could not be saved: {}",
                MANIFEST_FILE, e
            )));
            report.manifest_diverged = true;
        }

        observability::audit_dependencies_added(&added);
        sink.emit(&notice(format_args!("added missing dependencies: {}", added.join(", "))));
        report.added = added;
        Some(manifest)
    }

    /// Launch the long-running start command. The handle cancels it.
    pub fn start(&self, sink: Arc<dyn OutputSink>) -> Result<RunHandle> {
        let line = &self.session.config().commands.start_command;
        let Some((program, args)) = split_command_line(line) else {
            bail!("start command is empty");
        };
        tracing::info!(command = %line, "Starting project");
        Ok(self.session.supervisor().launch(&program, &args, sink))
    }

    /// Subscribe to the sandbox's server-ready announcements.
    pub fn server_ready(&self) -> tokio::sync::broadcast::Receiver<ServerReady> {
        self.session.sandbox().server_ready()
    }
}
