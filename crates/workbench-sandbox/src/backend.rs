//! Sandbox trait: the runtime that hosts the project.
//!
//! A sandbox exposes a virtual filesystem rooted at the project directory and
//! can spawn processes inside it. Paths are `/`-separated and relative to the
//! sandbox root; a leading `/` is accepted and ignored.
//!
//! Implementations: [`crate::local::LocalSandbox`] (host directory + host
//! processes) and, for tests, `ScriptedSandbox` (feature `test-util`).

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, mpsc};

use crate::error::{Result, SandboxError};
use workbench_core::project::FileTree;

/// Capacity of the server-ready broadcast channel.
pub const SERVER_READY_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Working directory inside the sandbox; the root when `None`.
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Initial terminal size `(cols, rows)` for interactive processes.
    pub terminal: Option<(u16, u16)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// A spawned process started listening on a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Out-of-band control over a running process.
pub trait ProcessControl: Send + Sync {
    /// Best-effort kill. Calling it on an exited process is harmless.
    fn kill(&self);
    fn resize(&self, cols: u16, rows: u16);
}

/// Handles to a spawned process.
///
/// `output` yields chunks in production order and closes once the process's
/// output streams are exhausted. Text sent on `input` is written to the
/// process's stdin verbatim.
pub struct SandboxProcess {
    pub output: mpsc::UnboundedReceiver<String>,
    pub input: mpsc::UnboundedSender<String>,
    pub exit: BoxFuture<'static, Result<i32>>,
    pub control: Arc<dyn ProcessControl>,
}

impl std::fmt::Debug for SandboxProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxProcess").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Backend name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Write every file of `tree`, creating directories as needed.
    async fn mount(&self, tree: &FileTree) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<String>;
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;
    /// Recursive; existing directories are fine.
    async fn mkdir(&self, path: &str) -> Result<()>;
    /// Removes files and directories (recursively).
    async fn remove(&self, path: &str) -> Result<()>;
    /// Immediate children, sorted by name.
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;
    async fn exists(&self, path: &str) -> bool;

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        opts: SpawnOptions,
    ) -> Result<SandboxProcess>;

    /// Subscribe to server-ready announcements.
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;
}

/// Read a file, mapping "not found" to `None`.
pub async fn read_optional(sandbox: &dyn Sandbox, path: &str) -> Result<Option<String>> {
    match sandbox.read_file(path).await {
        Ok(text) => Ok(Some(text)),
        Err(SandboxError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn ansi_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").ok())
        .as_ref()
}

fn server_url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]):(\d{1,5})[^\s]*").ok()
    })
    .as_ref()
}

/// Detect a dev-server announcement (`Local: http://localhost:5173/`) in a
/// chunk of process output. ANSI colour codes are ignored.
pub fn parse_server_ready(chunk: &str) -> Option<ServerReady> {
    let plain = match ansi_regex() {
        Some(re) => re.replace_all(chunk, "").into_owned(),
        None => chunk.to_string(),
    };
    let caps = server_url_regex()?.captures(&plain)?;
    let port = caps.get(1)?.as_str().parse::<u16>().ok()?;
    let url = caps.get(0)?.as_str().trim_end_matches('/').to_string();
    Some(ServerReady { port, url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_ready_vite_banner() {
        let ready = parse_server_ready("  ➜  Local:   http://localhost:5173/\n").unwrap();
        assert_eq!(ready.port, 5173);
        assert_eq!(ready.url, "http://localhost:5173");
    }

    #[test]
    fn test_parse_server_ready_strips_ansi() {
        let chunk = "Local: \x1b[36mhttp://localhost:\x1b[1m3000\x1b[22m/\x1b[39m";
        let ready = parse_server_ready(chunk).unwrap();
        assert_eq!(ready.port, 3000);
        assert_eq!(ready.url, "http://localhost:3000");
    }

    #[test]
    fn test_parse_server_ready_ignores_remote_urls() {
        assert!(parse_server_ready("see https://example.com:8080/docs").is_none());
        assert!(parse_server_ready("added 120 packages in 3s").is_none());
    }
}
