//! Host-directory sandbox.
//!
//! The filesystem is a project directory on the host; processes are host
//! processes started in it with `tokio::process`. This gives no isolation
//! beyond path validation, and is what the CLI runs against.
//!
//! On unix every spawned process leads its own process group, and a kill
//! signals the whole group so servers and workers started by `npm` go too.

use async_trait::async_trait;
use futures_util::FutureExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};

use crate::backend::{
    parse_server_ready, DirEntry, ProcessControl, Sandbox, SandboxProcess, ServerReady,
    SpawnOptions, SERVER_READY_CAPACITY,
};
use crate::error::{Result, SandboxError};
use workbench_core::path_validation::resolve_under_root;
use workbench_core::project::FileTree;

const READ_CHUNK: usize = 8 * 1024;

pub struct LocalSandbox {
    root: PathBuf,
    ready_tx: broadcast::Sender<ServerReady>,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (ready_tx, _) = broadcast::channel(SERVER_READY_CAPACITY);
        Self {
            root: root.into(),
            ready_tx,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(resolve_under_root(&self.root, path)?)
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn name(&self) -> &str {
        "local"
    }

    async fn mount(&self, tree: &FileTree) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SandboxError::io(&self.root.display().to_string(), e))?;
        let files = tree.files();
        for (path, contents) in &files {
            self.write_file(path, contents).await?;
        }
        tracing::debug!(root = %self.root.display(), files = files.len(), "Mounted file tree");
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| SandboxError::io(path, e))
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::io(path, e))?;
        }
        tokio::fs::write(&full, contents)
            .await
            .map_err(|e| SandboxError::io(path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| SandboxError::io(path, e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(SandboxError::Io {
                path: path.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "refusing to remove the sandbox root",
                ),
            });
        }
        let meta = tokio::fs::symlink_metadata(&full)
            .await
            .map_err(|e| SandboxError::io(path, e))?;
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(&full).await
        } else {
            tokio::fs::remove_file(&full).await
        };
        removed.map_err(|e| SandboxError::io(path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| SandboxError::io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| SandboxError::io(path, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::metadata(full).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        opts: SpawnOptions,
    ) -> Result<SandboxProcess> {
        let cwd = match opts.cwd.as_deref() {
            Some(dir) => self.resolve(dir)?,
            None => self.root.clone(),
        };

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&cwd)
            .envs(&opts.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some((cols, rows)) = opts.terminal {
            cmd.env("COLUMNS", cols.to_string())
                .env("LINES", rows.to_string());
        }

        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(command, ?args, pid = ?child.id(), cwd = %cwd.display(), "Spawned process");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_output(stdout, out_tx.clone(), self.ready_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_output(stderr, out_tx.clone(), self.ready_tx.clone()));
        }
        drop(out_tx);

        let (in_tx, mut in_rx) = mpsc::unbounded_channel::<String>();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some(data) = in_rx.recv().await {
                    if stdin.write_all(data.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdin.flush().await;
                }
            });
        }

        let kill = Arc::new(Notify::new());
        let (exit_tx, exit_rx) = oneshot::channel();
        let kill_signal = Arc::clone(&kill);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_signal.notified() => {
                    let group_killed = child.id().is_some_and(kill_group);
                    if !group_killed {
                        if let Err(e) = child.start_kill() {
                            tracing::debug!(error = %e, "Kill failed; process may have exited");
                        }
                    }
                    child.wait().await
                }
            };
            let _ = exit_tx.send(status.map(exit_code));
        });

        let command_name = command.to_string();
        let exit = async move {
            match exit_rx.await {
                Ok(Ok(code)) => Ok(code),
                Ok(Err(e)) => Err(SandboxError::ProcessLost(format!("{}: {}", command_name, e))),
                Err(_) => Err(SandboxError::ProcessLost(command_name)),
            }
        }
        .boxed();

        Ok(SandboxProcess {
            output: out_rx,
            input: in_tx,
            exit,
            control: Arc::new(LocalControl { kill }),
        })
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

struct LocalControl {
    kill: Arc<Notify>,
}

impl ProcessControl for LocalControl {
    fn kill(&self) {
        // notify_one keeps a permit if the waiter has not polled yet.
        self.kill.notify_one();
    }

    fn resize(&self, cols: u16, rows: u16) {
        tracing::debug!(cols, rows, "Resize ignored: host processes have no pty");
    }
}

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) -> bool {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(pid, error = %e, "killpg failed, killing the child only");
            false
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

async fn pump_output<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<String>,
    ready_tx: broadcast::Sender<ServerReady>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut carry = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let text = decode_utf8(&mut carry, &buf[..n]);
        if text.is_empty() {
            continue;
        }
        if let Some(ready) = parse_server_ready(&text) {
            tracing::info!(port = ready.port, url = %ready.url, "Server ready");
            let _ = ready_tx.send(ready);
        }
        if tx.send(text).is_err() {
            break;
        }
    }
    if !carry.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&carry).into_owned());
    }
}

/// Decode `bytes` appended to `carry`, holding back an incomplete trailing
/// UTF-8 sequence for the next read.
fn decode_utf8(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    match std::str::from_utf8(carry) {
        Ok(text) => {
            let out = text.to_string();
            carry.clear();
            out
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let out = String::from_utf8_lossy(&carry[..valid]).into_owned();
            carry.drain(..valid);
            out
        }
        Err(_) => {
            let out = String::from_utf8_lossy(carry).into_owned();
            carry.clear();
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_holds_split_sequence() {
        let bytes = "héllo".as_bytes();
        let mut carry = Vec::new();
        let first = decode_utf8(&mut carry, &bytes[..2]);
        assert_eq!(first, "h");
        assert_eq!(carry.len(), 1);
        let second = decode_utf8(&mut carry, &bytes[2..]);
        assert_eq!(second, "éllo");
        assert!(carry.is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_operations() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());

        sandbox.write_file("/src/main.ts", "x").await.unwrap();
        assert_eq!(sandbox.read_file("src/main.ts").await.unwrap(), "x");
        assert!(sandbox.exists("src").await);

        sandbox.mkdir("node_modules/.bin").await.unwrap();
        let entries = sandbox.read_dir("/").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["node_modules", "src"]);
        assert!(entries.iter().all(|e| e.is_dir));

        sandbox.remove("node_modules").await.unwrap();
        assert!(!sandbox.exists("node_modules").await);
        assert!(sandbox.read_file("missing.txt").await.unwrap_err().is_not_found());
        assert!(matches!(
            sandbox.write_file("../escape", "x").await,
            Err(SandboxError::PathEscape(_))
        ));
        assert!(sandbox.remove("/").await.is_err());
    }

    #[tokio::test]
    async fn test_mount_writes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path().join("project"));
        let mut tree = FileTree::new();
        tree.insert("package.json", "{}".to_string()).unwrap();
        tree.insert("src/a/b.js", "b".to_string()).unwrap();
        sandbox.mount(&tree).await.unwrap();
        assert_eq!(sandbox.read_file("src/a/b.js").await.unwrap(), "b");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_streams_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        let args = vec!["-c".to_string(), "echo hello; exit 3".to_string()];
        let mut process = sandbox
            .spawn("sh", &args, SpawnOptions::default())
            .await
            .unwrap();
        let mut out = String::new();
        while let Some(chunk) = process.output.recv().await {
            out.push_str(&chunk);
        }
        assert_eq!(out, "hello\n");
        assert_eq!(process.exit.await.unwrap(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_forwards_input() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        let mut process = sandbox
            .spawn("cat", &[], SpawnOptions::default())
            .await
            .unwrap();
        process.input.send("ping\n".to_string()).unwrap();
        let chunk = process.output.recv().await.unwrap();
        assert_eq!(chunk, "ping\n");
        process.control.kill();
        assert_ne!(process.exit.await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_announces_server_ready() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        let mut ready = sandbox.server_ready();
        let args = vec!["-c".to_string(), "echo 'Local: http://localhost:5173/'".to_string()];
        let process = sandbox
            .spawn("sh", &args, SpawnOptions::default())
            .await
            .unwrap();
        let event = ready.recv().await.unwrap();
        assert_eq!(event.port, 5173);
        assert_eq!(process.exit.await.unwrap(), 0);
    }

    /// Alive and not a zombie waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_kill_reaches_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        let args = vec!["-c".to_string(), "sleep 30 & echo $!; wait".to_string()];
        let mut process = sandbox
            .spawn("sh", &args, SpawnOptions::default())
            .await
            .unwrap();
        let mut out = String::new();
        while !out.contains('\n') {
            out.push_str(&process.output.recv().await.unwrap());
        }
        let sleeper: u32 = out.trim().parse().unwrap();
        assert!(is_running(sleeper));

        process.control.kill();
        assert_eq!(process.exit.await.unwrap(), 128 + 9);

        let mut survived = true;
        for _ in 0..50 {
            if !is_running(sleeper) {
                survived = false;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!survived, "background sleep {} outlived the kill", sleeper);
    }

    #[tokio::test]
    async fn test_spawn_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        let err = sandbox
            .spawn("definitely-not-a-real-program-xyz", &[], SpawnOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }
}
