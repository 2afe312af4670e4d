//! In-memory sandbox with scripted processes, for deterministic tests.
//!
//! Files live in a map. Each command line (`"npm install"`) is bound to a
//! [`ScriptedCommand`] describing its output, how it ends, and which files it
//! leaves behind. Unscripted commands fail to spawn.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::backend::{
    DirEntry, ProcessControl, Sandbox, SandboxProcess, ServerReady, SpawnOptions,
    SERVER_READY_CAPACITY,
};
use crate::error::{Result, SandboxError};
use workbench_core::path_validation::{normalize_sandbox_path, sandbox_parent};
use workbench_core::project::FileTree;

/// Exit code reported by a scripted process that was killed.
pub const KILLED_EXIT_CODE: i32 = 137;

#[derive(Debug, Clone)]
enum Outcome {
    Exit(i32),
    Hang,
    Echo,
    FailSpawn(String),
}

#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    output: Vec<String>,
    outcome: Outcome,
    delay: Duration,
    creates: Vec<(String, String)>,
    ready: Option<ServerReady>,
}

impl ScriptedCommand {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            output: Vec::new(),
            outcome,
            delay: Duration::ZERO,
            creates: Vec::new(),
            ready: None,
        }
    }

    /// Exits with `code` after emitting its output.
    pub fn exits(code: i32) -> Self {
        Self::with_outcome(Outcome::Exit(code))
    }

    /// Never exits on its own.
    pub fn hangs() -> Self {
        Self::with_outcome(Outcome::Hang)
    }

    /// Echoes every input chunk back as output until killed.
    pub fn echo() -> Self {
        Self::with_outcome(Outcome::Echo)
    }

    pub fn fails_to_spawn(reason: &str) -> Self {
        Self::with_outcome(Outcome::FailSpawn(reason.to_string()))
    }

    pub fn with_output(mut self, chunk: &str) -> Self {
        self.output.push(chunk.to_string());
        self
    }

    /// Wait this long before exiting.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// File written into the sandbox when the process exits with 0.
    pub fn creates(mut self, path: &str, contents: &str) -> Self {
        self.creates.push((path.to_string(), contents.to_string()));
        self
    }

    /// Announce a listening server on spawn.
    pub fn announces(mut self, port: u16) -> Self {
        self.ready = Some(ServerReady {
            port,
            url: format!("http://localhost:{}", port),
        });
        self
    }
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    scripts: HashMap<String, ScriptedCommand>,
    spawned: Vec<String>,
    inputs: Vec<String>,
    resizes: Vec<(u16, u16)>,
    failing_writes: BTreeSet<String>,
}

impl State {
    fn is_dir(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        path.is_empty()
            || self.dirs.contains(path)
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
            || self.files.keys().any(|f| f.starts_with(&prefix))
    }

    fn add_parents(&mut self, path: &str) {
        let mut parent = sandbox_parent(path);
        while !parent.is_empty() {
            self.dirs.insert(parent.to_string());
            parent = sandbox_parent(parent);
        }
    }
}

pub struct ScriptedSandbox {
    state: Arc<Mutex<State>>,
    kills: Arc<AtomicUsize>,
    ready_tx: broadcast::Sender<ServerReady>,
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        let (ready_tx, _) = broadcast::channel(SERVER_READY_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            kills: Arc::new(AtomicUsize::new(0)),
            ready_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Bind a command line (program and args joined by spaces) to a script.
    pub fn script(&self, command_line: &str, command: ScriptedCommand) {
        self.state()
            .scripts
            .insert(command_line.to_string(), command);
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        if let Ok(path) = normalize_sandbox_path(path) {
            let mut state = self.state();
            state.add_parents(&path);
            state.files.insert(path, contents.to_string());
        }
        self
    }

    /// Make writes to `path` fail with an I/O error.
    pub fn fail_writes_to(&self, path: &str) {
        if let Ok(path) = normalize_sandbox_path(path) {
            self.state().failing_writes.insert(path);
        }
    }

    pub fn file(&self, path: &str) -> Option<String> {
        let path = normalize_sandbox_path(path).ok()?;
        self.state().files.get(&path).cloned()
    }

    /// Command lines spawned so far, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.state().spawned.clone()
    }

    pub fn spawn_count(&self, command_line: &str) -> usize {
        self.state()
            .spawned
            .iter()
            .filter(|c| c.as_str() == command_line)
            .count()
    }

    /// Kill requests across every process.
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Input chunks received by echo processes.
    pub fn inputs(&self) -> Vec<String> {
        self.state().inputs.clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.state().resizes.clone()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn mount(&self, tree: &FileTree) -> Result<()> {
        for (path, contents) in tree.files() {
            self.write_file(&path, contents).await?;
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let normalized = normalize_sandbox_path(path)?;
        self.state()
            .files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let normalized = normalize_sandbox_path(path)?;
        let mut state = self.state();
        if state.failing_writes.contains(&normalized) {
            return Err(SandboxError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "scripted write failure"),
            });
        }
        state.add_parents(&normalized);
        state.files.insert(normalized, contents.to_string());
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let normalized = normalize_sandbox_path(path)?;
        let mut state = self.state();
        state.add_parents(&normalized);
        if !normalized.is_empty() {
            state.dirs.insert(normalized);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let normalized = normalize_sandbox_path(path)?;
        let prefix = format!("{}/", normalized);
        let mut state = self.state();
        let was_file = state.files.remove(&normalized).is_some();
        let was_dir = state.is_dir(&normalized);
        state.files.retain(|f, _| !f.starts_with(&prefix));
        state
            .dirs
            .retain(|d| d != &normalized && !d.starts_with(&prefix));
        if was_file || was_dir {
            Ok(())
        } else {
            Err(SandboxError::NotFound(path.to_string()))
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let normalized = normalize_sandbox_path(path)?;
        let state = self.state();
        if !state.is_dir(&normalized) {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        let mut entries: BTreeMap<String, bool> = BTreeMap::new();
        let child_of = |full: &str| -> Option<(String, bool)> {
            let rest = if normalized.is_empty() {
                full
            } else {
                full.strip_prefix(&format!("{}/", normalized))?
            };
            match rest.split_once('/') {
                Some((head, _)) => Some((head.to_string(), true)),
                None => Some((rest.to_string(), false)),
            }
        };
        for file in state.files.keys() {
            if let Some((name, is_dir)) = child_of(file) {
                *entries.entry(name).or_insert(false) |= is_dir;
            }
        }
        for dir in &state.dirs {
            if let Some((name, _)) = child_of(dir) {
                entries.insert(name, true);
            }
        }
        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    async fn exists(&self, path: &str) -> bool {
        match normalize_sandbox_path(path) {
            Ok(normalized) => {
                let state = self.state();
                state.files.contains_key(&normalized) || state.is_dir(&normalized)
            }
            Err(_) => false,
        }
    }

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        _opts: SpawnOptions,
    ) -> Result<SandboxProcess> {
        let command_line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        let script = {
            let mut state = self.state();
            state.spawned.push(command_line.clone());
            state.scripts.get(&command_line).cloned()
        };
        let Some(script) = script else {
            return Err(SandboxError::Spawn {
                command: command_line,
                reason: "command not found".to_string(),
            });
        };
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel::<String>();
        for chunk in &script.output {
            let _ = out_tx.send(chunk.clone());
        }

        let kill = Arc::new(Notify::new());
        let control = Arc::new(ScriptedControl {
            kill: Arc::clone(&kill),
            kills: Arc::clone(&self.kills),
            state: Arc::clone(&self.state),
        });
        let state = Arc::clone(&self.state);
        let delay = script.delay;

        let exit: BoxFuture<'static, Result<i32>> = match script.outcome {
            Outcome::Exit(code) => {
                let creates = script.creates;
                async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = kill.notified() => return Ok(KILLED_EXIT_CODE),
                    }
                    if code == 0 {
                        let mut state = lock(&state);
                        for (path, contents) in creates {
                            if let Ok(path) = normalize_sandbox_path(&path) {
                                state.add_parents(&path);
                                state.files.insert(path, contents);
                            }
                        }
                    }
                    drop(out_tx);
                    Ok(code)
                }
                .boxed()
            }
            Outcome::Hang => async move {
                kill.notified().await;
                drop(out_tx);
                Ok(KILLED_EXIT_CODE)
            }
            .boxed(),
            Outcome::Echo => async move {
                loop {
                    tokio::select! {
                        data = in_rx.recv() => match data {
                            Some(data) => {
                                lock(&state).inputs.push(data.clone());
                                let _ = out_tx.send(data);
                            }
                            None => return Ok(0),
                        },
                        _ = kill.notified() => return Ok(KILLED_EXIT_CODE),
                    }
                }
            }
            .boxed(),
            Outcome::FailSpawn(reason) => {
                return Err(SandboxError::Spawn {
                    command: command_line,
                    reason,
                });
            }
        };

        if let Some(ready) = script.ready {
            let _ = self.ready_tx.send(ready);
        }
        Ok(SandboxProcess {
            output: out_rx,
            input: in_tx,
            exit,
            control,
        })
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

struct ScriptedControl {
    kill: Arc<Notify>,
    kills: Arc<AtomicUsize>,
    state: Arc<Mutex<State>>,
}

impl ProcessControl for ScriptedControl {
    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.kill.notify_one();
    }

    fn resize(&self, cols: u16, rows: u16) {
        lock(&self.state).resizes.push((cols, rows));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_files_and_directories() {
        let sandbox = ScriptedSandbox::new().with_file("src/App.tsx", "app");
        assert!(sandbox.exists("src").await);
        assert!(sandbox.exists("/src/App.tsx").await);
        sandbox.mkdir("node_modules/react").await.unwrap();
        let names: Vec<_> = sandbox
            .read_dir("")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![("node_modules".to_string(), true), ("src".to_string(), true)]
        );
        sandbox.remove("node_modules").await.unwrap();
        assert!(!sandbox.exists("node_modules/react").await);
        assert!(sandbox.read_file("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_exit_script_creates_files() {
        let sandbox = ScriptedSandbox::new();
        sandbox.script(
            "npm install",
            ScriptedCommand::exits(0)
                .with_output("added 1 package\n")
                .creates("node_modules/.package-lock.json", "{}"),
        );
        let args = vec!["install".to_string()];
        let mut process = sandbox
            .spawn("npm", &args, SpawnOptions::default())
            .await
            .unwrap();
        assert_eq!(process.exit.await.unwrap(), 0);
        assert_eq!(process.output.recv().await.unwrap(), "added 1 package\n");
        assert!(process.output.recv().await.is_none());
        assert!(sandbox.exists("node_modules").await);
        assert_eq!(sandbox.spawned(), vec!["npm install"]);
    }

    #[tokio::test]
    async fn test_unscripted_command_fails_to_spawn() {
        let sandbox = ScriptedSandbox::new();
        let err = sandbox
            .spawn("yarn", &[], SpawnOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_failing_write() {
        let sandbox = ScriptedSandbox::new();
        sandbox.fail_writes_to("package.json");
        assert!(sandbox.write_file("/package.json", "{}").await.is_err());
        assert!(sandbox.file("package.json").is_none());
    }
}
