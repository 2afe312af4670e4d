//! Process supervisor: run a command in the sandbox to completion.
//!
//! Every run resolves exactly once. A single `tokio::select!` races the
//! process's output, its exit, an optional deadline, and an optional cancel
//! request; whichever branch completes first decides the exit code:
//!
//! - natural exit: the process's own code (queued output is drained first;
//!   waiting for more is bounded by a short grace period)
//! - deadline: one kill, one diagnostic line, exit code [`EXIT_TIMEOUT`]
//! - cancel: one kill, one diagnostic line, exit code [`EXIT_FAILURE`]
//! - spawn or stream failure: an error line, exit code [`EXIT_FAILURE`]
//!
//! `run` never returns an error; failures are reported through the sink.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backend::{Sandbox, SandboxProcess, SpawnOptions};
use crate::info_log;
use crate::log::notice;
use workbench_core::observability;

/// Exit code for a run killed by its deadline.
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code for spawn failures, lost processes, and cancelled runs.
pub const EXIT_FAILURE: i32 = 1;

/// After exit, how long to wait for each further output chunk.
pub const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Receives process output chunks in production order.
pub trait OutputSink: Send + Sync {
    fn emit(&self, chunk: &str);
}

impl<F> OutputSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, chunk: &str) {
        self(chunk)
    }
}

/// Writes chunks to the host's stdout as they arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, chunk: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    }
}

/// Collects chunks in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    chunks: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<String> {
        self.chunks
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        self.chunks().concat()
    }
}

impl OutputSink for BufferSink {
    fn emit(&self, chunk: &str) {
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.push(chunk.to_string());
        }
    }
}

/// Handle to a command launched in the background.
///
/// Dropping the handle detaches: the process keeps running.
#[derive(Debug)]
pub struct RunHandle {
    command: String,
    cancel: Option<oneshot::Sender<()>>,
    done: JoinHandle<i32>,
    code: Option<i32>,
}

impl RunHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Kill the process. The run resolves with [`EXIT_FAILURE`]. Repeated
    /// calls, or a call after exit, do nothing.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.code.is_some() || self.done.is_finished()
    }

    /// Exit code of the run. Cancel-safe: dropping the future and calling
    /// again resumes the wait.
    pub async fn wait(&mut self) -> i32 {
        if let Some(code) = self.code {
            return code;
        }
        let code = match (&mut self.done).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(command = %self.command, error = %e, "Run task failed");
                EXIT_FAILURE
            }
        };
        self.code = Some(code);
        code
    }
}

pub struct ProcessSupervisor {
    sandbox: Arc<dyn Sandbox>,
}

impl ProcessSupervisor {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Run `command` to completion. `timeout = None` runs unbounded.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        sink: &dyn OutputSink,
        timeout: Option<Duration>,
    ) -> i32 {
        execute(self.sandbox.as_ref(), command, args, sink, timeout, None).await
    }

    /// Run `command` unbounded in a background task.
    pub fn launch(&self, command: &str, args: &[String], sink: Arc<dyn OutputSink>) -> RunHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let sandbox = Arc::clone(&self.sandbox);
        let owned_command = command.to_string();
        let owned_args = args.to_vec();
        let done = tokio::spawn(async move {
            execute(
                sandbox.as_ref(),
                &owned_command,
                &owned_args,
                sink.as_ref(),
                None,
                Some(cancel_rx),
            )
            .await
        });
        RunHandle {
            command: command.to_string(),
            cancel: Some(cancel_tx),
            done,
            code: None,
        }
    }
}

async fn execute(
    sandbox: &dyn Sandbox,
    command: &str,
    args: &[String],
    sink: &dyn OutputSink,
    timeout: Option<Duration>,
    cancel: Option<oneshot::Receiver<()>>,
) -> i32 {
    let started = Instant::now();
    observability::audit_execution_started(command, args, timeout.map(|d| d.as_millis()));
    tracing::debug!(command, ?args, ?timeout, backend = sandbox.name(), "Running command");

    let (code, killed) = match sandbox.spawn(command, args, SpawnOptions::default()).await {
        Ok(process) => supervise(process, command, sink, timeout, cancel).await,
        Err(e) => {
            tracing::warn!(command, error = %e, "Spawn failed");
            sink.emit(&notice(&e));
            (EXIT_FAILURE, false)
        }
    };

    let elapsed = started.elapsed();
    observability::audit_execution_completed(command, code, elapsed.as_millis() as u64, killed);
    info_log!(
        command,
        exit_code = code,
        killed,
        duration_ms = elapsed.as_millis() as u64,
        "Command finished"
    );
    code
}

/// Returns `(exit_code, killed)`.
async fn supervise(
    process: SandboxProcess,
    command: &str,
    sink: &dyn OutputSink,
    timeout: Option<Duration>,
    cancel: Option<oneshot::Receiver<()>>,
) -> (i32, bool) {
    let SandboxProcess {
        mut output,
        mut exit,
        control,
        ..
    } = process;

    let deadline = async move {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    let cancelled = async move {
        match cancel {
            // A dropped sender means the handle was detached, not cancelled.
            Some(rx) => {
                if rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    tokio::pin!(cancelled);

    let mut output_open = true;
    loop {
        tokio::select! {
            chunk = output.recv(), if output_open => match chunk {
                Some(chunk) => sink.emit(&chunk),
                None => output_open = false,
            },
            status = &mut exit => {
                drain(&mut output, sink).await;
                return match status {
                    Ok(code) => (code, false),
                    Err(e) => {
                        tracing::warn!(command, error = %e, "Lost process");
                        sink.emit(&notice(&e));
                        (EXIT_FAILURE, false)
                    }
                };
            }
            _ = &mut deadline => {
                control.kill();
                let ms = timeout.map(|d| d.as_millis()).unwrap_or_default();
                tracing::warn!(command, timeout_ms = ms as u64, "Command timed out, killed");
                sink.emit(&notice(format_args!("'{}' timed out after {} ms, killed", command, ms)));
                return (EXIT_TIMEOUT, true);
            }
            _ = &mut cancelled => {
                control.kill();
                tracing::info!(command, "Command cancelled");
                sink.emit(&notice(format_args!("'{}' cancelled", command)));
                return (EXIT_FAILURE, true);
            }
        }
    }
}

/// Forward output still in flight after exit. Chunks already queued are
/// always delivered; only the wait for a new chunk is bounded by
/// [`DRAIN_GRACE`].
async fn drain(output: &mut mpsc::UnboundedReceiver<String>, sink: &dyn OutputSink) {
    loop {
        match tokio::time::timeout(DRAIN_GRACE, output.recv()).await {
            Ok(Some(chunk)) => sink.emit(&chunk),
            Ok(None) => return,
            Err(_) => {
                tracing::debug!("Output still open after exit, stopped draining");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedCommand, ScriptedSandbox};

    fn supervisor_with(sandbox: &Arc<ScriptedSandbox>) -> ProcessSupervisor {
        ProcessSupervisor::new(Arc::clone(sandbox) as Arc<dyn Sandbox>)
    }

    #[tokio::test]
    async fn test_timeout_kills_once_and_returns_124() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script("server", ScriptedCommand::hangs().with_output("booting\n"));
        let supervisor = supervisor_with(&sandbox);
        let sink = BufferSink::new();

        let started = Instant::now();
        let code = supervisor
            .run("server", &[], &sink, Some(Duration::from_millis(100)))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(code, EXIT_TIMEOUT);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);
        assert_eq!(sandbox.kill_count(), 1);
        let chunks = sink.chunks();
        assert_eq!(chunks.first().map(String::as_str), Some("booting\n"));
        assert_eq!(chunks.iter().filter(|c| c.contains("timed out")).count(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_run_passes_exit_code_through() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script(
            "build --prod",
            ScriptedCommand::exits(3)
                .with_output("step 1\n")
                .with_output("step 2\n")
                .after(Duration::from_millis(20)),
        );
        let supervisor = supervisor_with(&sandbox);
        let sink = BufferSink::new();
        let code = supervisor
            .run("build", &["--prod".to_string()], &sink, None)
            .await;
        assert_eq!(code, 3);
        assert_eq!(sink.chunks(), vec!["step 1\n", "step 2\n"]);
        assert_eq!(sandbox.kill_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_returns_1_with_error_line() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script("npm install", ScriptedCommand::fails_to_spawn("npm: not found"));
        let supervisor = supervisor_with(&sandbox);
        let sink = BufferSink::new();
        let code = supervisor
            .run("npm", &["install".to_string()], &sink, Some(Duration::from_secs(5)))
            .await;
        assert_eq!(code, EXIT_FAILURE);
        assert!(sink.text().contains("npm: not found"));
    }

    #[tokio::test]
    async fn test_output_drained_after_fast_exit() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script("quick", ScriptedCommand::exits(0).with_output("done\n"));
        let supervisor = supervisor_with(&sandbox);
        let sink = BufferSink::new();
        assert_eq!(supervisor.run("quick", &[], &sink, None).await, 0);
        assert_eq!(sink.text(), "done\n");
    }

    #[tokio::test]
    async fn test_slow_sink_receives_every_chunk_after_exit() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        let mut command = ScriptedCommand::exits(0);
        for i in 0..300 {
            command = command.with_output(&format!("line {}\n", i));
        }
        sandbox.script("npm install", command);
        let supervisor = supervisor_with(&sandbox);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_sink = Arc::clone(&seen);
        let sink = move |chunk: &str| {
            std::thread::sleep(Duration::from_millis(1));
            seen_by_sink.lock().unwrap().push(chunk.to_string());
        };
        let code = supervisor
            .run("npm", &["install".to_string()], &sink, None)
            .await;

        assert_eq!(code, 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 300);
        assert_eq!(seen.first().map(String::as_str), Some("line 0\n"));
        assert_eq!(seen.last().map(String::as_str), Some("line 299\n"));
    }

    #[tokio::test]
    async fn test_closure_sink() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script("quick", ScriptedCommand::exits(0).with_output("a"));
        let supervisor = supervisor_with(&sandbox);
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_by_sink = Arc::clone(&seen);
        let sink = move |chunk: &str| seen_by_sink.lock().unwrap().push_str(chunk);
        supervisor.run("quick", &[], &sink, None).await;
        assert_eq!(seen.lock().unwrap().as_str(), "a");
    }

    #[tokio::test]
    async fn test_launch_cancel_resolves_with_failure() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script("npm run dev", ScriptedCommand::hangs());
        let supervisor = supervisor_with(&sandbox);
        let sink = BufferSink::new();
        let args = vec!["run".to_string(), "dev".to_string()];
        let mut handle = supervisor.launch("npm", &args, Arc::new(sink.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.cancel();
        handle.cancel();
        assert_eq!(handle.wait().await, EXIT_FAILURE);
        assert_eq!(handle.wait().await, EXIT_FAILURE);
        assert!(handle.is_finished());
        assert_eq!(sandbox.kill_count(), 1);
        assert!(sink.text().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.script(
            "npm run dev",
            ScriptedCommand::exits(0).after(Duration::from_millis(30)),
        );
        let supervisor = supervisor_with(&sandbox);
        let args = vec!["run".to_string(), "dev".to_string()];
        drop(supervisor.launch("npm", &args, Arc::new(BufferSink::new())));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sandbox.kill_count(), 0);
        assert_eq!(sandbox.spawn_count("npm run dev"), 1);
    }
}
