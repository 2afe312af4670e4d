//! The session's interactive shell.
//!
//! One long-lived process per session, with no timeout. Output is forwarded
//! to the sink registered at `start` until the process exits; input is
//! written verbatim. After `dispose`, or once the shell exits, writes are
//! dropped silently.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::backend::{ProcessControl, Sandbox, SandboxProcess, SpawnOptions};
use crate::error::Result;
use crate::log::notice;
use crate::supervisor::OutputSink;
use workbench_core::config::ShellConfig;

struct LiveShell {
    generation: u64,
    input: mpsc::UnboundedSender<String>,
    control: Arc<dyn ProcessControl>,
}

#[derive(Default)]
struct ShellState {
    live: Option<LiveShell>,
    generation: u64,
    disposed: bool,
    size: Option<(u16, u16)>,
}

pub struct ShellSession {
    sandbox: Arc<dyn Sandbox>,
    config: ShellConfig,
    state: Arc<Mutex<ShellState>>,
}

impl ShellSession {
    pub fn new(sandbox: Arc<dyn Sandbox>, config: ShellConfig) -> Self {
        Self {
            sandbox,
            config,
            state: Arc::new(Mutex::new(ShellState::default())),
        }
    }

    /// Start the shell. A no-op while one is already live.
    pub async fn start(&self, sink: Arc<dyn OutputSink>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.live.is_some() {
            tracing::debug!("Shell already running");
            return Ok(());
        }

        let size = state.size.unwrap_or((self.config.cols, self.config.rows));
        let opts = SpawnOptions {
            terminal: Some(size),
            ..SpawnOptions::default()
        };
        let SandboxProcess {
            mut output,
            input,
            exit,
            control,
        } = self.sandbox.spawn(&self.config.program, &[], opts).await?;

        state.generation += 1;
        let generation = state.generation;
        state.disposed = false;
        state.size = Some(size);
        state.live = Some(LiveShell {
            generation,
            input,
            control,
        });
        drop(state);
        tracing::info!(program = %self.config.program, cols = size.0, rows = size.1, "Shell started");

        let shared = Arc::clone(&self.state);
        tokio::spawn(async move {
            let forward = async {
                while let Some(chunk) = output.recv().await {
                    sink.emit(&chunk);
                }
            };
            let (_, status) = tokio::join!(forward, exit);
            match status {
                Ok(code) => tracing::info!(exit_code = code, "Shell exited"),
                Err(e) => {
                    tracing::warn!(error = %e, "Shell lost");
                    sink.emit(&notice(&e));
                }
            }
            let mut state = shared.lock().await;
            if state.live.as_ref().is_some_and(|l| l.generation == generation) {
                state.live = None;
            }
        });
        Ok(())
    }

    /// Forward raw input. Dropped when no shell is live.
    pub async fn write(&self, data: &str) {
        let state = self.state.lock().await;
        match &state.live {
            Some(live) => {
                if live.input.send(data.to_string()).is_err() {
                    tracing::debug!("Shell input closed, dropping write");
                }
            }
            None => tracing::trace!(disposed = state.disposed, "No live shell, dropping write"),
        }
    }

    /// Forward terminal dimensions. A no-op when no shell is live.
    pub async fn resize(&self, cols: u16, rows: u16) {
        let mut state = self.state.lock().await;
        let Some(live) = &state.live else {
            return;
        };
        live.control.resize(cols, rows);
        state.size = Some((cols, rows));
    }

    /// Kill the shell. Later writes are dropped until the next `start`.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        if let Some(live) = state.live.take() {
            live.control.kill();
            tracing::info!("Shell disposed");
        }
        state.disposed = true;
    }

    pub async fn restart(&self, sink: Arc<dyn OutputSink>) -> Result<()> {
        self.dispose().await;
        self.start(sink).await
    }

    pub async fn is_live(&self) -> bool {
        self.state.lock().await.live.is_some()
    }

    pub async fn is_disposed(&self) -> bool {
        self.state.lock().await.disposed
    }
}
