//! Sandbox layer of the workbench.
//!
//! - [`backend`]: the `Sandbox` trait every runtime implements
//! - [`local`]: host-directory sandbox used by the CLI
//! - [`supervisor`]: bounded one-shot runs and cancellable background runs
//! - [`shell`]: the session's interactive shell
//! - [`install_cache`]: whether `npm install` can be skipped
//! - [`single_flight`]: per-key serialization of overlapping work

pub mod backend;
pub mod error;
pub mod install_cache;
pub mod local;
pub mod log;
pub mod shell;
pub mod single_flight;
pub mod supervisor;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use backend::{
    DirEntry, ProcessControl, Sandbox, SandboxProcess, ServerReady, SpawnOptions,
};
pub use error::SandboxError;
pub use install_cache::{deps_hash, CacheRecord, InstallCache, INSTALL_CACHE_KEY};
pub use local::LocalSandbox;
pub use shell::ShellSession;
pub use single_flight::SingleFlight;
pub use supervisor::{
    BufferSink, OutputSink, ProcessSupervisor, RunHandle, StdoutSink, EXIT_FAILURE, EXIT_TIMEOUT,
};
