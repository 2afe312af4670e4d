//! Session context: everything one workbench session owns.
//!
//! Built once and passed explicitly; nothing here is process-global.

use std::path::Path;
use std::sync::Arc;

use workbench_core::cache_store::{CacheStore, FileCacheStore, MemoryCacheStore};
use workbench_core::config::{CommandsConfig, ResolverConfig, ShellConfig};
use workbench_sandbox::{
    InstallCache, LocalSandbox, ProcessSupervisor, Sandbox, ShellSession, SingleFlight,
};

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub commands: CommandsConfig,
    pub shell: ShellConfig,
    pub resolver: ResolverConfig,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            commands: CommandsConfig::from_env(),
            shell: ShellConfig::from_env(),
            resolver: ResolverConfig::from_env(),
        }
    }
}

pub struct Session {
    sandbox: Arc<dyn Sandbox>,
    cache: InstallCache,
    supervisor: ProcessSupervisor,
    shell: ShellSession,
    flights: SingleFlight,
    config: SessionConfig,
}

impl Session {
    pub fn new(sandbox: Arc<dyn Sandbox>, store: Arc<dyn CacheStore>, config: SessionConfig) -> Self {
        Self {
            cache: InstallCache::new(Arc::clone(&sandbox), store),
            supervisor: ProcessSupervisor::new(Arc::clone(&sandbox)),
            shell: ShellSession::new(Arc::clone(&sandbox), config.shell.clone()),
            flights: SingleFlight::new(),
            sandbox,
            config,
        }
    }

    /// Session over a host directory. With `persist`, the install cache
    /// survives restarts under the configured cache directory.
    pub fn local(sandbox_root: &Path, persist: bool, config: SessionConfig) -> Self {
        let store: Arc<dyn CacheStore> = if persist {
            Arc::new(FileCacheStore::from_env())
        } else {
            Arc::new(MemoryCacheStore::new())
        };
        tracing::debug!(root = %sandbox_root.display(), persist, "Creating local session");
        Self::new(Arc::new(LocalSandbox::new(sandbox_root)), store, config)
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    pub fn cache(&self) -> &InstallCache {
        &self.cache
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn shell(&self) -> &ShellSession {
        &self.shell
    }

    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
