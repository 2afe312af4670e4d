//! Install cache: skip `npm install` when nothing changed.
//!
//! The cache record stores a fingerprint of the declared dependencies and the
//! lockfile produced by the last successful install. An install is needed
//! unless the fingerprint matches **and** `node_modules` exists in the
//! sandbox. Scope is one fixed key, not one per project.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::backend::{read_optional, Sandbox};
use workbench_core::cache_store::{CacheError, CacheStore};
use workbench_core::observability;
use workbench_core::project::Manifest;

pub const INSTALL_CACHE_KEY: &str = "workbench:install-cache";

/// Directory the package manager installs into.
pub const ARTIFACTS_DIR: &str = "node_modules";

/// Lockfile names, highest priority first.
pub const LOCKFILE_NAMES: &[&str] = &["package-lock.json", "yarn.lock"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub dependency_hash: String,
    #[serde(default, rename = "lockfileBlob")]
    pub lockfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockfile_name: Option<String>,
}

/// SHA-256 hex over the merged dependency map (dev wins on shared keys).
/// Keys are sorted before hashing, so insertion order does not matter.
pub fn deps_hash(manifest: &Manifest) -> String {
    let merged = manifest.merged_dependencies();
    let canonical = serde_json::to_string(&merged).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct InstallCache {
    sandbox: Arc<dyn Sandbox>,
    store: Arc<dyn CacheStore>,
    key: String,
}

impl InstallCache {
    pub fn new(sandbox: Arc<dyn Sandbox>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            sandbox,
            store,
            key: INSTALL_CACHE_KEY.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current record. Unreadable or corrupt records count as absent.
    pub async fn record(&self) -> Option<CacheRecord> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Cache store unavailable, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Corrupt cache record, treating as miss");
                None
            }
        }
    }

    pub async fn needs_install(&self, manifest: &Manifest) -> bool {
        let hash = deps_hash(manifest);
        let (needs, reason) = match self.record().await {
            None => (true, "no cache record"),
            Some(record) if record.dependency_hash != hash => (true, "dependencies changed"),
            Some(_) if !self.sandbox.exists(ARTIFACTS_DIR).await => {
                (true, "install artifacts missing")
            }
            Some(_) => (false, "cache hit"),
        };
        tracing::info!(hash = %hash, needs_install = needs, reason, "Install cache check");
        observability::audit_install_decision(&hash, needs, reason);
        needs
    }

    /// Write the cached lockfile back into the sandbox. Best-effort: every
    /// failure is logged and swallowed. Returns the name written, if any.
    pub async fn restore_lockfile(&self) -> Option<String> {
        let record = self.record().await?;
        let blob = record.lockfile?;
        let name = record
            .lockfile_name
            .unwrap_or_else(|| LOCKFILE_NAMES[0].to_string());
        match self.sandbox.write_file(&name, &blob).await {
            Ok(()) => {
                tracing::info!(lockfile = %name, bytes = blob.len(), "Restored cached lockfile");
                Some(name)
            }
            Err(e) => {
                tracing::warn!(lockfile = %name, error = %e, "Could not restore lockfile, installing without it");
                None
            }
        }
    }

    /// Record a successful install: the manifest's hash plus whichever
    /// lockfile the install produced. A missing lockfile still stores the hash.
    pub async fn persist(&self, manifest: &Manifest) -> Result<CacheRecord, CacheError> {
        let mut record = CacheRecord {
            dependency_hash: deps_hash(manifest),
            lockfile: None,
            lockfile_name: None,
        };
        for name in LOCKFILE_NAMES {
            match read_optional(self.sandbox.as_ref(), name).await {
                Ok(Some(blob)) => {
                    record.lockfile = Some(blob);
                    record.lockfile_name = Some(name.to_string());
                    break;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(lockfile = %name, error = %e, "Could not read lockfile"),
            }
        }
        if record.lockfile.is_none() {
            tracing::info!("No lockfile produced; caching hash only");
        }
        let raw = serde_json::to_string(&record).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        self.store.put(&self.key, &raw).await?;
        tracing::info!(hash = %record.dependency_hash, "Install cache updated");
        Ok(record)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store.remove(&self.key).await
    }
}
