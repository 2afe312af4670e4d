//! `workbench cache show|clear`

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use workbench_core::cache_store::FileCacheStore;
use workbench_sandbox::install_cache::LOCKFILE_NAMES;
use workbench_sandbox::{LocalSandbox, INSTALL_CACHE_KEY};

use crate::cli::CacheAction;
use crate::session::{Session, SessionConfig};

pub async fn cmd_cache(action: CacheAction) -> Result<i32> {
    let store = Arc::new(FileCacheStore::from_env());
    let store_path = store.path().display().to_string();
    let session = Session::new(
        Arc::new(LocalSandbox::new(Path::new("."))),
        store,
        SessionConfig::default(),
    );
    let cache = session.cache();

    match action {
        CacheAction::Show => match cache.record().await {
            Some(record) => {
                println!("key:             {}", INSTALL_CACHE_KEY);
                println!("store:           {}", store_path);
                println!("dependency hash: {}", record.dependency_hash);
                match (&record.lockfile_name, &record.lockfile) {
                    (name, Some(blob)) => println!(
                        "lockfile:        {} ({} bytes)",
                        name.as_deref().unwrap_or(LOCKFILE_NAMES[0]),
                        blob.len()
                    ),
                    (_, None) => println!("lockfile:        (none)"),
                }
            }
            None => eprintln!("No install cache record in {}", store_path),
        },
        CacheAction::Clear => {
            cache
                .clear()
                .await
                .with_context(|| format!("Failed to clear install cache in {}", store_path))?;
            eprintln!("Install cache cleared");
        }
    }
    Ok(0)
}
