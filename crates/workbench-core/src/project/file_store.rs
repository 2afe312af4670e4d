//! The caller's file-state store: path → contents.
//!
//! Paths are `/`-separated and relative to the project root.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never read into the store.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

pub trait FileStore: Send {
    /// All file paths, sorted.
    fn paths(&self) -> Vec<String>;
    /// File contents, or `None` when absent or unreadable as text.
    fn read(&self, path: &str) -> Option<String>;
    fn write(&mut self, path: &str, contents: &str) -> io::Result<()>;
}

/// In-memory store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFileStore {
    files: BTreeMap<String, String>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
        self
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for MemoryFileStore {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().map(|(p, c)| (p.into(), c.into())).collect(),
        }
    }
}

impl FileStore for MemoryFileStore {
    fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn read(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    fn write(&mut self, path: &str, contents: &str) -> io::Result<()> {
        self.files.insert(path.to_string(), contents.to_string());
        Ok(())
    }
}

/// Store over a host project directory.
#[derive(Debug, Clone)]
pub struct DirFileStore {
    root: PathBuf,
}

impl DirFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> io::Result<PathBuf> {
        crate::path_validation::resolve_under_root(&self.root, path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

impl FileStore for DirFileStore {
    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0
                    || !(e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|d| *d == name))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(&self.root).ok()?;
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                Some(parts.join("/"))
            })
            .collect();
        paths.sort();
        paths
    }

    fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.full_path(path).ok()?).ok()
    }

    fn write(&mut self, path: &str, contents: &str) -> io::Result<()> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let mut store: MemoryFileStore = [("b.js", "b"), ("a.js", "a")].into_iter().collect();
        assert_eq!(store.paths(), vec!["a.js", "b.js"]);
        store.write("a.js", "A").unwrap();
        assert_eq!(store.read("a.js").as_deref(), Some("A"));
        assert_eq!(store.read("missing.js"), None);
    }

    #[test]
    fn test_dir_store_skips_vendored_and_writes_nested() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();
        std::fs::write(dir.path().join("src/main.ts"), "import 'x'").unwrap();
        std::fs::write(dir.path().join("node_modules/react/index.js"), "").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();

        let mut store = DirFileStore::new(dir.path());
        assert_eq!(store.paths(), vec!["package.json", "src/main.ts"]);

        store.write("src/lib/util.ts", "export {}").unwrap();
        assert_eq!(store.read("src/lib/util.ts").as_deref(), Some("export {}"));
        assert!(store.write("../escape.txt", "no").is_err());
    }
}
