//! Nested file tree mounted into the sandbox.
//!
//! Serialized as `{"name": {"file": {"contents": ".."}}, "dir": {"directory": {..}}}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::file_store::FileStore;
use crate::path_validation::{normalize_sandbox_path, PathError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileNode {
    File { contents: String },
    Directory(BTreeMap<String, FileNode>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    pub root: BTreeMap<String, FileNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every readable file of `store`.
    pub fn from_store(store: &dyn FileStore) -> Self {
        let mut tree = Self::new();
        for path in store.paths() {
            let Some(contents) = store.read(&path) else {
                continue;
            };
            if let Err(e) = tree.insert(&path, contents) {
                tracing::warn!(path = %path, error = %e, "Skipping file outside project root");
            }
        }
        tree
    }

    /// Insert a file, creating intermediate directories. A file sitting where a
    /// directory is needed is replaced.
    pub fn insert(&mut self, path: &str, contents: String) -> Result<(), PathError> {
        let normalized = normalize_sandbox_path(path)?;
        let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let Some(file_name) = segments.pop() else {
            return Err(PathError::Escapes(path.to_string()));
        };

        insert_at(&mut self.root, &segments, file_name, contents);
        Ok(())
    }

    /// Flatten to `(path, contents)` pairs, depth-first in name order.
    pub fn files(&self) -> Vec<(String, &str)> {
        fn walk<'a>(
            prefix: &str,
            dir: &'a BTreeMap<String, FileNode>,
            out: &mut Vec<(String, &'a str)>,
        ) {
            for (name, node) in dir {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                match node {
                    FileNode::File { contents } => out.push((path, contents.as_str())),
                    FileNode::Directory(children) => walk(&path, children, out),
                }
            }
        }
        let mut out = Vec::new();
        walk("", &self.root, &mut out);
        out
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }
}

fn insert_at(
    dir: &mut BTreeMap<String, FileNode>,
    segments: &[&str],
    file_name: &str,
    contents: String,
) {
    let Some((first, rest)) = segments.split_first() else {
        dir.insert(file_name.to_string(), FileNode::File { contents });
        return;
    };
    let node = dir
        .entry(first.to_string())
        .or_insert_with(|| FileNode::Directory(BTreeMap::new()));
    match node {
        FileNode::Directory(children) => insert_at(children, rest, file_name, contents),
        FileNode::File { .. } => {
            let mut children = BTreeMap::new();
            insert_at(&mut children, rest, file_name, contents);
            *node = FileNode::Directory(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::file_store::MemoryFileStore;

    #[test]
    fn test_from_store_nests_directories() {
        let store: MemoryFileStore = [
            ("package.json", "{}"),
            ("src/main.tsx", "main"),
            ("src/components/App.tsx", "app"),
        ]
        .into_iter()
        .collect();
        let tree = FileTree::from_store(&store);
        assert_eq!(tree.file_count(), 3);
        assert_eq!(
            tree.files()
                .into_iter()
                .map(|(p, _)| p)
                .collect::<Vec<_>>(),
            vec!["package.json", "src/components/App.tsx", "src/main.tsx"]
        );
    }

    #[test]
    fn test_serializes_in_mount_format() {
        let mut tree = FileTree::new();
        tree.insert("src/index.js", "x".to_string()).unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["src"]["directory"]["index.js"]["file"]["contents"], "x");
        let back: FileTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_insert_replaces_file_with_directory() {
        let mut tree = FileTree::new();
        tree.insert("lib", "stale".to_string()).unwrap();
        tree.insert("lib/a/b.js", "b".to_string()).unwrap();
        tree.insert("lib/a/c.js", "c".to_string()).unwrap();
        let files = tree.files();
        assert_eq!(files, vec![("lib/a/b.js".to_string(), "b"), ("lib/a/c.js".to_string(), "c")]);
    }

    #[test]
    fn test_insert_rejects_root_and_escape() {
        let mut tree = FileTree::new();
        assert!(tree.insert("/", String::new()).is_err());
        assert!(tree.insert("../x", String::new()).is_err());
    }
}
