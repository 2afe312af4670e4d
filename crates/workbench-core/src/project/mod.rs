//! Project model: the manifest, the caller's file store, the mountable file
//! tree, import scanning, and dependency resolution.

pub mod dependency_resolver;
pub mod file_store;
pub mod import_scan;
pub mod manifest;
pub mod tree;

pub use dependency_resolver::{find_missing, resolve_missing, Allowlist, PERMISSIVE_VERSION};
pub use file_store::{DirFileStore, FileStore, MemoryFileStore};
pub use import_scan::{extract_package_name, scan_files, scan_source};
pub use manifest::{Manifest, ManifestError, MANIFEST_FILE};
pub use tree::{FileNode, FileTree};
