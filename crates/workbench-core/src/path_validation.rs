//! Path validation utilities.
//!
//! Sandbox paths are `/`-separated and relative to the sandbox root. These
//! helpers normalize them and reject anything that would escape the root.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path escapes sandbox root: {0}")]
    Escapes(String),
}

/// Normalize a sandbox path: leading `/` and `./` are dropped, `.` segments
/// vanish, `..` pops a segment. The root itself normalizes to `""`.
pub fn normalize_sandbox_path(path: &str) -> Result<String, PathError> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(PathError::Escapes(path.to_string()));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Validate `path` and join it onto `root`. Prevents path traversal.
pub fn resolve_under_root(root: &Path, path: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize_sandbox_path(path)?;
    let mut full = root.to_path_buf();
    for segment in normalized.split('/').filter(|s| !s.is_empty()) {
        full.push(segment);
    }
    Ok(full)
}

/// Parent of a normalized sandbox path (`""` for top-level entries).
pub fn sandbox_parent(normalized: &str) -> &str {
    normalized.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_sandbox_path("/src/./main.ts").unwrap(), "src/main.ts");
        assert_eq!(normalize_sandbox_path("./a/b/../c").unwrap(), "a/c");
        assert_eq!(normalize_sandbox_path("/").unwrap(), "");
    }

    #[test]
    fn test_rejects_escape() {
        assert_eq!(
            normalize_sandbox_path("../etc/passwd"),
            Err(PathError::Escapes("../etc/passwd".to_string()))
        );
        assert!(normalize_sandbox_path("a/../../b").is_err());
    }

    #[test]
    fn test_resolve_under_root() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            resolve_under_root(root, "/node_modules/.bin").unwrap(),
            root.join("node_modules").join(".bin")
        );
        assert!(resolve_under_root(root, "..").is_err());
    }

    #[test]
    fn test_sandbox_parent() {
        assert_eq!(sandbox_parent("a/b/c.js"), "a/b");
        assert_eq!(sandbox_parent("package.json"), "");
    }
}
