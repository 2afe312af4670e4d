//! Dependency diff: scanned imports vs. declared manifest.
//!
//! `missing = imports − declared − allowlist`. Missing names are added to the
//! runtime group with a permissive `"latest"` marker; exact pinning is left to
//! the package manager. Declared entries are never removed or rewritten.

use std::collections::BTreeSet;

use super::manifest::Manifest;
use crate::config::ResolverConfig;

/// Version marker for auto-added dependencies.
pub const PERMISSIVE_VERSION: &str = "latest";

/// Node.js built-in modules (bare-specifier form).
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Packages that must never be auto-installed.
#[derive(Debug, Clone)]
pub struct Allowlist {
    names: BTreeSet<String>,
}

impl Allowlist {
    /// Node built-ins plus the given framework packages.
    pub fn new<S: AsRef<str>>(framework_packages: &[S]) -> Self {
        let names = NODE_BUILTINS
            .iter()
            .map(|s| s.to_string())
            .chain(framework_packages.iter().map(|s| s.as_ref().to_string()))
            .collect();
        Self { names }
    }

    pub fn from_config(cfg: &ResolverConfig) -> Self {
        Self::new(&cfg.implicit_packages)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

/// Imports that are neither declared nor allowlisted, sorted.
pub fn find_missing(
    manifest: &Manifest,
    imports: &BTreeSet<String>,
    allowlist: &Allowlist,
) -> Vec<String> {
    let existing = manifest.dependency_set();
    imports
        .iter()
        .filter(|name| !existing.contains(*name) && !allowlist.contains(name))
        .cloned()
        .collect()
}

/// Add every missing import to the runtime group. Returns the added names.
pub fn resolve_missing(
    manifest: &mut Manifest,
    imports: &BTreeSet<String>,
    allowlist: &Allowlist,
) -> Vec<String> {
    let missing = find_missing(manifest, imports, allowlist);
    let added: Vec<String> = missing
        .into_iter()
        .filter(|name| manifest.add_runtime_dependency(name, PERMISSIVE_VERSION))
        .collect();
    if !added.is_empty() {
        tracing::info!(packages = ?added, "Added undeclared imports to manifest");
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_zustand_added_react_untouched() {
        let mut m = Manifest::parse(r#"{"dependencies":{"react":"^18"}}"#).unwrap();
        let imports = set(&["react", "zustand"]);
        let allow = Allowlist::new::<&str>(&[]);
        assert_eq!(find_missing(&m, &imports, &allow), vec!["zustand"]);

        let added = resolve_missing(&mut m, &imports, &allow);
        assert_eq!(added, vec!["zustand"]);
        let deps = m.dependencies();
        assert_eq!(deps.get("zustand").map(String::as_str), Some("latest"));
        assert_eq!(deps.get("react").map(String::as_str), Some("^18"));
    }

    #[test]
    fn test_dev_dependencies_count_as_declared() {
        let m = Manifest::from_groups(&[], &[("vitest", "^1")]);
        let missing = find_missing(&m, &set(&["vitest"]), &Allowlist::new::<&str>(&[]));
        assert!(missing.is_empty());
    }

    #[test]
    fn test_allowlist_excludes_builtins_and_framework() {
        let m = Manifest::default();
        let allow = Allowlist::new(&["react"]);
        let missing = find_missing(&m, &set(&["fs", "path", "react", "axios"]), &allow);
        assert_eq!(missing, vec!["axios"]);
    }

    #[test]
    fn test_never_removes_declared_entries() {
        let mut m = Manifest::from_groups(&[("left-pad", "1.0.0"), ("unused", "2")], &[]);
        let before = m.dependency_set();
        resolve_missing(&mut m, &set(&["left-pad", "chalk"]), &Allowlist::default());
        let after = m.dependency_set();
        assert!(before.is_subset(&after));
        assert!(after.contains("chalk"));
    }

    #[test]
    fn test_nothing_missing_returns_empty() {
        let mut m = Manifest::from_groups(&[("a", "1")], &[]);
        let before = m.clone();
        assert!(resolve_missing(&mut m, &set(&["a"]), &Allowlist::default()).is_empty());
        assert_eq!(m, before);
    }
}
