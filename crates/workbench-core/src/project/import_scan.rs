//! Import scanning: which packages does the source reference?
//!
//! A lexical, regex-based heuristic over ES `import`/`export … from`, dynamic
//! `import()`, and CommonJS `require()`. It does not parse JavaScript, so
//! imports inside comments or strings are reported too, and computed
//! specifiers (`require(name)`) are missed.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::file_store::FileStore;

/// Extensions of files that are scanned.
pub const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// Vendored-dependency directory; never scanned.
pub const VENDORED_DIR: &str = "node_modules";

const IMPORT_PATTERNS: &[&str] = &[
    // import x from 'a' / import {a, b} from "a" / import 'a' / export * from 'a'
    r#"\b(?:import|export)\s+(?:[\w$*{}\s,]+?\s+from\s+)?["']([^"'\n]+)["']"#,
    // import('a')
    r#"\bimport\s*\(\s*["']([^"'\n]+)["']\s*\)"#,
    // require('a')
    r#"\brequire\s*\(\s*["']([^"'\n]+)["']\s*\)"#,
];

fn import_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        IMPORT_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!(pattern = p, error = %e, "Invalid import pattern");
                    None
                }
            })
            .collect()
    })
}

/// Map a module specifier to the package that provides it.
///
/// Relative/absolute paths, URLs, `node:` built-ins, and bundler aliases
/// (`~/x`, `#x`, `@/x`) yield `None`. `@scope/name/sub` → `@scope/name`,
/// `lodash/fp` → `lodash`.
pub fn extract_package_name(specifier: &str) -> Option<String> {
    let spec = specifier.trim();
    if spec.is_empty()
        || spec.starts_with('.')
        || spec.starts_with('/')
        || spec.starts_with('~')
        || spec.starts_with('#')
        || spec.starts_with("node:")
        || spec.contains("://")
    {
        return None;
    }

    let mut segments = spec.split('/');
    if spec.starts_with('@') {
        let scope = segments.next().filter(|s| s.len() > 1)?;
        let name = segments.next().filter(|s| !s.is_empty())?;
        Some(format!("{}/{}", scope, name))
    } else {
        segments.next().map(String::from)
    }
}

/// Package names referenced by one file's source text.
pub fn scan_source(text: &str) -> BTreeSet<String> {
    import_regexes()
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| extract_package_name(m.as_str()))
        .collect()
}

/// Whether `path` is a source file outside the vendored directory.
pub fn is_scannable(path: &str) -> bool {
    if path.split('/').any(|segment| segment == VENDORED_DIR) {
        return false;
    }
    path.rsplit_once('.')
        .map(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Aggregate import set over every scannable file of the store.
pub fn scan_files(store: &dyn FileStore) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    let mut scanned = 0usize;
    for path in store.paths().iter().filter(|p| is_scannable(p)) {
        if let Some(text) = store.read(path) {
            imports.extend(scan_source(&text));
            scanned += 1;
        }
    }
    tracing::debug!(files = scanned, packages = imports.len(), "Import scan complete");
    imports
}
