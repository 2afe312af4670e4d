//! `workbench scan`: report imported packages without touching anything.

use anyhow::{Context, Result};
use serde_json::json;
use workbench_core::config::ResolverConfig;
use workbench_core::project::{find_missing, scan_files, Allowlist, FileStore, Manifest, MANIFEST_FILE};

use super::project_store;

pub fn cmd_scan(project_dir: &str, json_output: bool) -> Result<i32> {
    let project = project_store(project_dir)?;
    let imports = scan_files(&project);
    let manifest = match project.read(MANIFEST_FILE) {
        Some(text) => Some(
            Manifest::parse(&text).with_context(|| format!("Failed to parse {}", MANIFEST_FILE))?,
        ),
        None => None,
    };
    let allowlist = Allowlist::from_config(&ResolverConfig::from_env());
    let missing = find_missing(&manifest.clone().unwrap_or_default(), &imports, &allowlist);

    if json_output {
        let report = json!({
            "has_manifest": manifest.is_some(),
            "imports": imports,
            "missing": missing,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    if manifest.is_none() {
        eprintln!("No {} in {}", MANIFEST_FILE, project.root().display());
    }
    println!("Imported packages ({}):", imports.len());
    for name in &imports {
        let marker = if missing.contains(name) { "  (undeclared)" } else { "" };
        println!("  {}{}", name, marker);
    }
    Ok(0)
}
