//! Observability: tracing init and the JSONL audit log.
//!
//! Uses `config::ObservabilityConfig` for WORKBENCH_QUIET, LOG_LEVEL, LOG_JSON, AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Tracing initialization mode.
#[derive(Clone, Copy)]
pub enum TracingMode {
    /// Use WORKBENCH_LOG_LEVEL / WORKBENCH_QUIET from env
    Default,
    /// Interactive shell: keep the terminal free of info lines
    Interactive,
}

/// Initialize tracing. Call once at process startup.
/// With WORKBENCH_QUIET=1 only WARN and above are logged.
pub fn init_tracing(mode: TracingMode) {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let mut level = if cfg.quiet {
        "workbench=warn".to_string()
    } else {
        cfg.log_level.clone()
    };
    if matches!(mode, TracingMode::Interactive) {
        level = format!("{},workbench_sandbox=warn", level);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}

fn get_audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = crate::config::ObservabilityConfig::from_env().audit_log.clone()?;
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = AUDIT_PATH.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Audit: execution_started (right before spawn)
pub fn audit_execution_started(command: &str, args: &[String], timeout_ms: Option<u128>) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": now(),
            "event": "execution_started",
            "cmd": command,
            "args": args,
            "timeout_ms": timeout_ms,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: execution_completed
pub fn audit_execution_completed(command: &str, exit_code: i32, duration_ms: u64, killed: bool) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": now(),
            "event": "execution_completed",
            "cmd": command,
            "exit_code": exit_code,
            "duration_ms": duration_ms,
            "killed": killed,
            "success": exit_code == 0,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: install cache decision (hit / miss and why)
pub fn audit_install_decision(dependency_hash: &str, needs_install: bool, reason: &str) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": now(),
            "event": "install_decision",
            "dependency_hash": dependency_hash,
            "needs_install": needs_install,
            "reason": reason,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: packages added to the manifest by the resolver
pub fn audit_dependencies_added(packages: &[String]) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": now(),
            "event": "dependencies_added",
            "packages": packages,
        });
        append_jsonl(&path, &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_jsonl_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let path = path.to_string_lossy().to_string();
        append_jsonl(&path, &json!({"event": "a"}));
        append_jsonl(&path, &json!({"event": "b"}));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "b");
    }
}
