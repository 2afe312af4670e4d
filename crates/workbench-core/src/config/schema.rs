//! Config structs grouped by concern, loaded from the environment.

use super::env_keys::{
    cache as cache_keys, commands as cmd_keys, observability as obv_keys,
    resolver as resolver_keys, shell as shell_keys,
};
use super::loader::{env_bool, env_optional, env_or, env_parse, split_list};
use std::path::PathBuf;
use std::time::Duration;

/// Default bound for the install command: five minutes.
pub const DEFAULT_INSTALL_TIMEOUT_MS: i64 = 300_000;

/// `ms > 0` is a bound, anything else disables the timeout.
pub fn millis_to_timeout(ms: i64) -> Option<Duration> {
    u64::try_from(ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Split a command line on whitespace into program + args. No quoting support.
pub fn split_command_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(String::from);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Install and start commands run through the process supervisor.
#[derive(Debug, Clone)]
pub struct CommandsConfig {
    pub install_command: String,
    pub start_command: String,
    pub install_timeout_ms: i64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            install_command: "npm install".to_string(),
            start_command: "npm run dev".to_string(),
            install_timeout_ms: DEFAULT_INSTALL_TIMEOUT_MS,
        }
    }
}

impl CommandsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let defaults = Self::default();
        Self {
            install_command: env_or(cmd_keys::WORKBENCH_INSTALL_COMMAND, &[], || {
                defaults.install_command.clone()
            }),
            start_command: env_or(cmd_keys::WORKBENCH_START_COMMAND, &[], || {
                defaults.start_command.clone()
            }),
            install_timeout_ms: env_parse(
                cmd_keys::WORKBENCH_INSTALL_TIMEOUT_MS,
                cmd_keys::INSTALL_TIMEOUT_ALIASES,
                defaults.install_timeout_ms,
            ),
        }
    }

    /// Override with CLI parameters.
    pub fn with_cli_overrides(
        mut self,
        install_command: Option<String>,
        start_command: Option<String>,
        install_timeout_ms: Option<i64>,
    ) -> Self {
        if let Some(cmd) = install_command {
            self.install_command = cmd;
        }
        if let Some(cmd) = start_command {
            self.start_command = cmd;
        }
        if let Some(ms) = install_timeout_ms {
            self.install_timeout_ms = ms;
        }
        self
    }

    pub fn install_timeout(&self) -> Option<Duration> {
        millis_to_timeout(self.install_timeout_ms)
    }
}

/// Interactive shell program and initial terminal size.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub program: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

impl ShellConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let defaults = Self::default();
        Self {
            program: env_or(shell_keys::WORKBENCH_SHELL, &[], || defaults.program.clone()),
            cols: env_parse(shell_keys::WORKBENCH_SHELL_COLS, &[], defaults.cols),
            rows: env_parse(shell_keys::WORKBENCH_SHELL_ROWS, &[], defaults.rows),
        }
    }
}

/// Framework packages that the resolver must never auto-install.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub implicit_packages: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            implicit_packages: vec!["react".to_string(), "react-dom".to_string()],
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        match env_optional(resolver_keys::WORKBENCH_IMPLICIT_PACKAGES, &[]) {
            Some(raw) => Self {
                implicit_packages: split_list(&raw),
            },
            None => Self::default(),
        }
    }
}

/// Durable cache directory.
#[derive(Debug, Clone)]
pub struct CacheConfig;

impl CacheConfig {
    /// `$WORKBENCH_CACHE_DIR`, else `<platform cache dir>/workbench`, else `./.cache/workbench`.
    pub fn cache_dir() -> PathBuf {
        super::loader::load_dotenv();
        env_optional(cache_keys::WORKBENCH_CACHE_DIR, cache_keys::CACHE_DIR_ALIASES)
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|d| d.join("workbench")))
            .unwrap_or_else(|| PathBuf::from(".").join(".cache").join("workbench"))
    }
}

/// Observability: quiet, log_level, log_json, audit_log.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::WORKBENCH_QUIET, obv_keys::QUIET_ALIASES, false),
                log_level: env_or(
                    obv_keys::WORKBENCH_LOG_LEVEL,
                    obv_keys::LOG_LEVEL_ALIASES,
                    || "workbench=info".to_string(),
                ),
                log_json: env_bool(obv_keys::WORKBENCH_LOG_JSON, obv_keys::LOG_JSON_ALIASES, false),
                audit_log: env_optional(obv_keys::WORKBENCH_AUDIT_LOG, obv_keys::AUDIT_LOG_ALIASES),
            }
        })
    }
}
