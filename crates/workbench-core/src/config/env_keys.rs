//! Environment variable key constants.

/// Install / start commands.
pub mod commands {
    pub const WORKBENCH_INSTALL_COMMAND: &str = "WORKBENCH_INSTALL_COMMAND";
    pub const WORKBENCH_START_COMMAND: &str = "WORKBENCH_START_COMMAND";
    /// Install timeout in milliseconds. `<= 0` disables the bound.
    pub const WORKBENCH_INSTALL_TIMEOUT_MS: &str = "WORKBENCH_INSTALL_TIMEOUT_MS";
    pub const INSTALL_TIMEOUT_ALIASES: &[&str] = &["WORKBENCH_INSTALL_TIMEOUT"];
}

/// Interactive shell.
pub mod shell {
    pub const WORKBENCH_SHELL: &str = "WORKBENCH_SHELL";
    pub const WORKBENCH_SHELL_COLS: &str = "WORKBENCH_SHELL_COLS";
    pub const WORKBENCH_SHELL_ROWS: &str = "WORKBENCH_SHELL_ROWS";
}

/// Dependency resolution.
pub mod resolver {
    /// Comma-separated framework packages that are never auto-installed.
    pub const WORKBENCH_IMPLICIT_PACKAGES: &str = "WORKBENCH_IMPLICIT_PACKAGES";
}

/// Durable cache directory.
pub mod cache {
    pub const WORKBENCH_CACHE_DIR: &str = "WORKBENCH_CACHE_DIR";
    pub const CACHE_DIR_ALIASES: &[&str] = &["WB_CACHE_DIR"];
}

/// Observability and logging.
pub mod observability {
    pub const WORKBENCH_QUIET: &str = "WORKBENCH_QUIET";
    pub const QUIET_ALIASES: &[&str] = &["WB_QUIET"];

    pub const WORKBENCH_LOG_LEVEL: &str = "WORKBENCH_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["WB_LOG_LEVEL"];

    pub const WORKBENCH_LOG_JSON: &str = "WORKBENCH_LOG_JSON";
    pub const LOG_JSON_ALIASES: &[&str] = &["WB_LOG_JSON"];

    pub const WORKBENCH_AUDIT_LOG: &str = "WORKBENCH_AUDIT_LOG";
    pub const AUDIT_LOG_ALIASES: &[&str] = &["WB_AUDIT_LOG"];
}
