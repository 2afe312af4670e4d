//! Logging helpers.
//!
//! `info_log!` is quiet-mode aware: with WORKBENCH_QUIET=1 its lines are
//! suppressed. `notice` formats the diagnostic lines written to output sinks,
//! which users see inline with process output.

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {{
        if !$crate::log::is_quiet() {
            tracing::info!($($arg)*);
        }
    }};
}

pub fn is_quiet() -> bool {
    workbench_core::config::ObservabilityConfig::from_env().quiet
}

/// Prefix for diagnostic lines injected into process output.
pub const NOTICE_PREFIX: &str = "[workbench]";

/// One diagnostic line for an output sink, newline-terminated.
pub fn notice(message: impl std::fmt::Display) -> String {
    format!("{} {}\n", NOTICE_PREFIX, message)
}
