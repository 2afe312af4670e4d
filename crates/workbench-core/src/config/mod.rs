//! Workbench configuration layer.
//!
//! Every environment variable read goes through this module; the rest of the
//! workspace consumes structured config instead of calling `std::env::var`.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, `env_parse`, `.env` loading
//! - `schema`: `CommandsConfig`, `ShellConfig`, `ResolverConfig`, `CacheConfig`, `ObservabilityConfig`
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_parse, load_dotenv, load_dotenv_from_dir};
pub use schema::{
    millis_to_timeout, split_command_line, CacheConfig, CommandsConfig, ObservabilityConfig,
    ResolverConfig, ShellConfig,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_command_helpers_reachable_from_config() {
        let (program, args) = split_command_line("npm install --no-audit").unwrap();
        assert_eq!(program, "npm");
        assert_eq!(args, vec!["install", "--no-audit"]);
        assert_eq!(millis_to_timeout(1500), Some(Duration::from_millis(1500)));
        assert_eq!(millis_to_timeout(0), None);
    }
}
