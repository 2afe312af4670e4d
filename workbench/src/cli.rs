use clap::{Args, Parser, Subcommand};

/// Workbench - prepare and run JavaScript projects in a sandbox
#[derive(Parser, Debug)]
#[command(name = "workbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that install dependencies.
#[derive(Args, Debug, Clone, Default)]
pub struct PrepareArgs {
    /// Install command line (default: from env or "npm install")
    #[arg(long, value_name = "CMD")]
    pub install_command: Option<String>,

    /// Install timeout in milliseconds; 0 or less disables it (default: from env or 300000)
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub install_timeout_ms: Option<i64>,

    /// Sandbox root; the project is copied into it first (default: the project directory itself)
    #[arg(long, value_name = "DIR")]
    pub sandbox_dir: Option<String>,

    /// Keep the install cache in memory only
    #[arg(long, default_value = "false")]
    pub no_persist: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan imports, add missing dependencies, and install them unless cached
    Prepare {
        /// Project directory
        #[arg(value_name = "PROJECT_DIR", default_value = ".")]
        project_dir: String,

        #[command(flatten)]
        prepare: PrepareArgs,
    },

    /// Prepare the project, then run its start command until interrupted
    Run {
        /// Project directory
        #[arg(value_name = "PROJECT_DIR", default_value = ".")]
        project_dir: String,

        #[command(flatten)]
        prepare: PrepareArgs,

        /// Start command line (default: from env or "npm run dev")
        #[arg(long, value_name = "CMD")]
        start_command: Option<String>,

        /// Start even if preparation failed
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Open the interactive shell in the project directory
    Shell {
        /// Project directory
        #[arg(value_name = "PROJECT_DIR", default_value = ".")]
        project_dir: String,
    },

    /// List packages imported by the project and which ones are undeclared
    Scan {
        /// Project directory
        #[arg(value_name = "PROJECT_DIR", default_value = ".")]
        project_dir: String,

        /// Output JSON instead of text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Inspect or reset the install cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Print the current cache record
    Show,
    /// Remove the cache record so the next prepare reinstalls
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_prepare_overrides() {
        let cli = Cli::parse_from([
            "workbench",
            "prepare",
            "app",
            "--install-command",
            "pnpm install",
            "--install-timeout-ms",
            "-1",
        ]);
        match cli.command {
            Commands::Prepare { project_dir, prepare } => {
                assert_eq!(project_dir, "app");
                assert_eq!(prepare.install_command.as_deref(), Some("pnpm install"));
                assert_eq!(prepare.install_timeout_ms, Some(-1));
                assert!(!prepare.no_persist);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
