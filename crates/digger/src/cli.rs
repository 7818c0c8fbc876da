use clap::{Parser, Subcommand};
use digger_core::DiggerConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "digger", version)]
#[command(about = "Watch third-party hostnames for DNS address changes.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (YAML); defaults to ./config.yaml when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overwrite sites with several known addresses instead of reporting them
    #[arg(long, global = true)]
    pub update: bool,

    /// Re-check every N seconds until interrupted (minimum 60)
    #[arg(long, global = true, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Do not write the catalog back after checking
    #[arg(long, global = true)]
    pub no_export: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Resolve every site, record and notify changes (default)
    #[command(alias = "c")]
    Check,
    /// Print the change log, oldest first
    #[command(alias = "r")]
    Report,
    /// Print the number of recorded changes
    Count {
        /// Only count changes of this hostname
        hostname: Option<String>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Check)
    }

    /// Apply flags that override configuration values
    pub fn apply_overrides(&self, config: &mut DiggerConfig) {
        if self.update {
            config.engine.update_mode = true;
        }
        if let Some(interval) = self.interval {
            config.engine.interval_secs = Some(interval);
        }
    }
}
