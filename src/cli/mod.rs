//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for fleetcam.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "fleetcam")]
#[command(about = "Fleetcam Live View Orchestrator")]
#[command(long_about = "Live multi-channel dashcam stream orchestrator for fleet monitoring")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Dry-run mode: show configuration and planned selections without
    /// contacting the stream backend
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the live view session until interrupted
    #[command(hide = true)]
    Watch,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Watch
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Reset configuration to defaults
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Adjust log level based on verbose flag
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }

    /// Check if we're running in dry-run mode
    pub fn is_dry_run_mode(&self) -> bool {
        self.dry_run
    }
}
