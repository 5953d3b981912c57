use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "llm-telemetry", version, about = "LLM telemetry ingestion client")]
pub struct Cli {
    /// Configuration file path (LANGFUSE_* environment variables override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Send a sample trace and report whether it was accepted
    Ping {
        /// Name of the sample trace
        #[arg(short, long, default_value = "llm-telemetry-ping")]
        name: String,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,
    /// Validate the configuration
    Validate,
}
