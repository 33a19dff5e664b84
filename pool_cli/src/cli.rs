//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "poolctl", version, about = "Swimming pool controller")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when absent
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration, then exit
    CheckConfig,
    /// List the settings topics accepted by `run`
    Topics,
    /// Run the simulated plant, reading `topic payload` lines from stdin
    Run {
        /// Filtration mode applied once every actor is up
        #[arg(long, value_name = "MODE", default_value = "eco")]
        mode: String,
        /// Stop after this many seconds instead of waiting for EOF or Ctrl-C
        #[arg(long, value_name = "SECS")]
        run_for: Option<u64>,
    },
}
