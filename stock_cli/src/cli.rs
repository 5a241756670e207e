//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Pause before exiting on a hardware init failure, from the loaded config.
pub static REBOOT_DELAY: OnceLock<Duration> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "stockscale", version, about = "Load-cell inventory station")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/stockscale.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides logging.level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calibrate, then publish weight and stock events until interrupted
    Run,
    /// Run the tare and verification pass and print the result
    Calibrate,
    /// Take one reading from the scale (hardware presence / sim ok)
    SelfCheck,
}
