//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "shelf-node", version, about = "Shelf sensor node")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/shelf_node.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty; command output becomes JSON too
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Use the simulated radio, rangers, broker and resolver
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the node until Ctrl-C
    Run {
        /// Stop after this many milliseconds instead of waiting for Ctrl-C
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Validate config, open storage and take one reading per slot
    SelfCheck,
    /// Print the persisted slot table
    Slots,
    /// Measure the empty-slot reference length of one slot
    Calibrate {
        /// Slot id, e.g. A1
        #[arg(long, value_name = "ID")]
        slot: String,
    },
    /// Erase persisted slot state
    Reset,
    /// Print the device identity
    Identity,
}
