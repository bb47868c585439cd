//! Command-line interface for junos-push.

pub mod output;

use clap::{Parser, ValueEnum};
use junos_push::operation::OperationKind;
use junos_push::runner::RunOptions;
use std::path::PathBuf;

/// Push set-format configuration to a pair of Junos devices
///
/// Validates the configuration file, checks both devices, then runs the
/// operation on each and reports per-device results.
#[derive(Parser, Debug, Clone)]
#[command(name = "junos-push")]
#[command(version)]
#[command(about = "Push set-format configuration to a pair of Junos devices", long_about = None)]
pub struct Cli {
    /// Inventory group to target (exactly two devices)
    #[arg(short = 'g', long)]
    pub group: String,

    /// Configuration file of set/delete statements
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<PathBuf>,

    /// Operation: check, commit, commit-confirmed, rollback, compare
    #[arg(short = 'o', long, default_value = "check")]
    pub operation: OperationKind,

    /// Inventory file
    #[arg(short = 'i', long, default_value = "config.ini", env = "JUNOS_PUSH_INVENTORY")]
    pub inventory: PathBuf,

    /// Connect and check lock status only; print what would be done
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run both devices concurrently
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Save running configurations before changing them
    #[arg(long)]
    pub backup: bool,

    /// Per-call device timeout in seconds [default: 60]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Commit-confirmed window in minutes [default: 5]
    #[arg(long = "confirm-minutes")]
    pub confirm_minutes: Option<u32>,

    /// Treat preflight warnings as failures
    #[arg(long)]
    pub strict: bool,

    /// Output format
    #[arg(long, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-2)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(2)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }

    /// Invocation parameters for the runner
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            group: self.group.clone(),
            config_file: self.config_file.clone(),
            operation: self.operation,
            inventory: self.inventory.clone(),
            dry_run: self.dry_run,
            verbose: self.verbose > 0,
            parallel: self.parallel,
            backup: self.backup,
            timeout: self.timeout,
            confirm_minutes: self.confirm_minutes,
            strict: self.strict,
        }
    }
}
