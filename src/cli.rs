// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `autosign`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autosign",
    version,
    about = "Replay declarative check-in scripts against an Android device.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task file (TOML).
    ///
    /// Default: `AUTOSIGN_CONFIG`, else `Autosign.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Run only this task (by id), whether or not it is enabled.
    #[arg(long, value_name = "ID")]
    pub task: Option<u32>,

    /// Disable a task for this invocation. May be repeated.
    #[arg(long = "skip", value_name = "ID")]
    pub skip: Vec<u32>,

    /// Print the task set and exit.
    #[arg(long)]
    pub list: bool,

    /// Parse + validate, compile every step, but don't touch the device.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run result as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// adb device serial; overrides `[device].serial`.
    #[arg(long, value_name = "SERIAL")]
    pub serial: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AUTOSIGN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
