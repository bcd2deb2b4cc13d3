//! CLI argument definitions
//!
//! All Clap derive structs for `defuse` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::schema::{ConfigOverrides, DurationValue};
use crate::transport::DEFAULT_BIND_ADDR;

// ============================================================================
// Root CLI
// ============================================================================

/// Countdown, code and wire-puzzle engine for an escape-room bomb prop.
#[derive(Parser, Debug)]
#[command(name = "defuse", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "DEFUSE_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "DEFUSE_LOG_FORMAT")]
    pub log_format: LogFormatChoice,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run or check the game server.
    Server(ServerCommand),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Server Command
// ============================================================================

/// Server management commands.
#[derive(Args, Debug)]
pub struct ServerCommand {
    /// Server subcommand.
    #[command(subcommand)]
    pub subcommand: ServerSubcommand,
}

/// Server subcommands.
#[derive(Subcommand, Debug)]
pub enum ServerSubcommand {
    /// Start the game server.
    Run(ServerRunArgs),

    /// Validate game files without starting the server.
    Validate(ServerValidateArgs),
}

/// Arguments for `server run`.
#[derive(Args, Debug)]
pub struct ServerRunArgs {
    /// Path to a YAML game file. Without one the stock round is used.
    #[arg(short, long, env = "DEFUSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind the HTTP server on `[host:]port`.
    #[arg(long, default_value = DEFAULT_BIND_ADDR, env = "DEFUSE_HTTP")]
    pub http: String,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "DEFUSE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Write JSONL round events to this file instead of stderr.
    #[arg(long, env = "DEFUSE_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Override the disarm code.
    #[arg(long, env = "DEFUSE_CODE")]
    pub code: Option<String>,

    /// Override the countdown (`90`, `"90m"`, `"1h 30m"`).
    #[arg(long, env = "DEFUSE_COUNTDOWN")]
    pub countdown: Option<DurationValue>,

    /// Override the failed attempt ceiling.
    #[arg(long, env = "DEFUSE_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,
}

impl ServerRunArgs {
    /// Collects the game overrides given on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            code: self.code.clone(),
            countdown: self.countdown.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

/// Arguments for `server validate`.
#[derive(Args, Debug)]
pub struct ServerValidateArgs {
    /// Game files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Enable strict validation (warnings become errors).
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Version
// ============================================================================

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Log format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormatChoice {
    /// Human-readable lines.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
