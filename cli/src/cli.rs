//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, OutputFlags};
use crate::commands;

/// Install, prepare and supervise catalog runners locally
#[derive(Parser)]
#[command(
    name = "matrix",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch an install plan, materialize it and prepare its environment
    Build(commands::build::BuildArgs),

    /// Start an installed runner in the background
    Start(commands::start::StartArgs),

    /// Stop a running runner
    Stop(commands::stop::StopArgs),

    /// List running runners
    Status,

    /// Show a runner's log
    Logs(commands::logs::LogsArgs),

    /// Check a runner's process and health endpoint
    Doctor(commands::doctor::DoctorArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Output flags shared by every command.
    #[must_use]
    pub fn output_flags(&self) -> OutputFlags {
        OutputFlags {
            no_color: self.no_color,
            quiet: self.quiet,
            json: self.json,
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or the command fails.
    pub async fn run(self) -> Result<()> {
        let app = AppContext::new(self.output_flags())?;
        match self.command {
            Command::Build(args) => commands::build::run(&app, &args).await,
            Command::Start(args) => commands::start::run(&app, &args).await,
            Command::Stop(args) => commands::stop::run(&app, &args).await,
            Command::Status => commands::status::run(&app).await,
            Command::Logs(args) => commands::logs::run(&app, &args).await,
            Command::Doctor(args) => commands::doctor::run(&app, &args).await,
            Command::Version => commands::version::run(&app),
        }
    }
}
