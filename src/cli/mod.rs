//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Process exit codes
pub mod exit_code {
    /// Run succeeded, or the event does not trigger the pipeline
    pub const SUCCESS: i32 = 0;
    /// A step failed the run, or the runtime could not be provisioned
    pub const FAILURE: i32 = 1;
    /// The pipeline file or its configuration could not be loaded
    pub const CONFIG: i32 = 2;
}

/// Linear, fail-fast CI pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "linear-ci")]
#[command(version)]
#[command(about = "Runs a linear CI pipeline with fail-fast semantics", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print each command's output as it completes
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// List pipelines with recorded runs
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
