//! CLI command definitions

use crate::core::{EventType, TriggerEvent};
use clap::Args;
use std::path::PathBuf;

/// Run a pipeline for a source-control event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Branch the event targets
    #[arg(short, long)]
    pub branch: String,

    /// Event type
    #[arg(short, long, value_enum, default_value_t = EventArg::Push)]
    pub event: EventArg,

    /// Variable overrides (key=value); only declared variables may be overridden
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variables: Vec<(String, String)>,

    /// Dotenv file with secret values (layered over the process environment)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Directory the steps run in
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Fail steps whose reusable action has no local shim
    #[arg(long)]
    pub strict_actions: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn trigger_event(&self) -> TriggerEvent {
        TriggerEvent::new(self.event.into(), self.branch.clone())
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Event type argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventArg {
    Push,
    PullRequest,
}

impl From<EventArg> for EventType {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Push => EventType::Push,
            EventArg::PullRequest => EventType::PullRequest,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
