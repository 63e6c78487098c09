use anyhow::{Context, Result};
use linear_ci::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use linear_ci::cli::output::*;
use linear_ci::cli::terminal_output::TerminalReporter;
use linear_ci::cli::{exit_code, Cli, Command};
use linear_ci::core::config::PipelineConfig;
use linear_ci::core::{script_summary, ConfigurationStore, ExecutionStatus, Secrets, StepAction};
use linear_ci::execution::{EngineError, EngineOptions, ExecutionEngine, RunResult, ShellRunner};
use linear_ci::persistence::{InMemoryPersistence, PersistenceBackend};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    let code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd, cli.verbose).await?,
    };

    if code != exit_code::SUCCESS {
        std::process::exit(code);
    }
    Ok(())
}

/// Open the run history backend
#[cfg(feature = "sqlite")]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    let store = linear_ci::persistence::SqliteRunStore::with_default_path()
        .await
        .context("Failed to open run history")?;
    Ok(Arc::new(store))
}

/// Without SQLite, history only lives for the current process
#[cfg(not(feature = "sqlite"))]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(InMemoryPersistence::new()))
}

fn config_failure(message: &str, err: &dyn std::fmt::Display) -> i32 {
    println!("{} {}", CROSS, style(message).bold());
    println!("  {}", style(err).red());
    exit_code::CONFIG
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<i32> {
    // Load pipeline config
    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => return Ok(config_failure("Failed to load pipeline config", &format!("{:#}", e))),
    };
    let mut pipeline = match config.to_pipeline() {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(config_failure("Invalid pipeline config", &format!("{:#}", e))),
    };

    println!(
        "{} Loaded pipeline: {}",
        INFO,
        style(&pipeline.name).bold()
    );

    // Resolve the configuration store; a missing value stops the run before it starts
    let mut secrets = Secrets::from_process_env();
    if let Some(path) = &cmd.env_file {
        match Secrets::from_env_file(path) {
            Ok(file_secrets) => secrets = secrets.layer(file_secrets),
            Err(e) => return Ok(config_failure("Failed to read env file", &e)),
        }
    }

    let store = match ConfigurationStore::load_with_overrides(
        &pipeline.declarations,
        &secrets,
        &cmd.variables,
    ) {
        Ok(store) => store,
        Err(e) => return Ok(config_failure("Configuration could not be loaded", &e)),
    };

    for (key, _) in &cmd.variables {
        println!("{} Variable override: {}", INFO, style(key).cyan());
    }

    // Set up persistence
    let history: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_history().await?
    };

    // Create execution engine
    let options = EngineOptions::default().with_workdir(&cmd.workdir);
    let options = EngineOptions {
        strict_actions: cmd.strict_actions,
        ..options
    };
    let engine = ExecutionEngine::with_options(ShellRunner::new(), options);

    // Set up event handler for console output
    let reporter = TerminalReporter::new(cli.stream, pipeline.steps.len());
    engine.add_event_handler(move |event| reporter.on_event(&event));

    // Execute pipeline
    println!();
    let event = cmd.trigger_event();
    let result = match engine.execute(&mut pipeline, &store, &event).await {
        Ok(result) => result,
        Err(EngineError::NotTriggered { .. }) => {
            println!(
                "{} {} is not triggered by {}; nothing to do",
                WARN,
                style(&pipeline.name).bold(),
                style(&event).cyan()
            );
            return Ok(exit_code::SUCCESS);
        }
        Err(e) => {
            error!("{}", e);
            println!("{} {} {}", CROSS, style(&pipeline.name).bold(), style(e).red());
            return Ok(exit_code::FAILURE);
        }
    };

    // Save to history
    if !cmd.no_history {
        match history.save_run(&result).await {
            Ok(()) => println!(
                "\n{} Run saved to history (ID: {})",
                INFO,
                style(short_id(&result.execution_id)).dim()
            ),
            Err(e) => warn!("Failed to save run to history: {:#}", e),
        }
    }

    // Print final status
    if result.succeeded() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("successfully").green()
        );
        Ok(exit_code::SUCCESS)
    } else {
        println!(
            "\n{} {} {} at {}",
            CROSS,
            style(&pipeline.name).bold(),
            style("failed").red(),
            style(result.failed_step.as_deref().unwrap_or("?")).bold()
        );
        Ok(exit_code::FAILURE)
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating pipeline...", INFO);

    let pipeline = match PipelineConfig::from_file(&cmd.file).and_then(|c| c.to_pipeline()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(exit_code::CONFIG);
        }
    };

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&pipeline.name).bold());
    println!("  Triggers:");
    for trigger in &pipeline.triggers {
        let branches = if trigger.branches.is_empty() {
            "*".to_string()
        } else {
            trigger.branches.join(", ")
        };
        println!("    {} on {}", style(trigger.event).cyan(), branches);
    }
    println!("  Variables: {}", style(pipeline.declarations.len()).cyan());
    println!("  Steps: {}", style(pipeline.steps.len()).cyan());
    for (index, step) in pipeline.steps.iter().enumerate() {
        let kind = match &step.action {
            StepAction::Uses { action, .. } => match pipeline.action_shim(action) {
                Some(_) => format!("uses {} (shimmed)", action),
                None => format!("uses {}", action),
            },
            StepAction::Run { script, .. } => format!("run: {}", script_summary(script)),
        };
        let mut flags = Vec::new();
        if step.always {
            flags.push("always");
        }
        if step.continue_on_failure {
            flags.push("continue-on-failure");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "    {}. {} - {}{}",
            index + 1,
            style(&step.name).bold(),
            style(kind).dim(),
            flags
        );
    }

    if cmd.json {
        let steps: Vec<_> = pipeline
            .steps
            .iter()
            .map(|step| {
                serde_json::json!({
                    "name": step.name,
                    "always": step.always,
                    "continue_on_failure": step.continue_on_failure,
                    "timeout_secs": step.timeout_secs,
                    "requires": step.referenced_variables(),
                })
            })
            .collect();
        let data = serde_json::json!({
            "name": pipeline.name,
            "variables": pipeline.declarations.keys().collect::<Vec<_>>(),
            "steps": steps,
        });
        println!("\n{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(exit_code::SUCCESS)
}

async fn list_pipelines(cmd: &ListCommand) -> Result<i32> {
    let store = open_history().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(exit_code::SUCCESS);
    }

    let mut json_data = Vec::new();
    if !cmd.json {
        println!("{} Pipelines in history:", INFO);
    }

    for pipeline_name in &pipelines {
        let runs = store.list_runs(Some(pipeline_name), None).await?;
        let succeeded = runs.iter().filter(|r| r.status == ExecutionStatus::Succeeded).count();
        let failed = runs.iter().filter(|r| r.status == ExecutionStatus::Failed).count();

        if cmd.json {
            json_data.push(serde_json::json!({
                "name": pipeline_name,
                "run_count": runs.len(),
                "succeeded": succeeded,
                "failed": failed,
            }));
        } else if cmd.with_counts {
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(runs.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    if cmd.json {
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(exit_code::SUCCESS)
}

async fn show_history(cmd: &HistoryCommand, verbose: bool) -> Result<i32> {
    let store = open_history().await?;

    // If a specific run is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(run) if cmd.json => println!("{}", serde_json::to_string_pretty(&run)?),
            Some(run) => print_run_details(&run, verbose),
            None => {
                println!("{} Run not found", WARN);
                return Ok(exit_code::FAILURE);
            }
        }
        return Ok(exit_code::SUCCESS);
    }

    let runs = store.list_runs(cmd.pipeline.as_deref(), Some(cmd.limit)).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(exit_code::SUCCESS);
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(exit_code::SUCCESS);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for run in &runs {
        println!("  {}", format_run_summary(run));
        if verbose {
            for record in &run.outcomes {
                println!("      {}", format_step_record(record));
            }
        }
    }

    Ok(exit_code::SUCCESS)
}

fn print_run_details(run: &RunResult, verbose: bool) {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(run.execution_id).cyan());
    println!("  Pipeline: {}", style(&run.pipeline_name).bold());
    println!("  Status: {}", format_status(run.status));
    if let Some(step) = &run.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    println!("  Started: {}", style(run.started_at.to_rfc3339()).dim());
    println!("  Completed: {}", style(run.completed_at.to_rfc3339()).dim());
    println!(
        "  Duration: {}",
        style(format_duration_ms(run.duration_ms().max(0) as u64)).dim()
    );

    println!("\n  {}", style("Steps:").bold());
    for record in &run.outcomes {
        println!("    {}", format_step_record(record));
        if let Some(error) = &record.error {
            println!("      {}", style(error).dim());
        }
        if verbose && !record.output.trim().is_empty() {
            for line in format_output(&record.output, 50).lines() {
                println!("      {}", line);
            }
        }
    }
}
