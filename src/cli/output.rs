//! CLI output formatting

use crate::{
    core::ExecutionStatus,
    execution::{ExecutionEvent, RunResult, StepRecord, StepStatus},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Short form of a run ID
pub fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a step status for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Success => style("SUCCESS").green().to_string(),
        StepStatus::Failure => style("FAILURE").red().to_string(),
    }
}

/// Format a duration given in milliseconds
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let secs = ms / 1000;
    if secs < 60 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format a run for a history listing
pub fn format_run_summary(run: &RunResult) -> String {
    let status_icon = match run.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let failed = run
        .failed_step
        .as_ref()
        .map(|step| format!(" at {}", style(step).red()))
        .unwrap_or_default();

    format!(
        "{} {} - {} - {}{} ({} steps, {}) - {}",
        status_icon,
        style(short_id(&run.execution_id)).dim(),
        style(&run.pipeline_name).bold(),
        format_status(run.status),
        failed,
        run.outcomes.len(),
        format_duration_ms(run.duration_ms().max(0) as u64),
        style(run.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format one step outcome line
pub fn format_step_record(record: &StepRecord) -> String {
    let icon = if record.succeeded() { CHECK } else { CROSS };
    let exit = record
        .exit_code
        .map(|code| format!(" (exit {})", code))
        .unwrap_or_default();
    format!(
        "{} {} {}{} [{}]",
        icon,
        style(&record.name).bold(),
        format_step_status(record.status),
        exit,
        style(format_duration_ms(record.duration_ms)).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            event,
            total_steps,
        } => format!(
            "{} Starting pipeline {} on {} ({} steps, {})",
            ROCKET,
            style(pipeline_name).bold(),
            style(event).cyan(),
            total_steps,
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::RuntimeProvisioned { workdir, .. } => format!(
            "{} Runtime provisioned in {}",
            INFO,
            style(workdir.display()).dim()
        ),
        ExecutionEvent::StepStarted { name, index, total } => format!(
            "{} [{}/{}] {}",
            SPINNER,
            index + 1,
            total,
            style(name).cyan()
        ),
        ExecutionEvent::CommandFinished {
            command, exit_code, ..
        } => {
            let icon = if *exit_code == 0 { CHECK } else { CROSS };
            format!("{} $ {}", icon, style(command).dim())
        }
        ExecutionEvent::StepFinished { record } => {
            let mut line = format_step_record(record);
            if let Some(error) = &record.error {
                line.push_str(&format!(": {}", style(error).dim()));
            }
            line
        }
        ExecutionEvent::StepSkipped { name, reason } => {
            format!("{} {} ({})", SKIP, style(name).dim(), reason)
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
            failed_step,
        } => {
            let status_str = match (status, failed_step) {
                (ExecutionStatus::Succeeded, _) => {
                    format!("{} completed", style("successfully").green())
                }
                (_, Some(step)) => format!("{} at {}", style("failed").red(), style(step).bold()),
                _ => style("failed").red().to_string(),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
        ExecutionEvent::RuntimeTornDown { .. } => format!("{} Runtime torn down", INFO),
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Last `max_lines` lines of output, for failure reports
pub fn tail_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
