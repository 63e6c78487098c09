//! Terminal reporter for pipeline runs
//!
//! Prints engine events as they arrive, keeps a step progress bar at the
//! bottom of the terminal and, when streaming is enabled, shows the output
//! of every command between separators.

use crate::cli::output::{create_progress_bar, format_execution_event, format_output, tail_output};
use crate::execution::ExecutionEvent;
use console::style;
use indicatif::ProgressBar;

/// Lines of command output shown per command while streaming
const STREAM_LINES: usize = 40;

/// Lines of output shown for a failed step
const FAILURE_TAIL_LINES: usize = 20;

/// Event sink that renders a run to the terminal
pub struct TerminalReporter {
    stream: bool,
    progress: ProgressBar,
}

impl TerminalReporter {
    pub fn new(stream: bool, total_steps: usize) -> Self {
        Self {
            stream,
            progress: create_progress_bar(total_steps),
        }
    }

    /// Reporter without a progress bar (for non-interactive use and tests)
    pub fn plain(stream: bool) -> Self {
        Self {
            stream,
            progress: ProgressBar::hidden(),
        }
    }

    /// Render one engine event
    pub fn on_event(&self, event: &ExecutionEvent) {
        for line in self.render(event) {
            if self.progress.is_hidden() {
                println!("{}", line);
            } else {
                self.progress.println(line);
            }
        }

        match event {
            ExecutionEvent::StepStarted { name, .. } => {
                self.progress.set_message(name.clone());
            }
            ExecutionEvent::StepFinished { .. } | ExecutionEvent::StepSkipped { .. } => {
                self.progress.inc(1);
            }
            ExecutionEvent::PipelineCompleted { .. } => {
                self.progress.finish_and_clear();
            }
            _ => {}
        }
    }

    /// Lines printed for an event
    pub fn render(&self, event: &ExecutionEvent) -> Vec<String> {
        match event {
            ExecutionEvent::CommandFinished { output, .. } => {
                if !self.stream {
                    return Vec::new();
                }
                let mut lines = vec![format_execution_event(event)];
                if !output.trim().is_empty() {
                    lines.push(format_output(output.trim_end(), STREAM_LINES));
                }
                lines.push(separator());
                lines
            }
            ExecutionEvent::StepFinished { record } => {
                let mut lines = vec![format_execution_event(event)];
                // Streaming has already shown the output
                if !record.succeeded() && !self.stream && !record.output.trim().is_empty() {
                    lines.push(
                        style(tail_output(&record.output, FAILURE_TAIL_LINES))
                            .dim()
                            .to_string(),
                    );
                }
                lines
            }
            ExecutionEvent::RuntimeProvisioned { .. } | ExecutionEvent::RuntimeTornDown { .. } => {
                Vec::new()
            }
            _ => vec![format_execution_event(event)],
        }
    }
}

/// A horizontal rule spanning the terminal width
pub fn separator() -> String {
    // Get terminal width, default to 80 if unavailable
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    style("─".repeat(width)).dim().to_string()
}
