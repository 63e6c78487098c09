//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{
        ConfigurationStore, ExecutionStatus, Pipeline, RunEnvironment, StepAction, StepState,
        TriggerEvent,
    },
    execution::{
        executor::StepExecutor,
        fold::{RunFold, RunResult, StepRecord},
        runner::{CommandOutput, CommandRunner},
        runtime::RuntimeInstance,
    },
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        event: TriggerEvent,
        total_steps: usize,
    },
    RuntimeProvisioned {
        execution_id: Uuid,
        workdir: PathBuf,
    },
    StepStarted {
        name: String,
        index: usize,
        total: usize,
    },
    CommandFinished {
        step: String,
        command: String,
        exit_code: i32,
        output: String,
    },
    StepFinished {
        record: StepRecord,
    },
    StepSkipped {
        name: String,
        reason: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
        failed_step: Option<String>,
    },
    RuntimeTornDown {
        execution_id: Uuid,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Errors that keep a pipeline from running at all
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pipeline '{pipeline}' is not triggered by {event}")]
    NotTriggered { pipeline: String, event: TriggerEvent },

    #[error("pipeline '{0}' has already been started")]
    AlreadyStarted(String),

    #[error("failed to provision runtime instance: {0}")]
    Provision(#[from] std::io::Error),
}

/// Engine settings shared by every run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Directory the steps run in
    pub workdir: PathBuf,

    /// Fail steps whose reusable action has no local shim
    pub strict_actions: bool,

    /// Lowest-precedence variables every step sees (PATH, HOME, ...)
    pub base_env: Vec<(String, String)>,
}

/// Process variables passed through to steps
const INHERITED_VARS: &[&str] = &["PATH", "HOME", "USER", "LANG", "LC_ALL", "SHELL", "TMPDIR", "TERM"];

impl EngineOptions {
    pub fn inherited_env() -> Vec<(String, String)> {
        INHERITED_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect()
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            strict_actions: false,
            base_env: Self::inherited_env(),
        }
    }
}

/// Main pipeline execution engine.
///
/// Holds no per-run state: one engine can drive many runs concurrently, each
/// with its own pipeline, store and runtime instance.
pub struct ExecutionEngine<R> {
    executor: StepExecutor<R>,
    options: EngineOptions,
    event_handlers: RwLock<Vec<EventHandler>>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(runner: R) -> Self {
        Self::with_options(runner, EngineOptions::default())
    }

    pub fn with_options(runner: R, options: EngineOptions) -> Self {
        let executor = StepExecutor::new(runner).with_strict_actions(options.strict_actions);
        Self {
            executor,
            options,
            event_handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        let mut handlers = match self.event_handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        let handlers = match self.event_handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline for one trigger event
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        store: &ConfigurationStore,
        event: &TriggerEvent,
    ) -> Result<RunResult, EngineError> {
        if pipeline.state.status != ExecutionStatus::Pending {
            return Err(EngineError::AlreadyStarted(pipeline.name.clone()));
        }

        if !pipeline.is_triggered_by(event) {
            info!("Pipeline {} not triggered by {}", pipeline.name, event);
            return Err(EngineError::NotTriggered {
                pipeline: pipeline.name.clone(),
                event: event.clone(),
            });
        }

        let execution_id = pipeline.state.execution_id;
        let runtime = RuntimeInstance::provision(execution_id, &self.options.workdir).map_err(|e| {
            error!("Failed to provision runtime for {}: {}", pipeline.name, e);
            EngineError::Provision(e)
        })?;

        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);
        pipeline.state.start(pipeline.steps.len());
        let started_at = pipeline.state.started_at.unwrap_or_else(Utc::now);

        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            event: event.clone(),
            total_steps: pipeline.steps.len(),
        });
        self.emit_event(ExecutionEvent::RuntimeProvisioned {
            execution_id,
            workdir: runtime.workdir().to_path_buf(),
        });

        let env = RunEnvironment::new(
            self.options.base_env.clone(),
            store.clone(),
            runtime.variables(&pipeline.name, event),
            runtime.workdir(),
        );

        let fold = self.run_steps(pipeline, &env).await;

        let status = fold.status();
        match status {
            ExecutionStatus::Succeeded => pipeline.state.succeed(),
            _ => pipeline.state.fail(),
        }
        let completed_at = pipeline.state.completed_at.unwrap_or_else(Utc::now);

        let result = fold.finish(execution_id, pipeline.name.clone(), started_at, completed_at);
        info!(
            "Pipeline execution finished: {} - {:?}",
            pipeline.name, status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
            failed_step: result.failed_step.clone(),
        });

        if let Err(e) = runtime.teardown() {
            warn!("Runtime teardown for {} failed: {}", execution_id, e);
        }
        self.emit_event(ExecutionEvent::RuntimeTornDown { execution_id });

        Ok(result)
    }

    /// Run every step in order, folding the records as they come
    async fn run_steps(&self, pipeline: &mut Pipeline, env: &RunEnvironment) -> RunFold {
        let mut fold = RunFold::new();
        let total = pipeline.steps.len();

        for index in 0..total {
            let policy = pipeline.steps[index].policy();
            let name = pipeline.steps[index].name.clone();

            if !fold.should_run(policy) {
                let reason = format!(
                    "halted after '{}' failed",
                    fold.failed_step().unwrap_or_default()
                );
                info!("Skipping step {}: {}", name, reason);
                pipeline.steps[index].state = StepState::Skipped {
                    reason: reason.clone(),
                };
                self.emit_event(ExecutionEvent::StepSkipped { name, reason });
                continue;
            }

            let started_at = Utc::now();
            pipeline.steps[index].state = StepState::Running { started_at };
            self.emit_event(ExecutionEvent::StepStarted {
                name: name.clone(),
                index,
                total,
            });

            let observer = |command: &str, output: &CommandOutput| {
                self.emit_event(ExecutionEvent::CommandFinished {
                    step: name.clone(),
                    command: command.to_string(),
                    exit_code: output.exit_code,
                    output: output.combined(),
                });
            };

            let clock = Instant::now();
            let step = &pipeline.steps[index];
            let shim = match &step.action {
                StepAction::Uses { action, .. } => pipeline.action_shim(action),
                StepAction::Run { .. } => None,
            };
            let outcome = self.executor.execute_observed(step, env, shim, &observer).await;
            let record = StepRecord::from_outcome(name.as_str(), &outcome, clock.elapsed());

            let finished_at = Utc::now();
            pipeline.steps[index].state = match outcome.error() {
                None => StepState::Succeeded {
                    output: record.output.clone(),
                    started_at,
                    completed_at: finished_at,
                },
                Some(error) => {
                    if policy.continue_on_failure {
                        warn!("Step {} failed but continues: {}", name, error);
                    } else {
                        warn!("Step {} failed: {}", name, error);
                    }
                    StepState::Failed {
                        error: error.to_string(),
                        exit_code: record.exit_code,
                        output: record.output.clone(),
                        started_at,
                        failed_at: finished_at,
                    }
                }
            };
            pipeline.state.finished_steps += 1;

            self.emit_event(ExecutionEvent::StepFinished {
                record: record.clone(),
            });

            let was_halted = fold.is_halted();
            fold.record(record, policy);
            if !was_halted && fold.is_halted() {
                info!("Step {} failed, halting pipeline {}", name, pipeline.name);
            }
        }

        fold
    }
}
