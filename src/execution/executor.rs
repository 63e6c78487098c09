//! Step executor - runs individual steps through the command runner

use crate::{
    core::{script_summary, ConfigError, RunEnvironment, Shell, Step, StepAction},
    execution::runner::{CommandOutput, CommandRunner, Invocation},
};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Why a step failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// `command` is the masked first line of the script
    #[error("command `{command}` exited with code {code}")]
    NonZeroExit { code: i32, command: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("missing configuration: {0}")]
    MissingConfiguration(#[from] ConfigError),

    #[error("action '{0}' has no local shim")]
    UnresolvedAction(String),
}

/// Result of executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step's script exited 0
    Success { output: String },
    /// The step failed; `output` holds whatever was captured before the failure
    Failure { error: StepError, output: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            StepOutcome::Success { output } | StepOutcome::Failure { output, .. } => output,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            StepOutcome::Success { .. } => None,
            StepOutcome::Failure { error, .. } => Some(error),
        }
    }

    /// Exit code of the failing script, if it ran and failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StepOutcome::Failure {
                error: StepError::NonZeroExit { code, .. },
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

/// Callback invoked once the step's script finishes, with its masked summary and output
pub type CommandObserver<'a> = &'a (dyn Fn(&str, &CommandOutput) + Send + Sync);

/// What a step will actually run once references are resolved
enum Plan {
    Script {
        shell: Shell,
        script: String,
        extra_env: Vec<(String, String)>,
    },
    /// Reusable action with no local shim, treated as an external black box
    External { action: String },
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
    strict_actions: bool,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            strict_actions: false,
        }
    }

    /// Fail steps whose reusable action has no local shim
    pub fn with_strict_actions(mut self, strict: bool) -> Self {
        self.strict_actions = strict;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a step and return the outcome
    pub async fn execute(
        &self,
        step: &Step,
        env: &RunEnvironment,
        shim: Option<&str>,
    ) -> StepOutcome {
        self.execute_observed(step, env, shim, &|_, _| {}).await
    }

    /// Execute a step, reporting the script to `observer` when it completes
    pub async fn execute_observed(
        &self,
        step: &Step,
        env: &RunEnvironment,
        shim: Option<&str>,
        observer: CommandObserver<'_>,
    ) -> StepOutcome {
        info!("Executing step: {}", step.name);

        let plan = match self.plan(step, env, shim) {
            Ok(plan) => plan,
            Err(error) => {
                error!("Step {} cannot run: {}", step.name, error);
                return StepOutcome::Failure {
                    error,
                    output: String::new(),
                };
            }
        };

        let (shell, script, extra_env) = match plan {
            Plan::Script {
                shell,
                script,
                extra_env,
            } => (shell, script, extra_env),
            Plan::External { action } => {
                warn!(
                    "Step {} uses '{}' with no local shim; treating it as an external action",
                    step.name, action
                );
                return StepOutcome::Success {
                    output: format!("action '{}' runs outside this executor; not executed", action),
                };
            }
        };

        let step_env = if extra_env.is_empty() {
            None
        } else {
            Some(env.with_extra(extra_env))
        };
        let env = step_env.as_ref().unwrap_or(env);

        let timeout_duration = Duration::from_secs(step.timeout_secs);
        let result = timeout(
            timeout_duration,
            self.run_script(&shell, &script, env, observer),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                info!("Step {} completed successfully", step.name);
                StepOutcome::Success { output }
            }
            Ok(Err((error, output))) => {
                warn!("Step {} failed: {}", step.name, error);
                StepOutcome::Failure { error, output }
            }
            Err(_) => {
                error!("Timeout for step {} after {}s", step.name, step.timeout_secs);
                StepOutcome::Failure {
                    error: StepError::Timeout(step.timeout_secs),
                    output: String::new(),
                }
            }
        }
    }

    /// Resolve references and decide what to run
    fn plan(&self, step: &Step, env: &RunEnvironment, shim: Option<&str>) -> Result<Plan, StepError> {
        let store = env.store();
        step.check_environment(store)?;

        match &step.action {
            StepAction::Run { shell, .. } => Ok(Plan::Script {
                shell: shell.clone(),
                script: step.render_script(store)?.unwrap_or_default(),
                extra_env: Vec::new(),
            }),
            StepAction::Uses { action, .. } => {
                let Some(shim) = shim else {
                    if self.strict_actions {
                        return Err(StepError::UnresolvedAction(action.clone()));
                    }
                    return Ok(Plan::External {
                        action: action.clone(),
                    });
                };

                Ok(Plan::Script {
                    shell: Shell::Sh,
                    script: store.substitute(shim)?,
                    extra_env: input_variables(&step.render_inputs(store)?),
                })
            }
        }
    }

    /// Run the whole script in one shell process; the shell stops at the first failure
    async fn run_script(
        &self,
        shell: &Shell,
        script: &str,
        env: &RunEnvironment,
        observer: CommandObserver<'_>,
    ) -> Result<String, (StepError, String)> {
        let store = env.store();
        let summary = store.mask(&script_summary(script));
        debug!("Running script: {}", store.mask(script));

        let invocation = Invocation {
            shell,
            command: script,
            env: env.variables(),
            workdir: env.workdir(),
        };
        let result = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| (StepError::Spawn(e.to_string()), String::new()))?;

        let masked = CommandOutput {
            exit_code: result.exit_code,
            stdout: store.mask(&result.stdout),
            stderr: store.mask(&result.stderr),
        };
        let output = masked.combined();
        observer(&summary, &masked);

        if !masked.success() {
            debug!(
                "Script exited with code {}: {}",
                masked.exit_code,
                masked.stderr.trim()
            );
            return Err((
                StepError::NonZeroExit {
                    code: masked.exit_code,
                    command: summary,
                },
                output,
            ));
        }

        Ok(output)
    }
}

/// `with` input name as exported to the action: `python-version` -> `INPUT_PYTHON_VERSION`
fn input_variable(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("INPUT_{}", normalized)
}

/// Inputs of a step as exported variables
pub fn input_variables(inputs: &BTreeMap<String, String>) -> Vec<(String, String)> {
    inputs
        .iter()
        .map(|(name, value)| (input_variable(name), value.clone()))
        .collect()
}
