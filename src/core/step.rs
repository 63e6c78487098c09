//! Step domain model

use crate::core::{
    config::StepConfig,
    state::StepState,
    store::{expressions, ConfigError, ConfigurationStore},
};
use std::collections::BTreeMap;

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name, unique within the pipeline
    pub name: String,

    /// What the step does
    pub action: StepAction,

    /// A failure of this step does not halt or fail the run
    pub continue_on_failure: bool,

    /// Run even after an earlier step halted the run
    pub always: bool,

    /// Timeout in seconds for the whole step
    pub timeout_secs: u64,

    /// Environment variables the step declares it needs
    pub requires: Vec<String>,

    /// Runtime state (not serialized)
    pub state: StepState,
}

/// The work a step performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// A reusable named action, opaque to the executor
    Uses {
        action: String,
        inputs: BTreeMap<String, String>,
    },
    /// An inline script, run as a whole by one shell process
    Run { shell: Shell, script: String },
}

/// Shell used for inline commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shell {
    Sh,
    Bash,
    /// Program plus leading arguments; the command is appended after `-c`
    Custom(String),
}

impl Shell {
    pub fn parse(shell: Option<&str>) -> Self {
        match shell.map(str::trim) {
            None | Some("") | Some("sh") => Shell::Sh,
            Some("bash") => Shell::Bash,
            Some(other) => Shell::Custom(other.to_string()),
        }
    }

    /// Program and arguments that precede the script text.
    ///
    /// Both built-in shells exit at the first failing command.
    pub fn argv(&self) -> (String, Vec<String>) {
        match self {
            Shell::Sh => ("sh".to_string(), vec!["-e".to_string(), "-c".to_string()]),
            Shell::Bash => (
                "bash".to_string(),
                ["--noprofile", "--norc", "-eo", "pipefail", "-c"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            Shell::Custom(line) => {
                let mut parts = line.split_whitespace().map(str::to_string);
                let program = parts.next().unwrap_or_else(|| "sh".to_string());
                let mut args: Vec<String> = parts.collect();
                args.push("-c".to_string());
                (program, args)
            }
        }
    }
}

/// Fail-fast policy flags of a step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepPolicy {
    pub continue_on_failure: bool,
    pub always: bool,
}

/// True when a script has nothing but blank lines and `#` comments
pub fn is_blank_script(script: &str) -> bool {
    script
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

/// First command line of a script, for messages; `...` marks a longer script
pub fn script_summary(script: &str) -> String {
    let mut lines = script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    match (lines.next(), lines.next()) {
        (Some(first), None) => first.to_string(),
        (Some(first), Some(_)) => format!("{} ...", first),
        (None, _) => String::new(),
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        let action = match (&config.uses, &config.run) {
            (Some(action), _) => StepAction::Uses {
                action: action.clone(),
                inputs: config.inputs(),
            },
            (None, run) => StepAction::Run {
                shell: Shell::parse(config.shell.as_deref()),
                script: run.as_deref().unwrap_or_default().trim().to_string(),
            },
        };

        Step {
            name: config.name.clone(),
            action,
            continue_on_failure: config.continue_on_failure,
            always: config.always,
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            requires: config.requires.clone(),
            state: StepState::Pending,
        }
    }

    pub fn policy(&self) -> StepPolicy {
        StepPolicy {
            continue_on_failure: self.continue_on_failure,
            always: self.always,
        }
    }

    /// Every variable the step needs: `requires` plus `${{ env.NAME }}` references
    pub fn referenced_variables(&self) -> Vec<String> {
        let texts: Vec<&String> = match &self.action {
            StepAction::Uses { inputs, .. } => inputs.values().collect(),
            StepAction::Run { script, .. } => vec![script],
        };

        let mut vars: Vec<String> = self.requires.clone();
        for text in texts {
            vars.extend(
                expressions(text)
                    .into_iter()
                    .filter(|(scope, _)| scope == "env")
                    .map(|(_, name)| name),
            );
        }
        vars.sort();
        vars.dedup();
        vars
    }

    /// Check that every referenced variable is present in the store
    pub fn check_environment(&self, store: &ConfigurationStore) -> Result<(), ConfigError> {
        for var in self.referenced_variables() {
            store.get(&var)?;
        }
        Ok(())
    }

    /// Inline script with `${{ env.NAME }}` substituted
    pub fn render_script(&self, store: &ConfigurationStore) -> Result<Option<String>, ConfigError> {
        match &self.action {
            StepAction::Run { script, .. } => store.substitute(script).map(Some),
            StepAction::Uses { .. } => Ok(None),
        }
    }

    /// Action inputs with `${{ env.NAME }}` substituted
    pub fn render_inputs(
        &self,
        store: &ConfigurationStore,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        match &self.action {
            StepAction::Uses { inputs, .. } => inputs
                .iter()
                .map(|(k, v)| Ok((k.clone(), store.substitute(v)?)))
                .collect(),
            StepAction::Run { .. } => Ok(BTreeMap::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 300, // 5 minutes
        }
    }
}
