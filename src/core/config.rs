//! Pipeline configuration from YAML

use crate::core::{
    store::{expressions, secret_reference, ConfigError},
    step::is_blank_script,
    trigger::{EventType, Trigger},
    Pipeline,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// How a declared environment variable gets its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableDefinition {
    /// Value written in the pipeline file
    Literal(String),
    /// `${{ secrets.NAME }}` - resolved from the runner's secrets
    Secret(String),
    /// `null` - supplied by the runner under the variable's own name
    External,
}

impl VariableDefinition {
    /// Parse a YAML value; sequences and mappings are not valid declarations
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(
                secret_reference(s)
                    .map(VariableDefinition::Secret)
                    .unwrap_or_else(|| VariableDefinition::Literal(s.clone())),
            ),
            Value::Number(n) => Some(VariableDefinition::Literal(n.to_string())),
            Value::Bool(b) => Some(VariableDefinition::Literal(b.to_string())),
            Value::Null => Some(VariableDefinition::External),
            _ => None,
        }
    }

    /// Values bound to this declaration come from a secret source and are masked
    pub fn is_sensitive(&self) -> bool {
        !matches!(self, VariableDefinition::Literal(_))
    }
}

impl fmt::Display for VariableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableDefinition::Literal(value) => write!(f, "{}", value),
            VariableDefinition::Secret(name) => write!(f, "${{{{ secrets.{} }}}}", name),
            VariableDefinition::External => write!(f, "<external>"),
        }
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Trigger events and their branch filters
    #[serde(rename = "on", default)]
    pub triggers: BTreeMap<EventType, Option<TriggerFilter>>,

    /// Environment declarations shared by every step
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Local shell commands standing in for reusable actions
    #[serde(default)]
    pub actions: BTreeMap<String, String>,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepConfig>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Branch filter of one trigger event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerFilter {
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within the pipeline
    pub name: String,

    /// Reusable action to invoke (`owner/name@ref`)
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs for the reusable action
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Inline command sequence
    #[serde(default)]
    pub run: Option<String>,

    /// Shell for inline commands (`sh` or `bash`)
    #[serde(default)]
    pub shell: Option<String>,

    /// Keep going when this step fails
    #[serde(default, alias = "continue-on-error")]
    pub continue_on_failure: bool,

    /// Run even after an earlier step halted the pipeline
    #[serde(default)]
    pub always: bool,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Environment variables this step needs
    #[serde(default)]
    pub requires: Vec<String>,
}

impl StepConfig {
    /// `with` inputs rendered as strings
    pub fn inputs(&self) -> BTreeMap<String, String> {
        self.with
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
            .collect()
    }

    /// Every piece of text that may contain `${{ ... }}` expressions
    fn expression_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.inputs().into_values().collect();
        if let Some(run) = &self.run {
            sources.push(run.clone());
        }
        sources
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.triggers.is_empty() {
            anyhow::bail!("Pipeline '{}' declares no trigger events under 'on'", self.name);
        }
        for (event, filter) in &self.triggers {
            if let Some(filter) = filter {
                if filter.branches.iter().any(|b| b.trim().is_empty()) {
                    anyhow::bail!("Trigger '{}' has an empty branch pattern", event);
                }
            }
        }

        if self.steps.is_empty() {
            anyhow::bail!("Pipeline '{}' has no steps", self.name);
        }

        if self.default_timeout_secs == Some(0) {
            anyhow::bail!("default_timeout_secs must be greater than zero");
        }

        let declared = self.declarations()?;

        for (name, value) in &self.env {
            if let Value::String(s) = value {
                if secret_reference(s).is_none() && !expressions(s).is_empty() {
                    anyhow::bail!(
                        "Variable '{}' must be a literal or a single ${{{{ secrets.NAME }}}} reference",
                        name
                    );
                }
            }
        }

        // Check that all step names are unique
        let mut seen_names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                anyhow::bail!("Step names must not be empty");
            }
            if !seen_names.insert(&step.name) {
                anyhow::bail!("Duplicate step name: {}", step.name);
            }

            match (&step.uses, &step.run) {
                (Some(_), Some(_)) => {
                    anyhow::bail!("Step '{}' has both 'uses' and 'run'", step.name)
                }
                (None, None) => {
                    anyhow::bail!("Step '{}' needs either 'uses' or 'run'", step.name)
                }
                (None, Some(run)) if is_blank_script(run) => {
                    anyhow::bail!("Step '{}' has no commands to run", step.name)
                }
                _ => {}
            }

            if step.timeout_secs == Some(0) {
                anyhow::bail!("Step '{}' timeout_secs must be greater than zero", step.name);
            }

            for var in &step.requires {
                if !declared.contains_key(var) {
                    return Err(anyhow::Error::new(ConfigError::UndeclaredVariable(var.clone()))
                        .context(format!("Step '{}' requires an undeclared variable", step.name)));
                }
            }

            for source in step.expression_sources() {
                for (scope, name) in expressions(&source) {
                    match scope.as_str() {
                        "env" if declared.contains_key(&name) => {}
                        "env" => {
                            return Err(anyhow::Error::new(ConfigError::UndeclaredVariable(name))
                                .context(format!(
                                    "Step '{}' references an undeclared variable",
                                    step.name
                                )));
                        }
                        "secrets" => anyhow::bail!(
                            "Step '{}' references secret '{}' directly; bind it in 'env' first",
                            step.name,
                            name
                        ),
                        other => anyhow::bail!(
                            "Step '{}' uses unsupported expression scope '{}'",
                            step.name,
                            other
                        ),
                    }
                }
            }
        }

        Ok(())
    }

    /// Environment declarations as parsed `VariableDefinition`s
    pub fn declarations(&self) -> Result<BTreeMap<String, VariableDefinition>> {
        self.env
            .iter()
            .map(|(name, value)| {
                VariableDefinition::from_value(value)
                    .map(|def| (name.clone(), def))
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Variable '{}' must be a string, number, boolean or null",
                            name
                        )
                    })
            })
            .collect()
    }

    /// Trigger set as domain triggers
    pub fn trigger_set(&self) -> Vec<Trigger> {
        self.triggers
            .iter()
            .map(|(event, filter)| Trigger {
                event: *event,
                branches: filter
                    .as_ref()
                    .map(|f| f.branches.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Number of declared environment variables
    pub fn env_len(&self) -> usize {
        self.env.len()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}
