//! Pipeline domain model

use crate::core::{
    config::{PipelineConfig, VariableDefinition},
    state::PipelineState,
    step::{Step, StepDefaults},
    trigger::{any_matches, Trigger, TriggerEvent},
};
use anyhow::Result;
use std::collections::BTreeMap;

/// A pipeline definition, instantiated once per run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Events that start the pipeline
    pub triggers: Vec<Trigger>,

    /// Environment declarations resolved into the configuration store
    pub declarations: BTreeMap<String, VariableDefinition>,

    /// Local shims for reusable actions
    pub actions: BTreeMap<String, String>,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let defaults = StepDefaults {
            timeout_secs: config
                .default_timeout_secs
                .unwrap_or(StepDefaults::default().timeout_secs),
        };

        let steps = config
            .steps
            .iter()
            .map(|step_config| Step::from_config(step_config, &defaults))
            .collect();

        Ok(Pipeline {
            name: config.name.clone(),
            triggers: config.trigger_set(),
            declarations: config.declarations()?,
            actions: config.actions.clone(),
            steps,
            state: PipelineState::new(),
        })
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Check whether an event starts this pipeline
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        any_matches(&self.triggers, event)
    }

    /// Local command standing in for a reusable action.
    ///
    /// Looks up `owner/name@ref` first, then `owner/name`.
    pub fn action_shim(&self, uses: &str) -> Option<&str> {
        self.actions
            .get(uses)
            .or_else(|| {
                uses.split_once('@')
                    .and_then(|(name, _)| self.actions.get(name))
            })
            .map(String::as_str)
    }

    /// Check if every step is in a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Names of the steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}
