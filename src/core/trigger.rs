//! Trigger model - which source-control events start a pipeline

use glob_match::glob_match;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-control event kinds a pipeline can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Push,
    PullRequest,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Push => write!(f, "push"),
            EventType::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// An incoming event: the event kind and the branch it targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event: EventType,
    pub branch: String,
}

impl TriggerEvent {
    pub fn new(event: EventType, branch: impl Into<String>) -> Self {
        Self {
            event,
            branch: branch.into(),
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventType::Push, branch)
    }

    pub fn pull_request(branch: impl Into<String>) -> Self {
        Self::new(EventType::PullRequest, branch)
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to '{}'", self.event, self.branch)
    }
}

/// One (event type, branch patterns) pair of a pipeline's trigger set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub event: EventType,

    /// Glob patterns; empty means every branch
    pub branches: Vec<String>,
}

impl Trigger {
    pub fn matches(&self, incoming: &TriggerEvent) -> bool {
        self.event == incoming.event
            && (self.branches.is_empty()
                || self
                    .branches
                    .iter()
                    .any(|pattern| glob_match(pattern, &incoming.branch)))
    }
}

/// True if any trigger of the set accepts the event
pub fn any_matches(triggers: &[Trigger], incoming: &TriggerEvent) -> bool {
    triggers.iter().any(|t| t.matches(incoming))
}
