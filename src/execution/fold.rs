//! Run fold - reduces step records to the result of a run
//!
//! The fold is pure: it decides which later steps may still run and which
//! step failed the run, but never executes anything itself.

use crate::{
    core::{ExecutionStatus, StepPolicy},
    execution::executor::StepOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Binary status of one executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Success,
    Failure,
}

/// What one executed step produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    /// Exit code of the failing command, if any
    pub exit_code: Option<i32>,
    /// Captured output with secrets masked
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn from_outcome(name: impl Into<String>, outcome: &StepOutcome, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: if outcome.is_success() {
                StepStatus::Success
            } else {
                StepStatus::Failure
            },
            duration_ms: duration.as_millis() as u64,
            exit_code: outcome.exit_code(),
            output: outcome.output().to_string(),
            error: outcome.error().map(|e| e.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    /// `Succeeded` or `Failed`
    pub status: ExecutionStatus,
    /// First step whose failure halted the run
    pub failed_step: Option<String>,
    /// Executed steps in order
    pub outcomes: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn outcome(&self, name: &str) -> Option<&StepRecord> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Accumulator of a run's step records
#[derive(Debug, Clone, Default)]
pub struct RunFold {
    failed_step: Option<String>,
    outcomes: Vec<StepRecord>,
}

impl RunFold {
    pub fn new() -> Self {
        Self::default()
    }

    /// A step failure has halted the run
    pub fn is_halted(&self) -> bool {
        self.failed_step.is_some()
    }

    /// Whether a step with this policy runs given the records so far
    pub fn should_run(&self, policy: StepPolicy) -> bool {
        !self.is_halted() || policy.always
    }

    /// Fold one record in. Returns false if the record was ignored because
    /// the run had already halted and the step is not `always`.
    pub fn record(&mut self, record: StepRecord, policy: StepPolicy) -> bool {
        if !self.should_run(policy) {
            return false;
        }

        if !record.succeeded() && !policy.continue_on_failure && self.failed_step.is_none() {
            self.failed_step = Some(record.name.clone());
        }
        self.outcomes.push(record);
        true
    }

    pub fn status(&self) -> ExecutionStatus {
        if self.is_halted() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        }
    }

    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    pub fn outcomes(&self) -> &[StepRecord] {
        &self.outcomes
    }

    /// Seal the fold into an immutable run result
    pub fn finish(
        self,
        execution_id: Uuid,
        pipeline_name: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> RunResult {
        RunResult {
            execution_id,
            pipeline_name: pipeline_name.into(),
            status: self.status(),
            failed_step: self.failed_step,
            outcomes: self.outcomes,
            started_at,
            completed_at,
        }
    }
}

/// Fold a complete sequence of records
pub fn fold_records(records: impl IntoIterator<Item = (StepPolicy, StepRecord)>) -> RunFold {
    records
        .into_iter()
        .fold(RunFold::new(), |mut fold, (policy, record)| {
            fold.record(record, policy);
            fold
        })
}
