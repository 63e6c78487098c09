//! linear-ci - A linear, fail-fast CI pipeline runner

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use crate::core::config::PipelineConfig;
pub use crate::core::{ConfigError, ConfigurationStore, ExecutionStatus, Pipeline, Secrets, Step, StepState, TriggerEvent};
pub use crate::execution::{
    CommandRunner, EngineError, ExecutionEngine, ExecutionEvent, RunResult, ShellRunner, StepOutcome,
};
pub use crate::persistence::{InMemoryPersistence, PersistenceBackend};
