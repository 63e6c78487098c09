//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod fold;
pub mod runner;
pub mod runtime;

pub use engine::{EngineError, EngineOptions, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{CommandObserver, StepError, StepExecutor, StepOutcome};
pub use fold::{fold_records, RunFold, RunResult, StepRecord, StepStatus};
pub use runner::{CommandOutput, CommandRunner, Invocation, RunnerError, ShellRunner};
pub use runtime::RuntimeInstance;
