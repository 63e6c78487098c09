//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::execution::RunResult;
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a finished run (replaces a run with the same ID)
    async fn save_run(&self, run: &RunResult) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunResult>>;

    /// List runs, newest first, optionally for one pipeline only
    async fn list_runs(&self, pipeline_name: Option<&str>, limit: Option<usize>) -> Result<Vec<RunResult>>;

    /// Most recent run of a pipeline
    async fn latest_run(&self, pipeline_name: &str) -> Result<Option<RunResult>> {
        Ok(self.list_runs(Some(pipeline_name), Some(1)).await?.into_iter().next())
    }

    /// Delete a run; returns whether it existed
    async fn delete_run(&self, execution_id: Uuid) -> Result<bool>;

    /// List all pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunResult>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunResult) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.execution_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunResult>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&execution_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: Option<usize>) -> Result<Vec<RunResult>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunResult> = runs
            .values()
            .filter(|run| pipeline_name.map_or(true, |name| run.pipeline_name == name))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn delete_run(&self, execution_id: Uuid) -> Result<bool> {
        let mut runs = self.runs.write().await;
        Ok(runs.remove(&execution_id).is_some())
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|run| run.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
