//! Test: History - finished runs are stored and listed

use crate::helpers::*;
use linear_ci::core::{ExecutionStatus, Secrets, TriggerEvent};
use linear_ci::execution::RunResult;
use linear_ci::persistence::{InMemoryPersistence, PersistenceBackend};

async fn failed_run() -> RunResult {
    let (mut pipeline, store) = load(
        &four_step_pipeline(true),
        &Secrets::new().with("SECRET_KEY", "k3y"),
    );
    let harness = Harness::new(MockRunner::new().fail_on("pytest", 1));
    harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap()
}

async fn succeeded_run() -> RunResult {
    let (mut pipeline, store) = load(PYTHON_APP, &python_app_secrets());
    let harness = Harness::new(MockRunner::new());
    harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap()
}

async fn check_backend(backend: &dyn PersistenceBackend) {
    let failed = failed_run().await;
    let succeeded = succeeded_run().await;

    backend.save_run(&failed).await.unwrap();
    backend.save_run(&succeeded).await.unwrap();

    let loaded = backend.load_run(failed.execution_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Failed);
    assert_eq!(loaded.failed_step.as_deref(), Some("run-tests"));
    assert_eq!(loaded.outcomes, failed.outcomes);

    let mut pipelines = backend.list_pipelines().await.unwrap();
    pipelines.sort();
    assert_eq!(pipelines, vec!["Python application", "four-step"]);

    let latest = backend.latest_run("Python application").await.unwrap().unwrap();
    assert_eq!(latest.execution_id, succeeded.execution_id);
    assert_eq!(latest.outcomes.len(), 5);

    assert!(backend.delete_run(failed.execution_id).await.unwrap());
    assert!(backend.load_run(failed.execution_id).await.unwrap().is_none());
    assert_eq!(backend.list_runs(None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_in_memory_history() {
    let backend = InMemoryPersistence::new();
    check_backend(&backend).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_history() {
    let backend = linear_ci::persistence::SqliteRunStore::in_memory().await.unwrap();
    check_backend(&backend).await;
}
