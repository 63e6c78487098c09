//! Test: Success Chain - every step runs, in order

use crate::helpers::*;
use linear_ci::core::{ExecutionStatus, Secrets, StepState, TriggerEvent};
use linear_ci::execution::{ExecutionEvent, StepStatus};

/// All four steps succeed and are recorded in declaration order
#[tokio::test]
async fn test_four_steps_succeed_in_order() {
    let secrets = Secrets::new().with("SECRET_KEY", "k3y");
    let (mut pipeline, store) = load(&four_step_pipeline(false), &secrets);
    let harness = Harness::new(MockRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .expect("pipeline runs");

    assert_run_succeeded(&result);
    assert_outcome_order(
        &result,
        &[
            "provision-runtime",
            "install-dependencies",
            "prepare-storage",
            "run-tests",
        ],
    );
    assert!(result.outcomes.iter().all(|o| o.status == StepStatus::Success));

    // One shell invocation per step; multi-line scripts stay whole
    assert_eq!(
        harness.runner().commands(),
        vec![
            "python3 --version",
            "pip install --upgrade pip\npip install -r requirements.txt",
            "mkdir -p \"$STORAGE\"",
            "coverage run -m pytest",
        ]
    );

    assert_eq!(pipeline.state.status, ExecutionStatus::Succeeded);
    assert_eq!(pipeline.state.finished_steps, 4);
    assert!(pipeline.is_complete());
    assert!(pipeline
        .steps
        .iter()
        .all(|s| matches!(s.state, StepState::Succeeded { .. })));
}

/// Every step sees the store, the runtime variables and the run's workspace
#[tokio::test]
async fn test_steps_see_store_and_runtime_variables() {
    let secrets = Secrets::new().with("SECRET_KEY", "k3y");
    let (mut pipeline, store) = load(&four_step_pipeline(false), &secrets);
    let harness = Harness::new(MockRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();
    assert_run_succeeded(&result);

    let workspace = harness.workspace().canonicalize().unwrap();
    let calls = harness.runner().calls();
    let run_id = result.execution_id.to_string();
    for call in &calls {
        assert_eq!(call.workdir, workspace);
        assert_eq!(call.env.get("STORAGE").map(String::as_str), Some("./storage"));
        assert_eq!(call.env.get("SECRET_KEY").map(String::as_str), Some("k3y"));
        assert_eq!(call.env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(call.env.get("PIPELINE_NAME").map(String::as_str), Some("four-step"));
        assert_eq!(call.env.get("PIPELINE_RUN_ID"), Some(&run_id));
        assert_eq!(call.env.get("PIPELINE_EVENT").map(String::as_str), Some("push"));
        assert_eq!(call.env.get("PIPELINE_BRANCH").map(String::as_str), Some("main"));
        assert!(call.env.contains_key("RUNNER_TEMP"));
    }

    // Action inputs are exported only to the action's own commands
    assert_eq!(
        calls[0].env.get("INPUT_PYTHON_VERSION").map(String::as_str),
        Some("3.10")
    );
    assert!(!calls[1].env.contains_key("INPUT_PYTHON_VERSION"));
}

/// Expressions in commands are substituted from the store before running
#[tokio::test]
async fn test_env_expressions_are_substituted() {
    let yaml = r#"
name: "substitution"
on:
  push:
env:
  HOST: "0.0.0.0"
  PORT: 8000
steps:
  - name: "serve"
    run: echo "listening on ${{ env.HOST }}:${{ env.PORT }}"
"#;
    let (mut pipeline, store) = load(yaml, &Secrets::new());
    let harness = Harness::new(MockRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("feature/x"))
        .await
        .unwrap();

    assert_run_succeeded(&result);
    assert_eq!(
        harness.runner().commands(),
        vec!["echo \"listening on 0.0.0.0:8000\""]
    );
}

/// The shipped pipeline runs to completion; the unshimmed upload is reported, not run
#[tokio::test]
async fn test_python_app_pipeline_succeeds() {
    let (mut pipeline, store) = load(PYTHON_APP, &python_app_secrets());
    let harness = Harness::new(MockRunner::new().output_for("pytest", "12 passed"));

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_succeeded(&result);
    assert_outcome_order(
        &result,
        &[
            "Set up Python",
            "Install dependencies",
            "Prepare storage",
            "Run tests",
            "Upload coverage",
        ],
    );
    assert!(result.outcome("Run tests").unwrap().output.contains("12 passed"));

    let upload = result.outcome("Upload coverage").unwrap();
    assert_eq!(upload.status, StepStatus::Success);
    assert!(upload.output.contains("codecov/codecov-action@v3"));
    assert!(!harness
        .runner()
        .commands()
        .iter()
        .any(|c| c.contains("codecov")));
}

/// Events arrive in run order and bracket the steps
#[tokio::test]
async fn test_event_sequence() {
    let secrets = Secrets::new().with("SECRET_KEY", "k3y");
    let (mut pipeline, store) = load(&four_step_pipeline(false), &secrets);
    let harness = Harness::new(MockRunner::new());

    harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    let events = harness.events();
    assert!(matches!(
        events.first(),
        Some(ExecutionEvent::PipelineStarted { total_steps: 4, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RuntimeTornDown { .. })
    ));
    assert_eq!(
        harness.started_steps(),
        vec![
            "provision-runtime",
            "install-dependencies",
            "prepare-storage",
            "run-tests",
        ]
    );

    let commands = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::CommandFinished { .. }))
        .count();
    assert_eq!(commands, 4);

    let completed = events
        .iter()
        .find_map(|e| match e {
            ExecutionEvent::PipelineCompleted { status, .. } => Some(*status),
            _ => None,
        })
        .unwrap();
    assert_eq!(completed, ExecutionStatus::Succeeded);
}

/// The runtime's scratch directory is gone once the run has finished
#[tokio::test]
async fn test_runtime_torn_down_after_run() {
    let secrets = Secrets::new().with("SECRET_KEY", "k3y");
    let (mut pipeline, store) = load(&four_step_pipeline(false), &secrets);
    let harness = Harness::new(MockRunner::new());

    harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    let scratch = harness.runner().calls()[0]
        .env
        .get("RUNNER_TEMP")
        .cloned()
        .unwrap();
    assert!(!std::path::Path::new(&scratch).exists());
}

/// A pipeline instance runs once
#[tokio::test]
async fn test_pipeline_cannot_run_twice() {
    let secrets = Secrets::new().with("SECRET_KEY", "k3y");
    let (mut pipeline, store) = load(&four_step_pipeline(false), &secrets);
    let harness = Harness::new(MockRunner::new());
    let event = TriggerEvent::push("main");

    harness.run(&mut pipeline, &store, &event).await.unwrap();
    let calls = harness.runner().calls().len();

    let err = harness.run(&mut pipeline, &store, &event).await.unwrap_err();
    assert!(matches!(err, linear_ci::EngineError::AlreadyStarted(_)));
    assert_eq!(harness.runner().calls().len(), calls);
}
