//! Test: Triggers - only matching events start a run

use crate::helpers::*;
use linear_ci::core::{ExecutionStatus, TriggerEvent};
use linear_ci::execution::ExecutionEvent;
use linear_ci::EngineError;

/// A push to another branch does not start the pipeline
#[tokio::test]
async fn test_push_to_other_branch_is_ignored() {
    let (mut pipeline, store) = load(PYTHON_APP, &python_app_secrets());
    let harness = Harness::new(MockRunner::new());

    let err = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("feature/login"))
        .await
        .unwrap_err();

    match err {
        EngineError::NotTriggered { pipeline: name, event } => {
            assert_eq!(name, "Python application");
            assert_eq!(event.branch, "feature/login");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.state.status, ExecutionStatus::Pending);
    assert!(harness.runner().calls().is_empty());
    assert!(harness.events().is_empty());
}

/// Pull requests against main run the whole pipeline
#[tokio::test]
async fn test_pull_request_to_main_runs() {
    let (mut pipeline, store) = load(PYTHON_APP, &python_app_secrets());
    let harness = Harness::new(MockRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::pull_request("main"))
        .await
        .unwrap();

    assert_run_succeeded(&result);
    assert_eq!(result.outcomes.len(), 5);

    let started = harness.events().into_iter().find_map(|e| match e {
        ExecutionEvent::PipelineStarted { event, .. } => Some(event),
        _ => None,
    });
    assert_eq!(started, Some(TriggerEvent::pull_request("main")));

    let calls = harness.runner().calls();
    assert_eq!(
        calls[0].env.get("PIPELINE_EVENT").map(String::as_str),
        Some("pull_request")
    );
}

/// Branch filters are glob patterns; an event without a filter matches every branch
#[tokio::test]
async fn test_branch_patterns() {
    let yaml = r#"
name: "release"
on:
  push:
    branches: ["release/*"]
  pull_request:
steps:
  - name: "build"
    run: make
"#;

    let cases = [
        (TriggerEvent::push("release/1.2"), true),
        (TriggerEvent::push("main"), false),
        (TriggerEvent::pull_request("anything"), true),
    ];

    for (event, expected) in cases {
        let pipeline = pipeline_from_yaml(yaml);
        assert_eq!(
            pipeline.is_triggered_by(&event),
            expected,
            "unexpected trigger decision for {}",
            event
        );
    }
}
