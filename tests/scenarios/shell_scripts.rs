//! Test: Shell scripts - a step's script runs as a whole in one shell

use crate::helpers::*;
use linear_ci::core::{Secrets, TriggerEvent};
use linear_ci::execution::ShellRunner;

fn single_step(script: &str) -> String {
    let body: String = script.lines().map(|line| format!("      {}\n", line)).collect();
    format!(
        r#"
name: "script"
on:
  push:
steps:
  - name: "build"
    run: |
{}"#,
        body
    )
}

/// Compound commands spanning several lines are parsed by the shell, not line by line
#[tokio::test]
async fn test_multi_line_if() {
    let yaml = single_step(
        "if [ -f requirements.txt ]; then\n  echo installing\nelse\n  echo skipping\nfi",
    );
    let (mut pipeline, store) = load(&yaml, &Secrets::new());
    let harness = Harness::new(ShellRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_succeeded(&result);
    let output = &result.outcome("build").unwrap().output;
    assert!(output.contains("skipping"), "output was {:?}", output);
    assert!(!output.contains("installing"));
}

/// A `cd` on one line holds for the lines after it
#[tokio::test]
async fn test_working_directory_carries_over() {
    let (mut pipeline, store) = load(&single_step("mkdir -p sub\ncd sub\npwd"), &Secrets::new());
    let harness = Harness::new(ShellRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_succeeded(&result);
    let output = result.outcome("build").unwrap().output.trim().to_string();
    assert!(output.ends_with("/sub"), "output was {:?}", output);
}

/// Variables exported on one line are visible on the next
#[tokio::test]
async fn test_exports_carry_over() {
    let (mut pipeline, store) = load(
        &single_step("export GREETING=hello\nNAME=world\necho \"$GREETING $NAME\""),
        &Secrets::new(),
    );
    let harness = Harness::new(ShellRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_succeeded(&result);
    assert_eq!(result.outcome("build").unwrap().output.trim(), "hello world");
}

/// The first failing line ends the script and fails the step
#[tokio::test]
async fn test_script_stops_at_first_failure() {
    let (mut pipeline, store) = load(
        &single_step("echo before\nfalse\necho after"),
        &Secrets::new(),
    );
    let harness = Harness::new(ShellRunner::new());

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_failed_at(&result, "build");
    let record = result.outcome("build").unwrap();
    assert_eq!(record.exit_code, Some(1));
    assert!(record.output.contains("before"));
    assert!(!record.output.contains("after"));
    assert!(record.error.as_deref().unwrap().contains("echo before ..."));
}
