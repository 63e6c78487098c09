//! Test: Configuration - store resolution, overrides and secret masking

use crate::helpers::*;
use linear_ci::core::{ConfigError, ConfigurationStore, ExecutionStatus, Secrets, StepState, TriggerEvent};
use std::io::Write;

/// Without the signing key the store does not load and nothing runs
#[tokio::test]
async fn test_missing_signing_key_stops_before_running() {
    let mut pipeline = pipeline_from_yaml(PYTHON_APP);
    let secrets = Secrets::new()
        .with("ADMIN_PASSWD", "admin-pass-123")
        .with("EMAIL_PASSWD", "mail-pass-456");

    let err = ConfigurationStore::load(&pipeline.declarations, &secrets).unwrap_err();
    assert_eq!(
        err,
        ConfigError::MissingValue {
            names: vec!["SECRET_KEY".to_string()]
        }
    );

    assert_eq!(pipeline.state.status, ExecutionStatus::Pending);
    assert!(pipeline.state.started_at.is_none());
    assert!(pipeline.steps.iter().all(|s| matches!(s.state, StepState::Pending)));

    // The pipeline itself is untouched and runs once configuration is complete
    let store = ConfigurationStore::load(&pipeline.declarations, &python_app_secrets()).unwrap();
    let harness = Harness::new(MockRunner::new());
    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();
    assert_run_succeeded(&result);
}

/// Every missing value is reported at once
#[test]
fn test_all_missing_values_reported() {
    let pipeline = pipeline_from_yaml(PYTHON_APP);
    let err = ConfigurationStore::load(&pipeline.declarations, &Secrets::new()).unwrap_err();
    match err {
        ConfigError::MissingValue { names } => {
            assert_eq!(names, vec!["ADMIN_PASSWD", "EMAIL_PASSWD", "SECRET_KEY"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Declarations left empty are read from the secret source under their own name
#[tokio::test]
async fn test_null_declaration_reads_secret_by_name() {
    let yaml = r#"
name: "external"
on:
  push:
env:
  DEPLOY_TOKEN: null
steps:
  - name: "deploy"
    run: ./deploy.sh
    requires: ["DEPLOY_TOKEN"]
"#;
    let pipeline = pipeline_from_yaml(yaml);
    assert!(matches!(
        ConfigurationStore::load(&pipeline.declarations, &Secrets::new()),
        Err(ConfigError::MissingValue { .. })
    ));

    let secrets = Secrets::new().with("DEPLOY_TOKEN", "t0k3n");
    let (mut pipeline, store) = load(yaml, &secrets);
    let harness = Harness::new(MockRunner::new());
    harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    let calls = harness.runner().calls();
    assert_eq!(calls[0].env.get("DEPLOY_TOKEN").map(String::as_str), Some("t0k3n"));
}

/// Overrides replace declared values for one run
#[tokio::test]
async fn test_overrides_replace_declared_values() {
    let pipeline = pipeline_from_yaml(PYTHON_APP);
    let overrides = vec![
        ("PORT".to_string(), "9001".to_string()),
        ("SECRET_KEY".to_string(), "override-key".to_string()),
    ];
    let secrets = Secrets::new()
        .with("ADMIN_PASSWD", "a")
        .with("EMAIL_PASSWD", "e");
    let store =
        ConfigurationStore::load_with_overrides(&pipeline.declarations, &secrets, &overrides)
            .unwrap();

    assert_eq!(store.get("PORT").unwrap(), "9001");
    assert_eq!(store.get("SECRET_KEY").unwrap(), "override-key");
    assert_eq!(store.get("HOST").unwrap(), "0.0.0.0");
}

/// Values filling secret slots are masked, whether they come from an override or by name
#[tokio::test]
async fn test_overridden_and_external_secrets_are_masked() {
    let yaml = r#"
name: "deploy"
on:
  push:
env:
  PORT: 8000
  SECRET_KEY: "${{ secrets.SECRET_KEY }}"
  DEPLOY_TOKEN: null
steps:
  - name: "deploy"
    run: ./deploy.sh --key "${{ env.SECRET_KEY }}" --port "${{ env.PORT }}"
"#;
    let pipeline = pipeline_from_yaml(yaml);
    let overrides = vec![
        ("SECRET_KEY".to_string(), "cli-key-321".to_string()),
        ("PORT".to_string(), "9001".to_string()),
    ];
    let secrets = Secrets::new()
        .with("SECRET_KEY", "vault-key-123")
        .with("DEPLOY_TOKEN", "t0k3n-abc");
    let store =
        ConfigurationStore::load_with_overrides(&pipeline.declarations, &secrets, &overrides)
            .unwrap();

    let mut pipeline = pipeline;
    let harness = Harness::new(
        MockRunner::new()
            .output_for("deploy.sh", "key=cli-key-321 token=t0k3n-abc port=9001")
            .fail_on("deploy.sh", 3),
    );
    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_failed_at(&result, "deploy");
    let record = result.outcome("deploy").unwrap();
    assert!(record.output.contains("key=*** token=*** port=9001"));
    let error = record.error.as_deref().unwrap();
    assert!(error.contains("--key \"***\""), "error was {:?}", error);

    let serialized = serde_json::to_string(&result).unwrap();
    assert!(!serialized.contains("cli-key-321"));
    assert!(!serialized.contains("t0k3n-abc"));

    // The runner still receives the real values
    let call = &harness.runner().calls()[0];
    assert!(call.command.contains("--key \"cli-key-321\""));
    assert_eq!(call.env.get("DEPLOY_TOKEN").map(String::as_str), Some("t0k3n-abc"));
}

/// Overriding a variable the pipeline never declares is rejected
#[test]
fn test_undeclared_override_rejected() {
    let pipeline = pipeline_from_yaml(PYTHON_APP);
    let overrides = vec![("DEBUG".to_string(), "1".to_string())];

    let err = ConfigurationStore::load_with_overrides(
        &pipeline.declarations,
        &python_app_secrets(),
        &overrides,
    )
    .unwrap_err();
    assert_eq!(err, ConfigError::UndeclaredVariable("DEBUG".to_string()));
}

/// Secret values never appear in recorded output or errors
#[tokio::test]
async fn test_secret_values_are_masked() {
    let (mut pipeline, store) = load(PYTHON_APP, &python_app_secrets());
    let harness = Harness::new(
        MockRunner::new()
            .output_for("pytest", "connecting with signing-key-789 as admin-pass-123")
            .fail_on("pytest", 1),
    );

    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();

    assert_run_failed_at(&result, "Run tests");
    let output = &result.outcome("Run tests").unwrap().output;
    assert!(output.contains("connecting with *** as ***"));
    assert!(!output.contains("signing-key-789"));

    let serialized = serde_json::to_string(&result).unwrap();
    assert!(!serialized.contains("signing-key-789"));
    assert!(!serialized.contains("admin-pass-123"));

    // The runner itself still receives the real values
    let calls = harness.runner().calls();
    let tests = calls.iter().find(|c| c.command.contains("pytest")).unwrap();
    assert_eq!(
        tests.env.get("SECRET_KEY").map(String::as_str),
        Some("signing-key-789")
    );
}

/// Secrets can come from a dotenv file layered over another source
#[tokio::test]
async fn test_env_file_secrets() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# local secrets").unwrap();
    writeln!(file, "ADMIN_PASSWD=from-file").unwrap();
    writeln!(file, "EMAIL_PASSWD=\"mail pass\"").unwrap();
    writeln!(file, "SECRET_KEY=file-key").unwrap();

    let secrets = Secrets::new()
        .with("SECRET_KEY", "process-key")
        .layer(Secrets::from_env_file(file.path()).unwrap());
    assert_eq!(secrets.get("EMAIL_PASSWD"), Some("mail pass"));

    let (mut pipeline, store) = load(PYTHON_APP, &secrets);
    assert_eq!(store.get("SECRET_KEY").unwrap(), "file-key");

    let harness = Harness::new(MockRunner::new());
    let result = harness
        .run(&mut pipeline, &store, &TriggerEvent::push("main"))
        .await
        .unwrap();
    assert_run_succeeded(&result);
}

/// A missing dotenv file is a configuration error naming the file
#[test]
fn test_missing_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.env");

    match Secrets::from_env_file(&path) {
        Err(ConfigError::EnvFile { path: reported, .. }) => {
            assert!(reported.ends_with("absent.env"));
        }
        other => panic!("expected an env file error, got {other:?}"),
    }
}
