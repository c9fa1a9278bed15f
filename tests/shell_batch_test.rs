//! End-to-end runs through the shell invoker
#![cfg(unix)]

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dirbatch::batch::{summarize, BatchConfig, Outcome, RetryOrchestrator, WorkUnit};
use dirbatch::classify::MarkerClassifier;
use dirbatch::discovery::{discover, MAVEN_MARKER};
use dirbatch::invoker::{InvokeError, ShellInvoker, UnitInvoker};
use tempfile::TempDir;

/// Helper function to create project directories with a marker
fn projects(names: &[&str]) -> TempDir {
    let root = TempDir::new().unwrap();
    for name in names {
        let dir = root.path().join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(MAVEN_MARKER), "<project/>").unwrap();
    }
    root
}

#[tokio::test]
async fn test_shell_invoker_runs_in_unit_directory() {
    let root = projects(&["alpha"]);
    fs::write(root.path().join("alpha").join("status.txt"), "BUILD SUCCESS\n").unwrap();

    let output = ShellInvoker::new(root.path())
        .invoke(&WorkUnit::from("alpha"), "cat status.txt")
        .await
        .expect("command should succeed");

    assert_eq!(output, "BUILD SUCCESS\n");
}

#[tokio::test]
async fn test_shell_invoker_reports_exit_failure() {
    let root = projects(&["alpha"]);

    let err = ShellInvoker::new(root.path())
        .invoke(&WorkUnit::from("alpha"), "echo partial; echo broken >&2; exit 3")
        .await
        .unwrap_err();

    match &err {
        InvokeError::Exited { stdout, stderr, status } => {
            assert_eq!(stdout, "partial\n");
            assert_eq!(stderr, "broken\n");
            assert_eq!(status.code(), Some(3));
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
    assert!(err.to_string().starts_with("command failed: "));
    assert!(err.to_string().ends_with("stderr: broken\n"));
}

#[tokio::test]
async fn test_batch_over_real_directories() {
    let root = projects(&["good", "bad", "flaky"]);
    fs::write(root.path().join("good").join("ok"), "").unwrap();

    let units = discover(root.path(), MAVEN_MARKER).unwrap();
    // "flaky" fails once, leaving a flag behind so the retry passes
    let command = "if [ -f ok ]; then echo BUILD SUCCESS; \
                   elif [ \"$(basename \"$(pwd -P)\")\" = flaky ]; then touch ok; echo BUILD FAILURE; exit 1; \
                   else echo BUILD FAILURE; exit 1; fi";

    let config = BatchConfig::default()
        .with_concurrency(2)
        .with_max_retry_rounds(3)
        .with_global_deadline(Duration::from_secs(30));
    let orchestrator = RetryOrchestrator::new(
        config,
        Arc::new(ShellInvoker::new(root.path())),
        Arc::new(MarkerClassifier::maven()),
    )
    .unwrap();

    let state = orchestrator.run(&units, command).await;
    let report = summarize(&units, &state);

    assert_eq!(report.total, 3);
    assert_eq!(report.resolved_succeeded, 2);
    assert_eq!(report.failed_units, vec![WorkUnit::from("bad")]);
    assert_eq!(state.resolved[&WorkUnit::from("flaky")].attempt, 2);
    assert_eq!(state.resolved[&WorkUnit::from("good")].outcome, Outcome::Succeeded);
    assert_eq!(state.resolved[&WorkUnit::from("bad")].outcome, Outcome::Failed);
}

#[tokio::test]
async fn test_deadline_kills_long_running_commands() {
    let root = projects(&["sleeper"]);
    let units = discover(root.path(), MAVEN_MARKER).unwrap();

    let config = BatchConfig::default()
        .with_concurrency(1)
        .with_max_retry_rounds(2)
        .with_global_deadline(Duration::from_millis(300))
        .with_grace_window(Duration::from_millis(50));
    let orchestrator = RetryOrchestrator::new(
        config,
        Arc::new(ShellInvoker::new(root.path())),
        Arc::new(MarkerClassifier::maven()),
    )
    .unwrap();

    let start = Instant::now();
    let state = orchestrator.run(&units, "sleep 30").await;
    let report = summarize(&units, &state);

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(report.unresolved_units, units);
    assert_eq!(report.abandoned_attempts, 1);
}
