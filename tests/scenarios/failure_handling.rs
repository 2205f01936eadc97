//! Test: Failure Handling - failures halt a phase without corrupting state

use crate::common::*;
use flatpak_pipeline::{Command, Phase, PhaseOutcome, Progress, RunnerEvent};

/// `[A, B]` with A exiting 1: B never runs and no flag is set
#[tokio::test]
async fn test_failure_halts_and_keeps_flags() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let b = record(&log, "b");
    let descriptor = ScriptedDescriptor::new().phase(Phase::InitBuild, &["exit 1", &b]);
    let h = Harness::new(descriptor).await;
    let mut runner_events = h.runner().subscribe();

    let outcome = h.pipeline.initialize_build().await.unwrap();

    let report = outcome.failure().unwrap();
    assert_eq!(report.phase, Phase::InitBuild);
    assert_eq!(report.command, sh("exit 1"));
    assert_eq!(report.exit_code, Some(1));
    assert!(read_log(&log).is_empty());

    assert_eq!(h.pipeline.progress().await, Progress::default());
    assert_eq!(h.stored_progress().await, Progress::default());
    assert!(h.runner().failed());
    assert!(!h.runner().is_running());
    assert!(h.output().contains("Command failed with exit code 1: sh -c exit 1"));

    let failed = drain(&mut runner_events)
        .into_iter()
        .filter(|e| matches!(e, RunnerEvent::Failed(_)))
        .count();
    assert_eq!(failed, 1);
}

/// Recovery is re-invoking the same operation
#[tokio::test]
async fn test_reinvocation_after_fix_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("fixed");
    let check = format!("test -f '{}'", marker.display());
    let descriptor = ScriptedDescriptor::new().phase(Phase::InitBuild, &[&check]);
    let h = Harness::new(descriptor).await;

    let outcome = h.pipeline.initialize_build().await.unwrap();
    assert!(matches!(outcome, PhaseOutcome::Failed(_)));
    assert!(!h.pipeline.progress().await.initialized);

    std::fs::write(&marker, "").unwrap();
    let outcome = h.pipeline.initialize_build().await.unwrap();
    assert!(outcome.is_completed());
    assert!(h.pipeline.progress().await.initialized);
    assert!(!h.runner().failed());
}

/// A program that cannot be started fails like a non-zero exit
#[tokio::test]
async fn test_spawn_failure_is_reported() {
    let missing = Command::new("no-such-build-tool-7c1e").arg("--version");
    let descriptor = ScriptedDescriptor::new()
        .commands_for(Phase::BuildDependencies, vec![missing.clone(), sh("true")]);
    let h = Harness::new(descriptor).await;

    let outcome = h.pipeline.build_dependencies().await.unwrap();

    let report = outcome.failure().unwrap();
    assert_eq!(report.command, missing);
    assert_eq!(report.exit_code, None);
    assert!(report.message.contains("no-such-build-tool-7c1e"));
    assert!(!h.pipeline.progress().await.dependencies_built);
    assert!(h.output().contains("no-such-build-tool-7c1e"));
}

/// A phase the descriptor cannot provide is an error, not an outcome
#[tokio::test]
async fn test_unsupported_phase_is_an_error() {
    let h = Harness::new(ScriptedDescriptor::new()).await;

    let err = h.pipeline.initialize_build().await.unwrap_err();
    assert!(err.to_string().contains("not supported"));
    assert!(!h.runner().is_running());
}
