//! Test: Cancellation - closing the output kills the running command

use crate::common::*;
use flatpak_pipeline::{Phase, PhaseOutcome, Progress, RunnerEvent};
use std::time::Duration;

/// Closing the sink cancels the phase with no failure and no flag change
#[tokio::test]
async fn test_closing_output_cancels_phase() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let after = record(&log, "after");
    let descriptor = ScriptedDescriptor::new().phase(Phase::BuildApplication, &["sleep 5", &after]);
    let h = Harness::with_progress(descriptor, dependencies_ready()).await;
    let mut runner_events = h.runner().subscribe();

    let pipeline = h.pipeline.clone();
    let building = tokio::spawn(async move { pipeline.build_application().await });
    wait_for_command(&mut runner_events).await;

    h.runner().sink().close();

    let outcome = tokio::time::timeout(Duration::from_secs(3), building)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PhaseOutcome::Cancelled);
    assert!(outcome.halts_pipeline());

    assert!(read_log(&log).is_empty());
    assert!(!h.runner().failed());
    assert!(!h.runner().is_running());
    assert!(!h.output().contains("Command failed"));
    assert_eq!(h.pipeline.progress().await, dependencies_ready());

    let notified = drain(&mut runner_events)
        .into_iter()
        .any(|e| matches!(e, RunnerEvent::Finished { .. } | RunnerEvent::Failed(_)));
    assert!(!notified);
}

/// The pipeline is usable again after a cancellation
#[tokio::test]
async fn test_phase_can_run_after_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("quick");
    // Slow until the marker exists
    let script = format!("test -f '{}' || sleep 5", marker.display());
    let descriptor = ScriptedDescriptor::new().phase(Phase::InitBuild, &[&script]);
    let h = Harness::new(descriptor).await;
    let mut runner_events = h.runner().subscribe();

    let pipeline = h.pipeline.clone();
    let first = tokio::spawn(async move { pipeline.initialize_build().await });
    wait_for_command(&mut runner_events).await;
    h.runner().sink().close();
    assert_eq!(first.await.unwrap().unwrap(), PhaseOutcome::Cancelled);
    assert_eq!(h.pipeline.progress().await, Progress::default());

    std::fs::write(&marker, "").unwrap();
    let outcome = h.pipeline.initialize_build().await.unwrap();
    assert!(outcome.is_completed());
    assert!(h.pipeline.progress().await.initialized);
    assert_eq!(h.surface.open_count(), 2);
}

/// A background helper keeping the output open does not block cancellation
#[tokio::test]
async fn test_cancel_with_background_helper() {
    let descriptor = ScriptedDescriptor::new().phase(Phase::Run, &["sleep 20 & echo started"]);
    let h = Harness::with_progress(descriptor, fully_built()).await;
    let mut runner_events = h.runner().subscribe();

    let pipeline = h.pipeline.clone();
    let running = tokio::spawn(async move { pipeline.run().await });
    wait_for_command(&mut runner_events).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    h.runner().sink().close();

    let outcome = tokio::time::timeout(Duration::from_secs(3), running)
        .await
        .expect("cancel must not wait for the helper")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PhaseOutcome::Cancelled);
    assert!(!h.runner().is_running());
}

/// An interrupt during a composite build stops every later phase
#[tokio::test]
async fn test_interrupt_stops_composite_build() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let init = format!("sleep 5; {}", record(&log, "init"));
    let descriptor = ScriptedDescriptor::recording(&log).phase(Phase::InitBuild, &[&init]);
    let h = Harness::new(descriptor).await;
    let mut runner_events = h.runner().subscribe();

    let pipeline = h.pipeline.clone();
    let building = tokio::spawn(async move { pipeline.build().await });
    wait_for_command(&mut runner_events).await;
    h.runner().interrupt().await;

    let outcome = tokio::time::timeout(Duration::from_secs(3), building)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PhaseOutcome::Cancelled);
    assert!(read_log(&log).is_empty());
    assert_eq!(h.pipeline.progress().await, Progress::default());
}

/// An interrupt landing between two phases is not lost
#[tokio::test]
async fn test_interrupt_between_phases() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let h = Harness::new(ScriptedDescriptor::recording(&log)).await;

    assert!(h.pipeline.initialize_build().await.unwrap().is_completed());
    h.runner().interrupt().await;

    assert_eq!(h.pipeline.build().await.unwrap(), PhaseOutcome::Cancelled);
    assert_eq!(read_log(&log), vec!["init-build"]);
    assert!(!h.pipeline.progress().await.dependencies_updated);
    assert_eq!(h.surface.open_count(), 1);
}
