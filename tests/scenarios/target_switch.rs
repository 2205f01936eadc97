//! Test: Target Switch - selecting another target stops and resets

use crate::common::*;
use flatpak_pipeline::{Phase, PhaseOutcome, Progress, RunnerEvent, StateStore, TargetSelector};
use std::time::Duration;

const OTHER: &str = "/src/other/org.example.Other.json";

/// Switching targets aborts the running phase and resets progress
#[tokio::test]
async fn test_switch_stops_runner_and_resets_progress() {
    let descriptor = ScriptedDescriptor::new().phase(Phase::BuildApplication, &["sleep 5"]);
    let h = Harness::with_progress(descriptor, dependencies_ready()).await;
    h.store.set_active_target(Some(TARGET)).await.unwrap();
    let selector = TargetSelector::new(h.store.clone(), h.runner().clone());
    let mut runner_events = h.runner().subscribe();

    let pipeline = h.pipeline.clone();
    let building = tokio::spawn(async move { pipeline.build_application().await });
    wait_for_command(&mut runner_events).await;

    let switched = tokio::time::timeout(Duration::from_secs(3), selector.select(OTHER))
        .await
        .unwrap()
        .unwrap();
    assert!(switched);
    assert!(!h.runner().is_running());
    assert_eq!(building.await.unwrap().unwrap(), PhaseOutcome::Cancelled);

    let restored = drain(&mut runner_events).into_iter().any(|e| {
        matches!(
            e,
            RunnerEvent::Finished {
                phase: Phase::BuildApplication,
                aborted_for_restore: true
            }
        )
    });
    assert!(restored);

    assert_eq!(h.stored_progress().await, Progress::default());
    assert_eq!(h.store.load_progress(OTHER).await.unwrap(), Some(Progress::default()));
    assert_eq!(selector.active().await.unwrap().as_deref(), Some(OTHER));
}

/// Selecting the active target changes nothing
#[tokio::test]
async fn test_reselecting_active_target_is_a_no_op() {
    let h = Harness::with_progress(ScriptedDescriptor::new(), fully_built()).await;
    h.store.set_active_target(Some(TARGET)).await.unwrap();
    let selector = TargetSelector::new(h.store.clone(), h.runner().clone());

    assert!(!selector.select(TARGET).await.unwrap());
    assert_eq!(h.stored_progress().await, fully_built());
}

/// Switching while idle sends no stop notification
#[tokio::test]
async fn test_switch_while_idle() {
    let h = Harness::with_progress(ScriptedDescriptor::new(), fully_built()).await;
    h.store.set_active_target(Some(TARGET)).await.unwrap();
    let selector = TargetSelector::new(h.store.clone(), h.runner().clone());
    let mut runner_events = h.runner().subscribe();

    assert!(selector.select(OTHER).await.unwrap());
    assert!(drain(&mut runner_events).is_empty());
    assert_eq!(h.stored_progress().await, Progress::default());
}
