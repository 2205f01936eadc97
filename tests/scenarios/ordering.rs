//! Test: Ordering - commands run strictly one after another

use crate::common::*;
use flatpak_pipeline::Phase;

/// Each command starts only after the previous one exited
#[tokio::test]
async fn test_commands_run_in_array_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let a = format!("sleep 0.1; {}", record(&log, "a"));
    let b = record(&log, "b");
    let c = record(&log, "c");
    let descriptor = ScriptedDescriptor::new().phase(Phase::InitBuild, &[&a, &b, &c]);
    let h = Harness::new(descriptor).await;

    let outcome = h.pipeline.initialize_build().await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(read_log(&log), vec!["a", "b", "c"]);
    assert!(h.pipeline.progress().await.initialized);
}

/// A failing command stops the list
#[tokio::test]
async fn test_later_commands_never_run_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let a = record(&log, "a");
    let b = format!("{}; exit 2", record(&log, "b"));
    let c = record(&log, "c");
    let descriptor = ScriptedDescriptor::new().phase(Phase::BuildDependencies, &[&a, &b, &c]);
    let h = Harness::new(descriptor).await;

    let outcome = h.pipeline.build_dependencies().await.unwrap();

    let report = outcome.failure().unwrap();
    assert_eq!(report.command, sh(&b));
    assert_eq!(report.exit_code, Some(2));
    assert_eq!(read_log(&log), vec!["a", "b"]);
}

/// Every command is announced with a status line before its output
#[tokio::test]
async fn test_status_line_precedes_output() {
    let descriptor = ScriptedDescriptor::new().phase(Phase::InitBuild, &["echo first", "echo second"]);
    let h = Harness::new(descriptor).await;

    h.pipeline.initialize_build().await.unwrap();

    let output = h.output();
    let banner = output.find("> sh -c echo first <").unwrap();
    let first = output.find("first\n").unwrap();
    let second_banner = output.find("> sh -c echo second <").unwrap();
    assert!(banner < first && first < second_banner);
}
