//! Test: Clean - directories removed and progress reset together

use crate::common::*;
use flatpak_pipeline::core::config::PipelineConfig;
use flatpak_pipeline::{
    FlatpakDescriptor, InMemoryStateStore, OutputSink, Phase, PhaseOutcome, Pipeline,
    PipelineError, Progress, Runner,
};
use std::sync::Arc;

/// Clean deletes build state and resets every flag
#[tokio::test]
async fn test_clean_resets_all_flags() {
    let dir = tempfile::tempdir().unwrap();
    let build_dir = dir.path().join("repo");
    let state_dir = dir.path().join("flatpak-builder");
    std::fs::create_dir_all(build_dir.join("files/bin")).unwrap();
    std::fs::write(build_dir.join("files/bin/app"), "binary").unwrap();
    std::fs::create_dir_all(&state_dir).unwrap();

    let descriptor = ScriptedDescriptor::new()
        .clean_path(&build_dir)
        .clean_path(&state_dir);
    let h = Harness::with_progress(descriptor, fully_built()).await;

    let outcome = h.pipeline.clean().await.unwrap();

    assert_eq!(outcome, PhaseOutcome::Completed);
    assert!(!build_dir.exists());
    assert!(!state_dir.exists());
    assert_eq!(h.pipeline.progress().await, Progress::default());
    assert_eq!(h.stored_progress().await, Progress::default());

    let output = h.output();
    assert!(output.contains("> Cleaning build directories <"));
    assert!(output.contains("> Clean complete <"));
}

/// Missing directories are not an error
#[tokio::test]
async fn test_clean_without_directories() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = ScriptedDescriptor::new().clean_path(dir.path().join("never-created"));
    let h = Harness::with_progress(descriptor, dependencies_ready()).await;

    assert!(h.pipeline.clean().await.unwrap().is_completed());
    assert!(h.pipeline.progress().await.is_pristine());
}

/// A path that cannot be removed surfaces an I/O error and keeps progress
#[tokio::test]
async fn test_clean_failure_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-directory");
    std::fs::write(&file, "plain file").unwrap();

    let descriptor = ScriptedDescriptor::new().clean_path(&file);
    let h = Harness::with_progress(descriptor, fully_built()).await;

    let err = h.pipeline.clean().await.unwrap_err();
    assert!(matches!(err, PipelineError::Io { ref path, .. } if path == &file));
    assert_eq!(h.pipeline.progress().await, fully_built());
    assert!(h.output().contains("Failed to remove"));
}

/// No phase can start while a clean is deleting directories
#[tokio::test]
async fn test_clean_holds_off_other_operations() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let build_dir = dir.path().join("repo");
    for i in 0..200 {
        std::fs::create_dir_all(build_dir.join(format!("files/share/{}", i))).unwrap();
    }

    let init = record(&log, "init");
    let descriptor = ScriptedDescriptor::new()
        .phase(Phase::InitBuild, &[&init])
        .clean_path(&build_dir);
    let h = Harness::new(descriptor).await;

    let (cleaned, initialized) = tokio::join!(h.pipeline.clean(), h.pipeline.initialize_build());

    assert_eq!(cleaned.unwrap(), PhaseOutcome::Completed);
    assert!(matches!(
        initialized,
        Err(PipelineError::ConcurrentPipeline {
            active: Phase::Clean
        })
    ));
    assert!(read_log(&log).is_empty());
    assert!(!build_dir.exists());
    assert!(!h.runner().is_running());

    // The runner is free again once the clean is done
    assert!(h.pipeline.initialize_build().await.unwrap().is_completed());
    assert!(h.stored_progress().await.initialized);
}

/// Clean also removes the out-of-tree meson/cmake build directory
#[tokio::test]
async fn test_clean_removes_build_system_directory() {
    let workspace = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
id: "org.example.App"
manifest: "org.example.App.json"
sdk: "org.gnome.Sdk"
runtime: "org.gnome.Platform"
runtime_version: "45"
command: "example-app"
module: "example-app"
build_system: meson
workspace: "{}"
sandboxed: false
"#,
        workspace.path().display()
    );
    let descriptor = FlatpakDescriptor::new(PipelineConfig::from_yaml(&yaml).unwrap());

    let meson_dir = workspace.path().join("_flatpak_build");
    std::fs::create_dir_all(meson_dir.join("meson-private")).unwrap();
    std::fs::write(meson_dir.join("build.ninja"), "rule cc").unwrap();

    let store = Arc::new(InMemoryStateStore::new());
    let runner = Runner::new(OutputSink::new(Arc::new(
        flatpak_pipeline::output::BufferSurface::new(),
    )));
    let pipeline = Pipeline::load(descriptor, runner, store).await.unwrap();

    assert!(pipeline.clean().await.unwrap().is_completed());
    assert!(!meson_dir.exists());
}
