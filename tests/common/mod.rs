//! Test utility functions for pipeline scenarios

#![allow(dead_code)]

use flatpak_pipeline::descriptor::{BuildDescriptor, DescriptorError};
use flatpak_pipeline::output::BufferSurface;
use flatpak_pipeline::{
    Command, InMemoryStateStore, OutputSink, Phase, Pipeline, Progress, Runner, RunnerEvent,
    StateStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const TARGET: &str = "/src/scenario/org.example.Scenario.json";

/// `sh -c <script>`
pub fn sh(script: &str) -> Command {
    Command::new("sh").args(["-c", script])
}

/// Shell snippet appending `entry` to the log file
pub fn record(log: &Path, entry: &str) -> String {
    format!("echo {} >> '{}'", entry, log.display())
}

/// Lines of the log file; empty when nothing was recorded
pub fn read_log(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Descriptor whose phases run literal shell snippets
///
/// Phases without snippets are reported as unsupported.
pub struct ScriptedDescriptor {
    target: String,
    phases: HashMap<Phase, Vec<Command>>,
    clean_paths: Vec<PathBuf>,
}

impl ScriptedDescriptor {
    pub fn new() -> Self {
        Self {
            target: TARGET.to_string(),
            phases: HashMap::new(),
            clean_paths: Vec::new(),
        }
    }

    /// Every phase records its own name in `log`
    pub fn recording(log: &Path) -> Self {
        Phase::ALL
            .into_iter()
            .filter(|phase| *phase != Phase::Clean)
            .fold(Self::new(), |descriptor, phase| {
                descriptor.phase(phase, &[record(log, &phase.to_string()).as_str()])
            })
    }

    pub fn target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    pub fn phase(mut self, phase: Phase, scripts: &[&str]) -> Self {
        self.phases.insert(phase, scripts.iter().map(|s| sh(s)).collect());
        self
    }

    pub fn commands_for(mut self, phase: Phase, commands: Vec<Command>) -> Self {
        self.phases.insert(phase, commands);
        self
    }

    pub fn clean_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.clean_paths.push(path.into());
        self
    }
}

impl BuildDescriptor for ScriptedDescriptor {
    fn target_id(&self) -> &str {
        &self.target
    }

    fn commands(&self, phase: Phase) -> Result<Vec<Command>, DescriptorError> {
        self.phases
            .get(&phase)
            .cloned()
            .ok_or_else(|| DescriptorError::Unsupported {
                phase,
                target: self.target.clone(),
            })
    }

    fn clean_paths(&self) -> Vec<PathBuf> {
        self.clean_paths.clone()
    }
}

/// A pipeline wired to an in-memory store and a buffer surface
pub struct Harness {
    pub pipeline: Arc<Pipeline<ScriptedDescriptor>>,
    pub store: Arc<InMemoryStateStore>,
    pub surface: Arc<BufferSurface>,
}

impl Harness {
    pub async fn new(descriptor: ScriptedDescriptor) -> Self {
        Self::with_progress(descriptor, Progress::default()).await
    }

    pub async fn with_progress(descriptor: ScriptedDescriptor, progress: Progress) -> Self {
        let store = Arc::new(InMemoryStateStore::new());
        store
            .save_progress(descriptor.target_id(), &progress)
            .await
            .unwrap();

        let surface = Arc::new(BufferSurface::new());
        let runner = Runner::new(OutputSink::new(surface.clone()));
        let pipeline = Pipeline::load(descriptor, runner, store.clone())
            .await
            .unwrap();

        Self {
            pipeline: Arc::new(pipeline),
            store,
            surface,
        }
    }

    pub fn runner(&self) -> &Runner {
        self.pipeline.runner()
    }

    pub async fn stored_progress(&self) -> Progress {
        self.store
            .load_progress(self.pipeline.descriptor().target_id())
            .await
            .unwrap()
            .unwrap_or_default()
    }

    pub fn output(&self) -> String {
        self.surface.contents()
    }
}

/// Progress with every flag set
pub fn fully_built() -> Progress {
    Progress {
        initialized: true,
        dependencies_updated: true,
        dependencies_built: true,
        application_built: true,
    }
}

/// Progress with dependencies ready and no application build
pub fn dependencies_ready() -> Progress {
    Progress {
        initialized: true,
        dependencies_updated: true,
        dependencies_built: true,
        application_built: false,
    }
}

/// Wait until the runner has spawned its next command
pub async fn wait_for_command(events: &mut broadcast::Receiver<RunnerEvent>) -> Command {
    let wait = async {
        loop {
            if let RunnerEvent::CommandStarted { command, .. } = events.recv().await.unwrap() {
                return command;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no command started")
}

/// Drain the events received so far
pub fn drain<T: Clone>(events: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}
