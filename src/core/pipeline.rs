//! Phase state machine over persisted progress

use crate::core::{FailureReport, Phase, PhaseOutcome, PipelineError, Progress};
use crate::descriptor::BuildDescriptor;
use crate::execution::Runner;
use crate::persistence::StateStore;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Tunable pipeline behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePolicy {
    /// Clear `dependencies_built` whenever dependencies are fetched again
    pub invalidate_dependencies_on_update: bool,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            invalidate_dependencies_on_update: true,
        }
    }
}

/// Events published by the pipeline
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The build environment of a target was created
    Initialized { target: String },
    ProgressChanged(Progress),
    PhaseSkipped { phase: Phase, reason: String },
    /// Rebuild commands were appended to the session in flight
    RebuildQueued,
}

/// The build pipeline of one target
///
/// Each operation checks that no other phase is running, evaluates its
/// precondition against the current [`Progress`], runs the descriptor's
/// commands and, on success, persists the new flags before returning.
pub struct Pipeline<D> {
    descriptor: D,
    runner: Runner,
    store: Arc<dyn StateStore>,
    progress: Mutex<Progress>,
    policy: PipelinePolicy,
    events: broadcast::Sender<PipelineEvent>,
}

impl<D: BuildDescriptor> Pipeline<D> {
    /// Create a pipeline with the progress recorded for the descriptor's target
    pub async fn load(descriptor: D, runner: Runner, store: Arc<dyn StateStore>) -> Result<Self, PipelineError> {
        let progress = store
            .load_progress(descriptor.target_id())
            .await
            .map_err(PipelineError::Store)?
            .unwrap_or_default();
        debug!("Loaded progress for {}: {:?}", descriptor.target_id(), progress);

        let (events, _) = broadcast::channel(64);
        Ok(Self {
            descriptor,
            runner,
            store,
            progress: Mutex::new(progress),
            policy: PipelinePolicy::default(),
            events,
        })
    }

    pub fn with_policy(mut self, policy: PipelinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn descriptor(&self) -> &D {
        &self.descriptor
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn policy(&self) -> PipelinePolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub async fn progress(&self) -> Progress {
        *self.progress.lock().await
    }

    /// Create the build environment
    pub async fn initialize_build(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if self.progress().await.initialized {
            return Ok(self.skip(Phase::InitBuild, "Build environment already initialized"));
        }

        let outcome = self
            .run_and_commit(Phase::InitBuild, |p| p.initialized = true)
            .await?;
        if outcome.is_completed() {
            self.emit(PipelineEvent::Initialized {
                target: self.descriptor.target_id().to_string(),
            });
        }
        Ok(outcome)
    }

    /// Fetch dependency sources
    pub async fn update_dependencies(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if !self.progress().await.initialized {
            return Ok(self.skip(
                Phase::UpdateDependencies,
                "Build environment is not initialized",
            ));
        }

        let invalidate = self.policy.invalidate_dependencies_on_update;
        self.run_and_commit(Phase::UpdateDependencies, move |p| {
            p.dependencies_updated = true;
            if invalidate {
                p.dependencies_built = false;
            }
        })
        .await
    }

    pub async fn build_dependencies(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if self.progress().await.dependencies_built {
            return Ok(self.skip(Phase::BuildDependencies, "Dependencies already built"));
        }

        self.run_and_commit(Phase::BuildDependencies, |p| p.dependencies_built = true)
            .await
    }

    /// Configure, build and install the application
    pub async fn build_application(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        let progress = self.progress().await;
        if !progress.dependencies_built {
            return Ok(self.skip(Phase::BuildApplication, "Dependencies have not been built"));
        }
        if progress.application_built {
            return Ok(self.skip(
                Phase::BuildApplication,
                "Application already built, rebuild instead",
            ));
        }

        self.run_and_commit(Phase::BuildApplication, |p| p.application_built = true)
            .await
    }

    /// Incremental build of an already configured application
    pub async fn rebuild_application(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if !self.progress().await.application_built {
            return Ok(self.skip(Phase::Rebuild, "Application has not been built yet"));
        }

        self.run_and_commit(Phase::Rebuild, |p| p.application_built = true)
            .await
    }

    pub async fn run(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if !self.progress().await.application_built {
            return Ok(self.skip(Phase::Run, "Application has not been built yet"));
        }
        self.run_phase(Phase::Run).await
    }

    pub async fn export(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if !self.progress().await.application_built {
            return Ok(self.skip(Phase::Export, "Application has not been built yet"));
        }
        self.run_phase(Phase::Export).await
    }

    /// Delete the build and builder state directories and reset progress
    ///
    /// The runner is held for the whole clean, so no phase can start until
    /// the directories are gone and the reset progress is saved.
    pub async fn clean(&self) -> Result<PhaseOutcome, PipelineError> {
        self.runner.ensure_idle()?;
        if self.runner.is_interrupted() {
            return Ok(PhaseOutcome::Cancelled);
        }
        self.runner
            .exclusive(Phase::Clean, self.remove_build_state())
            .await?
    }

    async fn remove_build_state(&self) -> Result<PhaseOutcome, PipelineError> {
        let sink = self.runner.sink();
        if let Err(e) = sink.show().await {
            warn!("Output surface unavailable: {}", e);
        }
        sink.append_status_line(Phase::Clean.description());

        for path in self.descriptor.clean_paths() {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} does not exist", path.display())
                }
                Err(source) => {
                    sink.append_error_line(&format!("Failed to remove {}: {}", path.display(), source));
                    return Err(PipelineError::Io { path, source });
                }
            }
        }

        self.commit(Progress::reset).await?;
        sink.append_status_line("Clean complete");
        info!("Cleaned {}", self.descriptor.target_id());
        Ok(PhaseOutcome::Completed)
    }

    /// Run every outstanding phase up to a built application
    ///
    /// Stops at the first phase that fails or is cancelled.
    pub async fn build(&self) -> Result<PhaseOutcome, PipelineError> {
        let outcome = self.initialize_build().await?;
        if outcome.halts_pipeline() {
            return Ok(outcome);
        }

        if !self.progress().await.dependencies_updated {
            let outcome = self.update_dependencies().await?;
            if outcome.halts_pipeline() {
                return Ok(outcome);
            }
        }

        let outcome = self.build_dependencies().await?;
        if outcome.halts_pipeline() {
            return Ok(outcome);
        }

        if self.progress().await.application_built {
            self.rebuild_application().await
        } else {
            self.build_application().await
        }
    }

    /// Rebuild now, or after the application build already in flight
    pub async fn request_rebuild(&self) -> Result<PhaseOutcome, PipelineError> {
        if self.runner.is_running() {
            let commands = self.descriptor.commands(Phase::Rebuild)?;
            let queued = self
                .runner
                .append_if(commands, |phase| {
                    matches!(phase, Phase::BuildApplication | Phase::Rebuild)
                })
                .await;
            if let Some(completion) = queued {
                info!("Queued rebuild behind the running {}", completion.phase());
                self.emit(PipelineEvent::RebuildQueued);

                let outcome = completion.wait().await;
                if outcome.is_completed() {
                    self.commit(|p| p.application_built = true).await?;
                }
                return Ok(outcome);
            }
        }

        // Nothing to join: a regular rebuild with its own checks
        self.rebuild_application().await
    }

    /// Abort whatever is running; progress is left untouched
    pub async fn stop(&self) -> bool {
        self.runner.stop().await
    }

    async fn run_phase(&self, phase: Phase) -> Result<PhaseOutcome, PipelineError> {
        let commands = self.descriptor.commands(phase)?;
        info!("{} ({} command(s))", phase.description(), commands.len());
        let outcome = self.runner.start(commands, phase).await?.wait().await;
        match &outcome {
            PhaseOutcome::Failed(FailureReport { message, .. }) => {
                warn!("{} failed: {}", phase, message)
            }
            PhaseOutcome::Cancelled => info!("{} cancelled", phase),
            _ => debug!("{} completed", phase),
        }
        Ok(outcome)
    }

    async fn run_and_commit<F>(&self, phase: Phase, apply: F) -> Result<PhaseOutcome, PipelineError>
    where
        F: FnOnce(&mut Progress),
    {
        let outcome = self.run_phase(phase).await?;
        if outcome.is_completed() {
            self.commit(apply).await?;
        }
        Ok(outcome)
    }

    /// Persist new flags, then publish them
    async fn commit<F>(&self, apply: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut Progress),
    {
        let mut progress = self.progress.lock().await;
        let mut next = *progress;
        apply(&mut next);

        self.store
            .save_progress(self.descriptor.target_id(), &next)
            .await
            .map_err(PipelineError::Store)?;
        *progress = next;
        drop(progress);

        debug!("Progress for {} is now {:?}", self.descriptor.target_id(), next);
        self.emit(PipelineEvent::ProgressChanged(next));
        Ok(())
    }

    fn skip(&self, phase: Phase, reason: &str) -> PhaseOutcome {
        info!("Skipping {}: {}", phase, reason);
        self.emit(PipelineEvent::PhaseSkipped {
            phase,
            reason: reason.to_string(),
        });
        PhaseOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}
