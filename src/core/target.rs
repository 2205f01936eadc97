//! Switching between build targets

use crate::core::{PipelineError, Progress};
use crate::execution::Runner;
use crate::persistence::StateStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Records which target the pipeline builds
///
/// Switching away from a target stops the runner and forgets the old
/// target's progress, since its build directory is about to be reused.
pub struct TargetSelector {
    store: Arc<dyn StateStore>,
    runner: Runner,
}

impl TargetSelector {
    pub fn new(store: Arc<dyn StateStore>, runner: Runner) -> Self {
        Self { store, runner }
    }

    pub async fn active(&self) -> Result<Option<String>, PipelineError> {
        self.store.active_target().await.map_err(PipelineError::Store)
    }

    /// Make `target` the active target; `false` if it already was
    pub async fn select(&self, target: &str) -> Result<bool, PipelineError> {
        let current = self.active().await?;
        if current.as_deref() == Some(target) {
            debug!("{} is already the active target", target);
            return Ok(false);
        }

        if self.runner.stop().await {
            info!("Stopped running session before switching target");
        }

        if let Some(previous) = &current {
            self.store
                .save_progress(previous, &Progress::default())
                .await
                .map_err(PipelineError::Store)?;
        }
        self.store
            .save_progress(target, &Progress::default())
            .await
            .map_err(PipelineError::Store)?;
        self.store
            .set_active_target(Some(target))
            .await
            .map_err(PipelineError::Store)?;

        info!("Selected build target {}", target);
        Ok(true)
    }
}
