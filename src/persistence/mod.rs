//! Persistence layer for pipeline progress

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStateStore;

use crate::core::Progress;
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for durable pipeline state
///
/// A write must either complete or return an error before the pipeline
/// reports the phase that caused it as done.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Progress recorded for a target, if any
    async fn load_progress(&self, target: &str) -> Result<Option<Progress>>;

    async fn save_progress(&self, target: &str, progress: &Progress) -> Result<()>;

    /// Identity of the currently selected build target
    async fn active_target(&self) -> Result<Option<String>>;

    async fn set_active_target(&self, target: Option<&str>) -> Result<()>;
}

/// In-memory state (for testing or ephemeral use)
pub struct InMemoryStateStore {
    progress: RwLock<HashMap<String, Progress>>,
    active_target: RwLock<Option<String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            progress: RwLock::new(HashMap::new()),
            active_target: RwLock::new(None),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_progress(&self, target: &str) -> Result<Option<Progress>> {
        Ok(self.progress.read().await.get(target).copied())
    }

    async fn save_progress(&self, target: &str, progress: &Progress) -> Result<()> {
        self.progress
            .write()
            .await
            .insert(target.to_string(), *progress);
        Ok(())
    }

    async fn active_target(&self) -> Result<Option<String>> {
        Ok(self.active_target.read().await.clone())
    }

    async fn set_active_target(&self, target: Option<&str>) -> Result<()> {
        *self.active_target.write().await = target.map(str::to_string);
        Ok(())
    }
}
