//! Build descriptors: what each phase runs
//!
//! The pipeline treats a descriptor as an opaque `phase -> commands`
//! function; all knowledge of build-system flavors lives behind this trait.

pub mod flatpak;

use crate::core::Phase;
use crate::process::Command;
use std::path::PathBuf;
use thiserror::Error;

pub use flatpak::FlatpakDescriptor;

/// Error types for descriptor lookups
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Phase {phase} is not supported by {target}")]
    Unsupported { phase: Phase, target: String },
}

/// Supplies the ordered command list for each phase of one build target
pub trait BuildDescriptor: Send + Sync {
    /// Identity of the target in the state store
    fn target_id(&self) -> &str;

    fn commands(&self, phase: Phase) -> Result<Vec<Command>, DescriptorError>;

    /// Directories removed by a clean
    fn clean_paths(&self) -> Vec<PathBuf>;
}
