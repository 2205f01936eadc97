//! Pipeline error types

use crate::core::Phase;
use crate::descriptor::DescriptorError;
use crate::process::ProcessError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Another phase holds the runner
    #[error("Cannot start a new phase while {active} is running")]
    ConcurrentPipeline { active: Phase },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State store failure: {0:#}")]
    Store(anyhow::Error),
}
