//! flatpak-pipeline - staged Flatpak builds with persisted progress

pub mod cli;
pub mod core;
pub mod descriptor;
pub mod execution;
pub mod output;
pub mod persistence;
pub mod process;

// Re-export commonly used types
pub use core::{FailureReport, Phase, PhaseOutcome, Pipeline, PipelineError, PipelineEvent, PipelinePolicy, Progress, TargetSelector};
pub use descriptor::{BuildDescriptor, DescriptorError, FlatpakDescriptor};
pub use execution::{Completion, Runner, RunnerEvent};
pub use output::{OutputSink, OutputSurface};
pub use persistence::{InMemoryStateStore, StateStore};
pub use process::{Command, ProcessError};
