//! Core domain models for the build pipeline
//!
//! This module defines the phases, the persisted progress flags, the
//! pipeline state machine and its configuration.

pub mod config;
pub mod error;
pub mod phase;
pub mod pipeline;
pub mod progress;
pub mod target;

pub use error::PipelineError;
pub use phase::{FailureReport, Phase, PhaseOutcome};
pub use pipeline::{Pipeline, PipelineEvent, PipelinePolicy};
pub use progress::Progress;
pub use target::TargetSelector;
