//! Build phases and their outcomes

use crate::process::Command;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named stage of the build pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    InitBuild,
    UpdateDependencies,
    BuildDependencies,
    BuildApplication,
    Rebuild,
    Run,
    Export,
    Clean,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::InitBuild,
        Phase::UpdateDependencies,
        Phase::BuildDependencies,
        Phase::BuildApplication,
        Phase::Rebuild,
        Phase::Run,
        Phase::Export,
        Phase::Clean,
    ];

    /// Human readable description used in banners
    pub fn description(&self) -> &'static str {
        match self {
            Phase::InitBuild => "Initializing build environment",
            Phase::UpdateDependencies => "Updating dependencies",
            Phase::BuildDependencies => "Building dependencies",
            Phase::BuildApplication => "Building application",
            Phase::Rebuild => "Rebuilding application",
            Phase::Run => "Running application",
            Phase::Export => "Exporting bundle",
            Phase::Clean => "Cleaning build directories",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::InitBuild => "init-build",
            Phase::UpdateDependencies => "update-dependencies",
            Phase::BuildDependencies => "build-dependencies",
            Phase::BuildApplication => "build-application",
            Phase::Rebuild => "rebuild",
            Phase::Run => "run",
            Phase::Export => "export",
            Phase::Clean => "clean",
        };
        f.write_str(name)
    }
}

/// Details of the command that made a phase fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub phase: Phase,
    pub command: Command,
    /// `None` when the process could not be started at all
    pub exit_code: Option<i32>,
    pub message: String,
}

/// Result of a pipeline operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every command exited with code 0
    Completed,
    /// Precondition not met; nothing ran
    Skipped { reason: String },
    /// A command failed; the remaining commands were discarded
    Failed(FailureReport),
    /// The operator closed the output while a command was running
    Cancelled,
}

impl PhaseOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PhaseOutcome::Completed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PhaseOutcome::Skipped { .. })
    }

    /// Whether a composite build must stop after this outcome
    pub fn halts_pipeline(&self) -> bool {
        matches!(self, PhaseOutcome::Failed(_) | PhaseOutcome::Cancelled)
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            PhaseOutcome::Failed(report) => Some(report),
            _ => None,
        }
    }
}
