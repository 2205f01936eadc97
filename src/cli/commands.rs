//! CLI command definitions

use crate::core::Phase;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Subcommands that drive the build pipeline
#[derive(Debug, Subcommand, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create the build environment
    Init,

    /// Fetch dependency sources
    UpdateDeps,

    /// Build the dependency modules
    BuildDeps,

    /// Run every outstanding phase up to a built application
    Build,

    /// Incrementally rebuild the application
    Rebuild,

    /// Run the built application
    Run,

    /// Finish the build and write a bundle
    Export,

    /// Delete build directories and reset progress
    Clean,
}

impl Operation {
    /// Subcommand name, used in result lines
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::UpdateDeps => "update-deps",
            Operation::BuildDeps => "build-deps",
            Operation::Build => "build",
            Operation::Rebuild => "rebuild",
            Operation::Run => "run",
            Operation::Export => "export",
            Operation::Clean => "clean",
        }
    }
}

/// Show build progress
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Write a phase command as a standalone shell script
#[derive(Debug, Args, Clone)]
pub struct ScriptCommand {
    /// Phase whose command is written
    #[arg(short, long, value_enum)]
    pub phase: PhaseArg,

    /// Script path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Which of the phase's commands to write
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}

/// Phase argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PhaseArg {
    Init,
    UpdateDeps,
    BuildDeps,
    Build,
    Rebuild,
    Run,
    Export,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Init => Phase::InitBuild,
            PhaseArg::UpdateDeps => Phase::UpdateDependencies,
            PhaseArg::BuildDeps => Phase::BuildDependencies,
            PhaseArg::Build => Phase::BuildApplication,
            PhaseArg::Rebuild => Phase::Rebuild,
            PhaseArg::Run => Phase::Run,
            PhaseArg::Export => Phase::Export,
        }
    }
}
