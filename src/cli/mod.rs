//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{Operation, ScriptCommand, StatusCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Staged Flatpak builds with persisted progress
#[derive(Debug, Parser, Clone)]
#[command(name = "flatpak-pipeline")]
#[command(author = "Pipeline Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Build, run and export a Flatpak application in resumable stages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the build configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the state database
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Keep progress in memory only
    #[arg(long, global = true)]
    pub no_persist: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    #[command(flatten)]
    Operation(Operation),

    /// Show build progress
    Status(StatusCommand),

    /// Write a phase command as a standalone shell script
    Script(ScriptCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
