//! External process invocation
//!
//! [`Command`] describes a single program invocation, [`ProcessHandle`]
//! supervises a spawned process and exposes its merged output stream, and
//! [`ToolVersion`] caches the version of an external tool.

pub mod command;
pub mod handle;
pub mod version;

use std::path::PathBuf;
use thiserror::Error;

pub use command::{CapturedOutput, Command, SANDBOX_WRAPPER};
pub use handle::{ExitStatus, ProcessEvent, ProcessHandle, ProcessKiller, StreamKind, KILLED_EXIT_CODE};
pub use version::{CommandVersionProbe, ToolVersion, VersionProbe};

/// Error types for process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write script {}: {source}", .path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    Exit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Could not parse a version from: {0}")]
    Version(String),
}
