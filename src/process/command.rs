//! Immutable description of an external program invocation

use crate::process::{ExitStatus, ProcessError, ProcessEvent, ProcessHandle, StreamKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// Wrapper used to relay a command from inside the sandbox to the host
pub const SANDBOX_WRAPPER: &str = "flatpak-spawn";

/// A single program invocation
///
/// Built with the consuming builder methods and never mutated afterwards.
/// The sandbox wrapper is applied when rendering or spawning, so a command is
/// never wrapped twice no matter how often it is executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    program: String,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    sandboxed: bool,
}

/// Captured result of running a command to completion
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            sandboxed: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Relay the command through [`SANDBOX_WRAPPER`]
    pub fn sandboxed(mut self, sandboxed: bool) -> Self {
        self.sandboxed = sandboxed;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }

    /// Full argument vector as it is handed to the OS
    pub fn argv(&self) -> Vec<&str> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        if self.sandboxed {
            argv.push(SANDBOX_WRAPPER);
            argv.push("--host");
        }
        argv.push(self.program.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        argv
    }

    /// Write a POSIX shell script that execs this command, forwarding any
    /// extra arguments, and mark it executable.
    pub async fn materialize_as_script(&self, path: &Path) -> Result<(), ProcessError> {
        let script_error = |source| ProcessError::Script {
            path: path.to_path_buf(),
            source,
        };

        let mut script = String::from("#!/bin/sh\n");
        if let Some(dir) = &self.working_directory {
            script.push_str(&format!(
                "cd {} || exit 1\n",
                shell_quote(&dir.to_string_lossy())
            ));
        }
        let quoted: Vec<String> = self.argv().into_iter().map(shell_quote).collect();
        script.push_str(&format!("exec {} \"$@\"\n", quoted.join(" ")));

        tokio::fs::write(path, script).await.map_err(script_error)?;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(script_error)?;

        debug!("Wrote script for `{}` to {}", self, path.display());
        Ok(())
    }

    /// Start the process with piped output
    pub fn spawn(&self) -> Result<ProcessHandle, ProcessError> {
        let argv = self.argv();
        let mut command = tokio::process::Command::new(argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: self.to_string(),
            source,
        })?;
        debug!("Spawned `{}` (pid {:?})", self, child.id());

        Ok(ProcessHandle::supervise(child))
    }

    /// Run to completion, collecting stdout and stderr separately
    pub async fn output(&self) -> Result<CapturedOutput, ProcessError> {
        let mut handle = self.spawn()?;
        let mut stdout = String::new();
        let mut stderr = String::new();

        while let Some(event) = handle.next_event().await {
            match event {
                ProcessEvent::Output {
                    stream: StreamKind::Stdout,
                    chunk,
                } => stdout.push_str(&chunk),
                ProcessEvent::Output {
                    stream: StreamKind::Stderr,
                    chunk,
                } => stderr.push_str(&chunk),
                ProcessEvent::Exited(status) => {
                    return Ok(CapturedOutput {
                        status,
                        stdout,
                        stderr,
                    })
                }
            }
        }

        Ok(CapturedOutput {
            status: ExitStatus::killed(),
            stdout,
            stderr,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Quote a word for a POSIX shell
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
