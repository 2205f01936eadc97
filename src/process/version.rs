//! Lazily probed, resettable tool version

use crate::process::{Command, ProcessError};
use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use tokio::sync::Mutex;
use tracing::debug;

/// Source of a tool's version
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn probe(&self) -> Result<Version, ProcessError>;
}

/// Probe that runs a command and parses the first version number it prints
#[derive(Debug, Clone)]
pub struct CommandVersionProbe {
    command: Command,
}

impl CommandVersionProbe {
    pub fn new(command: Command) -> Self {
        Self { command }
    }

    /// `flatpak --version`, relayed to the host when sandboxed
    pub fn flatpak(sandboxed: bool) -> Self {
        Self::new(Command::new("flatpak").arg("--version").sandboxed(sandboxed))
    }
}

#[async_trait]
impl VersionProbe for CommandVersionProbe {
    async fn probe(&self) -> Result<Version, ProcessError> {
        let output = self.command.output().await?;
        if !output.status.success() {
            return Err(ProcessError::Exit {
                command: self.command.to_string(),
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_version(&output.stdout).ok_or_else(|| ProcessError::Version(output.stdout.trim().to_string()))
    }
}

/// Extract `major.minor[.patch]` from free-form tool output
pub fn parse_version(text: &str) -> Option<Version> {
    let re = Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok()?;
    let caps = re.captures(text)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(Version::new(part(1)?, part(2)?, part(3).unwrap_or(0)))
}

/// A version looked up on first use and cached until [`ToolVersion::reset`]
pub struct ToolVersion<P> {
    probe: P,
    cached: Mutex<Option<Version>>,
}

impl<P: VersionProbe> ToolVersion<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Version, ProcessError> {
        let mut cached = self.cached.lock().await;
        if let Some(version) = cached.as_ref() {
            return Ok(version.clone());
        }
        let version = self.probe.probe().await?;
        debug!("Probed tool version {}", version);
        *cached = Some(version.clone());
        Ok(version)
    }

    pub async fn at_least(&self, minimum: &Version) -> Result<bool, ProcessError> {
        Ok(self.get().await? >= *minimum)
    }

    /// Forget the cached version so the next lookup probes again
    pub async fn reset(&self) {
        *self.cached.lock().await = None;
    }
}
