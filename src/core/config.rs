//! Build configuration from YAML

use crate::core::PipelinePolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "flatpak-pipeline.yaml";

/// Marker file present inside a Flatpak sandbox
const SANDBOX_MARKER: &str = "/.flatpak-info";

/// Build system of the application module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildSystem {
    #[default]
    Autotools,
    Cmake,
    CmakeNinja,
    Meson,
    /// Literal `build_commands`
    Simple,
}

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Application ID, e.g. `org.example.App`
    pub id: String,

    /// Path to the flatpak-builder manifest
    pub manifest: PathBuf,

    pub sdk: String,

    pub runtime: String,

    pub runtime_version: String,

    /// Command the application is started with
    pub command: String,

    /// Name of the application module in the manifest; dependencies are
    /// everything before it
    pub module: String,

    #[serde(default)]
    pub build_system: BuildSystem,

    #[serde(default)]
    pub config_opts: Vec<String>,

    /// Commands for the `simple` build system
    #[serde(default)]
    pub build_commands: Vec<String>,

    #[serde(default)]
    pub finish_args: Vec<String>,

    /// Extra arguments for `flatpak build`
    #[serde(default)]
    pub build_args: Vec<String>,

    /// Source directory; defaults to the directory holding the config file
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,

    /// Bundle written by export; defaults to `<id>.flatpak`
    #[serde(default)]
    pub bundle: Option<PathBuf>,

    /// Build parallelism; defaults to the number of available CPUs
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Relay commands to the host; detected when unset
    #[serde(default)]
    pub sandboxed: Option<bool>,

    /// Whether fetching new dependencies invalidates a previous dependency build
    #[serde(default = "default_true")]
    pub invalidate_dependencies_on_update: bool,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(".flatpak/repo")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".flatpak/flatpak-builder")
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from(".flatpak/finalized-repo")
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    ///
    /// A missing `workspace` is set to the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if config.workspace.is_none() {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => std::env::current_dir()?,
            };
            config.workspace = Some(dir);
        }
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Application id must not be empty");
        }
        if self.command.trim().is_empty() {
            anyhow::bail!("Application command must not be empty");
        }
        if self.module.trim().is_empty() {
            anyhow::bail!("Application module name must not be empty");
        }
        if self.build_system == BuildSystem::Simple && self.build_commands.is_empty() {
            anyhow::bail!("The simple build system requires build_commands");
        }
        if self.jobs == Some(0) {
            anyhow::bail!("jobs must be at least 1");
        }
        Ok(())
    }

    pub fn workspace(&self) -> PathBuf {
        self.workspace.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a configured path against the workspace
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace().join(path)
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn sandboxed(&self) -> bool {
        self.sandboxed
            .unwrap_or_else(|| Path::new(SANDBOX_MARKER).exists())
    }

    pub fn bundle(&self) -> PathBuf {
        self.bundle
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.flatpak", self.id)))
    }

    /// Identity of this build target in the state store
    pub fn target_id(&self) -> String {
        self.resolve(&self.manifest).display().to_string()
    }

    pub fn policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            invalidate_dependencies_on_update: self.invalidate_dependencies_on_update,
        }
    }
}
