//! Descriptor driving `flatpak` and `flatpak-builder`

use crate::core::config::{BuildSystem, PipelineConfig};
use crate::core::Phase;
use crate::descriptor::{BuildDescriptor, DescriptorError};
use crate::process::Command;
use std::path::PathBuf;

/// Install prefix inside the Flatpak build environment
const INSTALL_PREFIX: &str = "/app";

/// Out-of-tree build directory used by meson and cmake
const BUILD_SUBDIR: &str = "_flatpak_build";

/// Commands for a Flatpak application described by a [`PipelineConfig`]
#[derive(Debug, Clone)]
pub struct FlatpakDescriptor {
    config: PipelineConfig,
    target_id: String,
    workspace: PathBuf,
    build_dir: PathBuf,
    state_dir: PathBuf,
    repo_dir: PathBuf,
    jobs: usize,
    sandboxed: bool,
}

impl FlatpakDescriptor {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            target_id: config.target_id(),
            workspace: config.workspace(),
            build_dir: config.resolve(&config.build_dir),
            state_dir: config.resolve(&config.state_dir),
            repo_dir: config.resolve(&config.repo_dir),
            jobs: config.jobs(),
            sandboxed: config.sandboxed(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn build_dir(&self) -> &PathBuf {
        &self.build_dir
    }

    fn flatpak(&self) -> Command {
        Command::new("flatpak")
            .current_dir(&self.workspace)
            .sandboxed(self.sandboxed)
    }

    fn flatpak_builder(&self) -> Command {
        Command::new("flatpak-builder")
            .current_dir(&self.workspace)
            .sandboxed(self.sandboxed)
    }

    /// Substitute `${prefix}`, `${jobs}`, `${build_dir}` and `${workspace}`
    fn expand(&self, value: &str) -> String {
        value
            .replace("${prefix}", INSTALL_PREFIX)
            .replace("${jobs}", &self.jobs.to_string())
            .replace("${build_dir}", &self.build_dir.display().to_string())
            .replace("${workspace}", &self.workspace.display().to_string())
    }

    fn expand_all(&self, values: &[String]) -> Vec<String> {
        values.iter().map(|v| self.expand(v)).collect()
    }

    /// Run `inner` inside the build directory's sandbox
    fn in_build_env<I, S>(&self, inner: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flatpak()
            .arg("build")
            .arg("--share=network")
            .arg(format!("--filesystem={}", self.workspace.display()))
            .args(self.expand_all(&self.config.build_args))
            .arg(self.build_dir.display().to_string())
            .args(inner)
    }

    fn builder_stop_at(&self, mode: &[&str]) -> Command {
        self.flatpak_builder()
            .args(["--ccache", "--force-clean", "--disable-updates"])
            .args(mode.iter().copied())
            .arg(format!("--state-dir={}", self.state_dir.display()))
            .arg(format!("--stop-at={}", self.config.module))
            .arg(self.build_dir.display().to_string())
            .arg(self.config.resolve(&self.config.manifest).display().to_string())
    }

    fn configure_step(&self) -> Option<Vec<String>> {
        let opts = self.expand_all(&self.config.config_opts);
        let prefix = format!("--prefix={}", INSTALL_PREFIX);
        let cmake_prefix = format!("-DCMAKE_INSTALL_PREFIX={}", INSTALL_PREFIX);

        let argv: Vec<String> = match self.config.build_system {
            BuildSystem::Autotools => std::iter::once("./configure".to_string())
                .chain(std::iter::once(prefix))
                .chain(opts)
                .collect(),
            BuildSystem::Meson => ["meson", "setup"]
                .iter()
                .map(|s| s.to_string())
                .chain(std::iter::once(prefix))
                .chain(opts)
                .chain(std::iter::once(BUILD_SUBDIR.to_string()))
                .collect(),
            BuildSystem::Cmake => ["cmake", "-B", BUILD_SUBDIR]
                .iter()
                .map(|s| s.to_string())
                .chain(std::iter::once(cmake_prefix))
                .chain(opts)
                .chain(std::iter::once(".".to_string()))
                .collect(),
            BuildSystem::CmakeNinja => ["cmake", "-G", "Ninja", "-B", BUILD_SUBDIR]
                .iter()
                .map(|s| s.to_string())
                .chain(std::iter::once(cmake_prefix))
                .chain(opts)
                .chain(std::iter::once(".".to_string()))
                .collect(),
            BuildSystem::Simple => return None,
        };
        Some(argv)
    }

    fn compile_and_install_steps(&self) -> Vec<Vec<String>> {
        let jobs = self.jobs.to_string();
        let make_jobs = format!("-j{}", jobs);
        let owned = |argv: &[&str]| argv.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        match self.config.build_system {
            BuildSystem::Autotools => vec![
                owned(&["make", make_jobs.as_str()]),
                owned(&["make", "install"]),
            ],
            BuildSystem::Cmake => vec![
                owned(&["make", "-C", BUILD_SUBDIR, make_jobs.as_str()]),
                owned(&["make", "-C", BUILD_SUBDIR, "install"]),
            ],
            BuildSystem::Meson | BuildSystem::CmakeNinja => vec![
                owned(&["ninja", "-C", BUILD_SUBDIR, "-j", jobs.as_str()]),
                owned(&["ninja", "-C", BUILD_SUBDIR, "install"]),
            ],
            BuildSystem::Simple => self
                .config
                .build_commands
                .iter()
                .map(|c| vec!["sh".to_string(), "-c".to_string(), self.expand(c)])
                .collect(),
        }
    }
}

impl BuildDescriptor for FlatpakDescriptor {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    fn commands(&self, phase: Phase) -> Result<Vec<Command>, DescriptorError> {
        let config = &self.config;
        let build_dir = self.build_dir.display().to_string();

        let commands = match phase {
            Phase::InitBuild => vec![self.flatpak().args([
                "build-init",
                build_dir.as_str(),
                config.id.as_str(),
                config.sdk.as_str(),
                config.runtime.as_str(),
                config.runtime_version.as_str(),
            ])],
            Phase::UpdateDependencies => vec![self.builder_stop_at(&["--download-only"])],
            Phase::BuildDependencies => vec![self.builder_stop_at(&[
                "--disable-download",
                "--build-only",
                "--keep-build-dirs",
            ])],
            Phase::BuildApplication => self
                .configure_step()
                .into_iter()
                .chain(self.compile_and_install_steps())
                .map(|argv| self.in_build_env(argv))
                .collect(),
            Phase::Rebuild => self
                .compile_and_install_steps()
                .into_iter()
                .map(|argv| self.in_build_env(argv))
                .collect(),
            Phase::Run => vec![self
                .flatpak()
                .args(["build", "--with-appdir", "--allow=devel"])
                .args(config.finish_args.iter().cloned())
                .arg(build_dir.clone())
                .arg(config.command.clone())],
            Phase::Export => {
                let repo_dir = self.repo_dir.display().to_string();
                let bundle = config.resolve(&config.bundle()).display().to_string();
                vec![
                    self.flatpak()
                        .arg("build-finish")
                        .args(config.finish_args.iter().cloned())
                        .arg(format!("--command={}", config.command))
                        .arg(build_dir.clone()),
                    self.flatpak().args(["build-export", repo_dir.as_str(), build_dir.as_str()]),
                    self.flatpak().args([
                        "build-bundle",
                        repo_dir.as_str(),
                        bundle.as_str(),
                        config.id.as_str(),
                    ]),
                ]
            }
            Phase::Clean => Vec::new(),
        };

        Ok(commands)
    }

    fn clean_paths(&self) -> Vec<PathBuf> {
        vec![
            self.build_dir.clone(),
            self.workspace.join(BUILD_SUBDIR),
            self.state_dir.clone(),
        ]
    }
}
