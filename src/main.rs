use anyhow::{Context, Result};
use flatpak_pipeline::cli::commands::{Operation, ScriptCommand, StatusCommand};
use flatpak_pipeline::cli::output::*;
use flatpak_pipeline::cli::{Cli, Command};
use flatpak_pipeline::core::config::{PipelineConfig, DEFAULT_CONFIG_FILE};
use flatpak_pipeline::output::TerminalSurface;
use flatpak_pipeline::process::{CommandVersionProbe, ToolVersion};
use semver::Version;
use flatpak_pipeline::{
    BuildDescriptor, FlatpakDescriptor, InMemoryStateStore, OutputSink, Phase, Pipeline, Runner, StateStore, TargetSelector,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Oldest flatpak known to support `build --with-appdir`
const MINIMUM_FLATPAK: Version = Version::new(1, 0, 0);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; stdout belongs to the build output
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load build config {}", config_path.display()))?;
    let policy = config.policy();
    let sandboxed = config.sandboxed();

    let store = open_store(&cli).await?;
    let sink = OutputSink::new(Arc::new(TerminalSurface::new()));
    let runner = Runner::new(sink.clone());
    let descriptor = FlatpakDescriptor::new(config);

    TargetSelector::new(store.clone(), runner.clone())
        .select(descriptor.target_id())
        .await
        .context("Failed to select build target")?;

    match &cli.command {
        // Script generation needs no pipeline
        Command::Script(cmd) => write_script(&descriptor, cmd).await,
        Command::Status(cmd) => {
            let pipeline = Pipeline::load(descriptor, runner, store)
                .await
                .context("Failed to load build progress")?;
            show_status(&pipeline, cmd, sandboxed).await
        }
        Command::Operation(operation) => {
            let pipeline = Pipeline::load(descriptor, runner, store)
                .await
                .context("Failed to load build progress")?
                .with_policy(policy);
            run_operation(*operation, pipeline, sink).await
        }
    }
}

async fn run_operation(
    operation: Operation,
    pipeline: Pipeline<FlatpakDescriptor>,
    sink: OutputSink,
) -> Result<()> {
    // The first Ctrl-C cancels the running phase and every later one; a
    // second one gives up on waiting
    let runner = pipeline.runner().clone();
    tokio::spawn(async move {
        let mut interrupts = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            interrupts += 1;
            if interrupts > 1 {
                warn!("Interrupted again, exiting");
                std::process::exit(130);
            }
            runner.interrupt().await;
        }
    });

    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Some(line) = format_pipeline_event(&event) {
                println!("{}", line);
            }
        }
    });

    let label = operation.label();
    let result = match operation {
        Operation::Init => pipeline.initialize_build().await,
        Operation::UpdateDeps => pipeline.update_dependencies().await,
        Operation::BuildDeps => pipeline.build_dependencies().await,
        Operation::Build => pipeline.build().await,
        Operation::Rebuild => pipeline.request_rebuild().await,
        Operation::Run => pipeline.run().await,
        Operation::Export => pipeline.export().await,
        Operation::Clean => pipeline.clean().await,
    };

    drop(pipeline);
    let _ = printer.await;
    sink.dispose();

    let outcome = result.with_context(|| format!("{} could not run", label))?;
    if !outcome.is_skipped() {
        println!("\n{}", format_outcome(label, &outcome));
    }
    if outcome.halts_pipeline() {
        std::process::exit(1);
    }

    Ok(())
}

async fn open_store(cli: &Cli) -> Result<Arc<dyn StateStore>> {
    if cli.no_persist {
        return Ok(Arc::new(InMemoryStateStore::new()));
    }
    open_persistent_store(cli.state.as_deref()).await
}

#[cfg(feature = "sqlite")]
async fn open_persistent_store(path: Option<&Path>) -> Result<Arc<dyn StateStore>> {
    use flatpak_pipeline::persistence::SqliteStateStore;

    let store = match path {
        Some(path) => SqliteStateStore::open(path).await?,
        None => SqliteStateStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_persistent_store(_path: Option<&Path>) -> Result<Arc<dyn StateStore>> {
    warn!("Built without sqlite support, progress is not persisted");
    Ok(Arc::new(InMemoryStateStore::new()))
}

async fn show_status(
    pipeline: &Pipeline<FlatpakDescriptor>,
    cmd: &StatusCommand,
    sandboxed: bool,
) -> Result<()> {
    let progress = pipeline.progress().await;
    let target = pipeline.descriptor().target_id();

    let flatpak = ToolVersion::new(CommandVersionProbe::flatpak(sandboxed));
    let version = match flatpak.get().await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("Could not determine flatpak version: {}", e);
            None
        }
    };
    // Cached by now, so this does not probe again
    let supported = match version {
        Some(_) => flatpak.at_least(&MINIMUM_FLATPAK).await.ok(),
        None => None,
    };

    if cmd.json {
        let data = serde_json::json!({
            "target": target,
            "progress": progress,
            "flatpak_version": version.as_ref().map(|v| v.to_string()),
            "flatpak_supported": supported,
            "sandboxed": sandboxed,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Build target: {}", INFO, style(target).bold());
    match &version {
        Some(version) if supported == Some(false) => println!(
            "  {}flatpak {} is older than {}",
            WARN,
            style(version).yellow(),
            MINIMUM_FLATPAK
        ),
        Some(version) => println!("  flatpak {}", style(version).cyan()),
        None => println!("  {}flatpak not found", WARN),
    }
    if sandboxed {
        println!("  {}", style("commands run on the host via flatpak-spawn").dim());
    }
    println!("{}", format_progress(&progress));

    Ok(())
}

async fn write_script(descriptor: &FlatpakDescriptor, cmd: &ScriptCommand) -> Result<()> {
    let phase = Phase::from(cmd.phase);
    let commands = descriptor.commands(phase)?;
    let command = commands.get(cmd.index).with_context(|| {
        format!(
            "{} has {} command(s), no command at index {}",
            phase,
            commands.len(),
            cmd.index
        )
    })?;

    command.materialize_as_script(&cmd.output).await?;
    println!(
        "{} Wrote {} to {}",
        CHECK,
        style(command).dim(),
        style(cmd.output.display()).bold()
    );
    Ok(())
}
