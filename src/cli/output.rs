//! CLI output formatting

use crate::core::{PhaseOutcome, PipelineEvent, Progress};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format one progress flag
pub fn format_flag(name: &str, set: bool) -> String {
    if set {
        format!("  {}{}", CHECK, style(name).green())
    } else {
        format!("  {}{}", style("· ").dim(), style(name).dim())
    }
}

/// Format all progress flags, one per line, in phase order
pub fn format_progress(progress: &Progress) -> String {
    [
        format_flag("initialized", progress.initialized),
        format_flag("dependencies updated", progress.dependencies_updated),
        format_flag("dependencies built", progress.dependencies_built),
        format_flag("application built", progress.application_built),
    ]
    .join("\n")
}

/// Format the final outcome of a command
pub fn format_outcome(label: &str, outcome: &PhaseOutcome) -> String {
    match outcome {
        PhaseOutcome::Completed => format!(
            "{} {} completed {}",
            CHECK,
            style(label).bold(),
            style("successfully").green()
        ),
        PhaseOutcome::Skipped { reason } => {
            format!("{} {}: nothing to do ({})", INFO, style(label).bold(), style(reason).dim())
        }
        PhaseOutcome::Failed(report) => format!(
            "{} {} {} during {}: {}",
            CROSS,
            style(label).bold(),
            style("failed").red(),
            style(report.phase).cyan(),
            style(&report.message).dim()
        ),
        PhaseOutcome::Cancelled => {
            format!("{} {} {}", WARN, style(label).bold(), style("cancelled").yellow())
        }
    }
}

/// Format a pipeline event for display; progress changes are not shown
pub fn format_pipeline_event(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::Initialized { target } => Some(format!(
            "{} Initialized build environment for {}",
            ROCKET,
            style(target).bold()
        )),
        PipelineEvent::PhaseSkipped { phase, reason } => Some(format!(
            "{} Skipping {}: {}",
            INFO,
            style(phase).cyan(),
            style(reason).dim()
        )),
        PipelineEvent::RebuildQueued => Some(format!(
            "{} Rebuild queued behind the running build",
            INFO
        )),
        PipelineEvent::ProgressChanged(_) => None,
    }
}
