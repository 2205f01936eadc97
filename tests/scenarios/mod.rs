//! Scenario-based tests for flatpak-pipeline

mod cancellation;
mod clean;
mod failure_handling;
mod ordering;
mod target_switch;
