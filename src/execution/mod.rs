//! Command execution

pub mod runner;

pub use runner::{Completion, Runner, RunnerEvent};
