//! Output sink and display surfaces
//!
//! The [`OutputSink`] is the single place commands and the runner write to.
//! It forwards text to an [`OutputSurface`] such as the terminal, and its
//! closure is the cancellation signal for the active process.

pub mod sink;
pub mod surface;

use thiserror::Error;

pub use sink::{OutputSink, SinkState};
pub use surface::{BufferSurface, OutputSurface, TerminalSurface};

/// Error types for the output sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Output surface failed to open: {0}")]
    Open(#[from] std::io::Error),

    #[error("Output sink has been disposed")]
    Disposed,
}
