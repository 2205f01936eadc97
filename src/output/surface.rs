//! Display surfaces the output sink writes to

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// An external text display (terminal, log viewer, buffer)
///
/// Opening is asynchronous: `open` resolves once the surface accepts writes.
#[async_trait]
pub trait OutputSurface: Send + Sync {
    async fn open(&self) -> io::Result<()>;

    fn write(&self, text: &str);

    fn close(&self);
}

/// Writes to the process's stdout
#[derive(Debug, Default)]
pub struct TerminalSurface;

impl TerminalSurface {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputSurface for TerminalSurface {
    async fn open(&self) -> io::Result<()> {
        io::stdout().flush()
    }

    fn write(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn close(&self) {
        let _ = io::stdout().flush();
    }
}

/// In-memory surface, useful for tests and for capturing a run
#[derive(Debug, Default)]
pub struct BufferSurface {
    contents: Mutex<String>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    ready_delay: Option<Duration>,
}

impl BufferSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a surface that takes a while to become ready
    pub fn with_ready_delay(delay: Duration) -> Self {
        Self {
            ready_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn contents(&self) -> String {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputSurface for BufferSurface {
    async fn open(&self) -> io::Result<()> {
        if let Some(delay) = self.ready_delay {
            tokio::time::sleep(delay).await;
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&self, text: &str) {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
