//! Line-oriented output sink shared by the runner and its commands

use crate::output::{OutputSurface, SinkError};
use console::style;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

/// Lifecycle of the sink's display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Not attached; `show` opens it
    Closed,
    /// Accepting writes
    Open,
    /// Released for good
    Disposed,
}

/// Append-only text sink in front of an [`OutputSurface`]
///
/// Cloning shares the same surface and state.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    surface: Arc<dyn OutputSurface>,
    state: watch::Sender<SinkState>,
    opening: Mutex<()>,
}

impl OutputSink {
    pub fn new(surface: Arc<dyn OutputSurface>) -> Self {
        let (state, _) = watch::channel(SinkState::Closed);
        Self {
            inner: Arc::new(SinkInner {
                surface,
                state,
                opening: Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> SinkState {
        *self.inner.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SinkState::Open
    }

    /// Open the surface if needed, resolving once it is ready for writes
    pub async fn show(&self) -> Result<(), SinkError> {
        let _opening = self.inner.opening.lock().await;
        match self.state() {
            SinkState::Open => return Ok(()),
            SinkState::Disposed => return Err(SinkError::Disposed),
            SinkState::Closed => {}
        }

        self.inner.surface.open().await?;
        self.inner.state.send_replace(SinkState::Open);
        debug!("Output surface ready");
        Ok(())
    }

    /// Forward text verbatim
    pub fn append_raw(&self, text: &str) {
        if self.is_open() {
            self.inner.surface.write(text);
        } else {
            debug!("Dropping {} bytes written to a closed sink", text.len());
        }
    }

    /// Operator-facing banner, visually distinct from process output
    pub fn append_status_line(&self, message: &str) {
        let line = style(format!("> {} <", message)).bold().force_styling(true);
        self.append_raw(&format!("{}\n", line));
    }

    pub fn append_error_line(&self, message: &str) {
        let line = style(format!("> {} <", message))
            .red()
            .bold()
            .force_styling(true);
        self.append_raw(&format!("{}\n", line));
    }

    /// The user closed the display; kills whatever is running
    pub fn close(&self) {
        let was_open = self
            .inner
            .state
            .send_if_modified(|state| match state {
                SinkState::Open => {
                    *state = SinkState::Closed;
                    true
                }
                _ => false,
            });
        if was_open {
            info!("Output surface closed");
            self.inner.surface.close();
        }
    }

    /// Release the surface; later calls do nothing
    pub fn dispose(&self) {
        let previous = self.inner.state.send_replace(SinkState::Disposed);
        if previous == SinkState::Open {
            self.inner.surface.close();
        }
    }

    /// Resolves when the sink stops being open
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s != SinkState::Open).await;
    }
}
