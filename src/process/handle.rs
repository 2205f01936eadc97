//! Supervision of a spawned OS process

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// Exit code reported when the process was killed rather than exiting
pub const KILLED_EXIT_CODE: i32 = -1;

/// Which pipe a chunk of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Terminal status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: i32,
    killed: bool,
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code, killed: false }
    }

    pub fn killed() -> Self {
        Self {
            code: KILLED_EXIT_CODE,
            killed: true,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn was_killed(&self) -> bool {
        self.killed
    }

    pub fn success(&self) -> bool {
        !self.killed && self.code == 0
    }
}

/// Events emitted by a [`ProcessHandle`]
///
/// Every `Output` event is delivered before the single `Exited` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output { stream: StreamKind, chunk: String },
    Exited(ExitStatus),
}

/// Cloneable kill switch for a running process
///
/// Killing an already exited process is a no-op.
#[derive(Debug, Clone)]
pub struct ProcessKiller {
    signal: Arc<Notify>,
}

impl ProcessKiller {
    pub fn kill(&self) {
        self.signal.notify_one();
    }
}

/// Handle to a spawned process
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    events: mpsc::Receiver<ProcessEvent>,
    killer: ProcessKiller,
}

impl ProcessHandle {
    /// Take ownership of a child whose stdout/stderr are piped
    pub(crate) fn supervise(mut child: Child) -> Self {
        let pid = child.id();
        let (tx, events) = mpsc::channel(256);
        let signal = Arc::new(Notify::new());

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward(stdout, StreamKind::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward(stderr, StreamKind::Stderr, tx.clone())));
        }

        let kill_signal = signal.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_signal.notified() => None,
            };

            // A background child may keep the pipes open after the process
            // itself exited, so a kill must still be honored while draining
            let killed = match exited {
                None => true,
                Some(_) => {
                    let drain = async {
                        for reader in readers.iter_mut() {
                            let _ = reader.await;
                        }
                    };
                    tokio::select! {
                        _ = drain => false,
                        _ = kill_signal.notified() => true,
                    }
                }
            };

            let status = if killed {
                kill_group(pid);
                if exited.is_none() {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill process {:?}: {}", pid, e);
                    }
                }
                for reader in &readers {
                    reader.abort();
                }
                ExitStatus::killed()
            } else {
                match exited {
                    Some(Ok(status)) => ExitStatus::from_code(status.code().unwrap_or(KILLED_EXIT_CODE)),
                    Some(Err(e)) => {
                        warn!("Failed to collect exit status of {:?}: {}", pid, e);
                        ExitStatus::from_code(KILLED_EXIT_CODE)
                    }
                    None => ExitStatus::killed(),
                }
            };

            debug!("Process {:?} finished: {:?}", pid, status);
            let _ = tx.send(ProcessEvent::Exited(status)).await;
        });

        Self {
            pid,
            events,
            killer: ProcessKiller { signal },
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn killer(&self) -> ProcessKiller {
        self.killer.clone()
    }

    pub fn kill(&self) {
        self.killer.kill();
    }

    /// Next output chunk or the terminal exit event; `None` once exhausted
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    /// Discard remaining output and wait for the exit status
    pub async fn wait(mut self) -> ExitStatus {
        while let Some(event) = self.next_event().await {
            if let ProcessEvent::Exited(status) = event {
                return status;
            }
        }
        ExitStatus::killed()
    }
}

/// SIGKILL the process group led by `pid`, taking spawned helpers down too
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        // ESRCH once every member is gone
        debug!("Could not signal process group {}: {}", pid, e);
    }
}

async fn forward<R>(mut reader: R, stream: StreamKind, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Stopped reading {:?}: {}", stream, e);
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        // Hold back an incomplete UTF-8 sequence until the next read
        let valid = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.len(),
        };
        if valid == 0 {
            continue;
        }
        let chunk = String::from_utf8_lossy(&pending[..valid]).into_owned();
        pending.drain(..valid);

        if tx.send(ProcessEvent::Output { stream, chunk }).await.is_err() {
            return;
        }
    }

    if !pending.is_empty() {
        let chunk = String::from_utf8_lossy(&pending).into_owned();
        let _ = tx.send(ProcessEvent::Output { stream, chunk }).await;
    }
}
