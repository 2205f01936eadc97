//! Sequential command runner
//!
//! The runner owns at most one session at a time. A session executes an
//! ordered list of commands against the output sink, one process at a time,
//! and resolves every completion ticket handed out for it with the same
//! [`PhaseOutcome`].

use crate::core::{FailureReport, Phase, PhaseOutcome, PipelineError};
use crate::output::OutputSink;
use crate::process::{Command, ExitStatus, ProcessEvent, ProcessKiller};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events published while the runner works
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    SessionStarted {
        session_id: Uuid,
        phase: Phase,
    },
    CommandStarted {
        phase: Phase,
        command: Command,
    },
    /// Every command of the session succeeded, or the session was stopped
    /// to make way for a target switch
    Finished {
        phase: Phase,
        aborted_for_restore: bool,
    },
    Failed(FailureReport),
}

/// Ticket resolved when the session it was issued for ends
#[derive(Debug)]
pub struct Completion {
    phase: Phase,
    receiver: oneshot::Receiver<PhaseOutcome>,
}

impl Completion {
    fn resolved(phase: Phase, outcome: PhaseOutcome) -> Self {
        let (tx, receiver) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { phase, receiver }
    }

    /// Phase tag of the session this ticket belongs to
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn wait(self) -> PhaseOutcome {
        self.receiver.await.unwrap_or(PhaseOutcome::Cancelled)
    }
}

struct Session {
    id: Uuid,
    phase: Phase,
    commands: Vec<Command>,
    cursor: usize,
    current_process: Option<ProcessKiller>,
    /// Set by `stop`; the session ends at the next opportunity
    restoring: bool,
    /// Held by in-process work that spawns nothing; see [`Runner::exclusive`]
    exclusive: bool,
    waiters: Vec<oneshot::Sender<PhaseOutcome>>,
}

impl Session {
    fn resolve(self, outcome: PhaseOutcome) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Executes command lists one process at a time
///
/// Cloning yields another handle to the same runner.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    sink: OutputSink,
    session: Mutex<Option<Session>>,
    active: watch::Sender<Option<Phase>>,
    failed: AtomicBool,
    /// Latched by `interrupt`; no session starts afterwards
    interrupted: AtomicBool,
    events: broadcast::Sender<RunnerEvent>,
}

impl Runner {
    pub fn new(sink: OutputSink) -> Self {
        let (active, _) = watch::channel(None);
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RunnerInner {
                sink,
                session: Mutex::new(None),
                active,
                failed: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn sink(&self) -> &OutputSink {
        &self.inner.sink
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active_phase().is_some()
    }

    pub fn active_phase(&self) -> Option<Phase> {
        *self.inner.active.borrow()
    }

    /// Whether the last session ended with a failed command
    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    /// Whether the operator interrupted this runner
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Command at the cursor of the running session
    pub async fn current(&self) -> Option<Command> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|s| s.commands.get(s.cursor).cloned())
    }

    pub fn ensure_idle(&self) -> Result<(), PipelineError> {
        match self.active_phase() {
            Some(active) => Err(PipelineError::ConcurrentPipeline { active }),
            None => Ok(()),
        }
    }

    /// Start a new session, failing if one is already running
    pub async fn start(&self, commands: Vec<Command>, phase: Phase) -> Result<Completion, PipelineError> {
        let mut slot = self.inner.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Err(PipelineError::ConcurrentPipeline {
                active: session.phase,
            });
        }
        Ok(self.begin(&mut slot, commands, phase))
    }

    /// Start a session, or append to the running one
    ///
    /// Appended commands run after everything already queued and keep the
    /// running session's phase tag. Nothing can be appended while the runner
    /// is held by [`Runner::exclusive`].
    pub async fn execute(&self, commands: Vec<Command>, phase: Phase) -> Result<Completion, PipelineError> {
        let mut slot = self.inner.session.lock().await;
        match slot.as_mut() {
            Some(session) if session.exclusive => Err(PipelineError::ConcurrentPipeline {
                active: session.phase,
            }),
            Some(session) => Ok(Self::append(session, commands)),
            None => Ok(self.begin(&mut slot, commands, phase)),
        }
    }

    /// Append to the running session only if its phase is accepted
    ///
    /// The check and the append happen under one lock, so a session that
    /// ends in between never picks up the commands. `None` when no matching
    /// session is running.
    pub async fn append_if<F>(&self, commands: Vec<Command>, accepts: F) -> Option<Completion>
    where
        F: FnOnce(Phase) -> bool,
    {
        let mut slot = self.inner.session.lock().await;
        let session = slot
            .as_mut()
            .filter(|s| !s.exclusive && !s.restoring && !self.is_interrupted())?;
        if !accepts(session.phase) {
            return None;
        }
        Some(Self::append(session, commands))
    }

    fn append(session: &mut Session, commands: Vec<Command>) -> Completion {
        debug!(
            "Queuing {} command(s) onto running {} session",
            commands.len(),
            session.phase
        );
        session.commands.extend(commands);
        let (tx, receiver) = oneshot::channel();
        session.waiters.push(tx);
        Completion {
            phase: session.phase,
            receiver,
        }
    }

    /// Hold the runner under `phase` while `work` runs in-process
    ///
    /// Other operations see the runner as busy until `work` resolves. The
    /// future must be driven to completion.
    pub async fn exclusive<W, T>(&self, phase: Phase, work: W) -> Result<T, PipelineError>
    where
        W: Future<Output = T>,
    {
        let id = {
            let mut slot = self.inner.session.lock().await;
            if let Some(session) = slot.as_ref() {
                return Err(PipelineError::ConcurrentPipeline {
                    active: session.phase,
                });
            }
            let id = Uuid::new_v4();
            *slot = Some(Session {
                id,
                phase,
                commands: Vec::new(),
                cursor: 0,
                current_process: None,
                restoring: false,
                exclusive: true,
                waiters: Vec::new(),
            });
            self.inner.active.send_replace(Some(phase));
            id
        };
        debug!("Holding runner for {} ({})", phase, id);

        let result = work.await;

        let mut slot = self.inner.session.lock().await;
        if slot.as_ref().is_some_and(|s| s.id == id) {
            self.take(&mut slot);
        }
        Ok(result)
    }

    /// Operator cancel for the rest of this runner's life
    ///
    /// Closes the sink, kills the running process and makes every later
    /// `start`/`execute` resolve to `Cancelled` without spawning anything.
    pub async fn interrupt(&self) {
        if !self.inner.interrupted.swap(true, Ordering::SeqCst) {
            info!("Interrupted, no further commands will run");
        }
        self.inner.sink.close();

        let slot = self.inner.session.lock().await;
        if let Some(process) = slot.as_ref().and_then(|s| s.current_process.as_ref()) {
            process.kill();
        }
    }

    /// Abort the running session ahead of a target switch
    ///
    /// Returns once the runner is idle; `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        {
            let mut slot = self.inner.session.lock().await;
            let Some(session) = slot.as_mut() else {
                return false;
            };
            info!("Stopping {} session {}", session.phase, session.id);
            session.restoring = true;
            if let Some(process) = &session.current_process {
                process.kill();
            }
        }

        let mut active = self.inner.active.subscribe();
        let _ = active.wait_for(|phase| phase.is_none()).await;
        true
    }

    fn begin(&self, slot: &mut Option<Session>, commands: Vec<Command>, phase: Phase) -> Completion {
        if self.is_interrupted() {
            debug!("Interrupted, not starting {}", phase);
            return Completion::resolved(phase, PhaseOutcome::Cancelled);
        }
        if commands.is_empty() {
            debug!("No commands for {}, nothing to run", phase);
            self.inner.failed.store(false, Ordering::SeqCst);
            self.emit(RunnerEvent::Finished {
                phase,
                aborted_for_restore: false,
            });
            return Completion::resolved(phase, PhaseOutcome::Completed);
        }

        let id = Uuid::new_v4();
        let (tx, receiver) = oneshot::channel();
        info!("Starting {} session {} with {} command(s)", phase, id, commands.len());

        *slot = Some(Session {
            id,
            phase,
            commands,
            cursor: 0,
            current_process: None,
            restoring: false,
            exclusive: false,
            waiters: vec![tx],
        });
        self.inner.failed.store(false, Ordering::SeqCst);
        self.inner.active.send_replace(Some(phase));
        self.emit(RunnerEvent::SessionStarted { session_id: id, phase });

        tokio::spawn(self.clone().drive(id));

        Completion { phase, receiver }
    }

    async fn drive(self, id: Uuid) {
        let sink = self.inner.sink.clone();
        let shown = match sink.show().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Output surface unavailable, output is discarded: {}", e);
                false
            }
        };

        loop {
            let (command, phase) = {
                let mut slot = self.inner.session.lock().await;
                let Some(session) = slot.as_mut().filter(|s| s.id == id) else {
                    return;
                };
                // Checked after `show`, which may have reopened a sink the
                // operator closed
                if session.restoring || self.is_interrupted() {
                    self.abort(&mut slot);
                    return;
                }
                let Some(command) = session.commands.get(session.cursor).cloned() else {
                    self.complete(&mut slot);
                    return;
                };
                (command, session.phase)
            };

            sink.append_status_line(&command.to_string());
            self.emit(RunnerEvent::CommandStarted {
                phase,
                command: command.clone(),
            });

            let mut handle = match command.spawn() {
                Ok(handle) => handle,
                Err(e) => {
                    let message = e.to_string();
                    self.fail(id, command, None, message).await;
                    return;
                }
            };
            let killer = handle.killer();

            {
                let mut slot = self.inner.session.lock().await;
                match slot.as_mut().filter(|s| s.id == id) {
                    Some(session) => {
                        if session.restoring || self.is_interrupted() {
                            killer.kill();
                        }
                        session.current_process = Some(killer.clone());
                    }
                    None => {
                        killer.kill();
                        return;
                    }
                }
            }
            debug!("Running `{}` (pid {:?})", command, handle.pid());

            let mut cancelled = false;
            let status = loop {
                tokio::select! {
                    event = handle.next_event() => match event {
                        Some(ProcessEvent::Output { chunk, .. }) => sink.append_raw(&chunk),
                        Some(ProcessEvent::Exited(status)) => break status,
                        None => break ExitStatus::killed(),
                    },
                    _ = sink.closed(), if shown && !cancelled => {
                        info!("Output closed, killing `{}`", command);
                        cancelled = true;
                        killer.kill();
                    }
                }
            };

            let mut slot = self.inner.session.lock().await;
            let Some(session) = slot.as_mut().filter(|s| s.id == id) else {
                return;
            };
            session.current_process = None;

            if status.was_killed() {
                self.abort(&mut slot);
                return;
            }
            if status.success() {
                session.cursor += 1;
                continue;
            }
            drop(slot);

            let code = status.code();
            let message = format!("Command failed with exit code {}: {}", code, command);
            self.fail(id, command, Some(code), message).await;
            return;
        }
    }

    fn take(&self, slot: &mut Option<Session>) -> Option<Session> {
        let session = slot.take();
        self.inner.active.send_replace(None);
        session
    }

    fn complete(&self, slot: &mut Option<Session>) {
        if let Some(session) = self.take(slot) {
            info!("{} session {} finished", session.phase, session.id);
            self.emit(RunnerEvent::Finished {
                phase: session.phase,
                aborted_for_restore: false,
            });
            session.resolve(PhaseOutcome::Completed);
        }
    }

    /// End the session without a failure; only a stop is announced
    fn abort(&self, slot: &mut Option<Session>) {
        let Some(session) = self.take(slot) else {
            return;
        };
        self.inner.failed.store(false, Ordering::SeqCst);
        if session.restoring {
            info!("{} session {} stopped", session.phase, session.id);
            self.emit(RunnerEvent::Finished {
                phase: session.phase,
                aborted_for_restore: true,
            });
        } else {
            info!("{} session {} cancelled", session.phase, session.id);
        }
        session.resolve(PhaseOutcome::Cancelled);
    }

    async fn fail(&self, id: Uuid, command: Command, exit_code: Option<i32>, message: String) {
        let mut slot = self.inner.session.lock().await;
        if !slot.as_ref().is_some_and(|s| s.id == id) {
            return;
        }
        let Some(session) = self.take(&mut slot) else {
            return;
        };

        error!("{} failed: {}", session.phase, message);
        self.inner.failed.store(true, Ordering::SeqCst);
        self.inner.sink.append_error_line(&message);

        let report = FailureReport {
            phase: session.phase,
            command,
            exit_code,
            message,
        };
        self.emit(RunnerEvent::Failed(report.clone()));
        session.resolve(PhaseOutcome::Failed(report));
    }

    fn emit(&self, event: RunnerEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }
}
