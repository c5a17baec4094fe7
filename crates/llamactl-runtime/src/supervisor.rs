//! Process supervisor.
//!
//! Owns at most one llama-server process and drives it through
//! `Idle → Starting → Running → Stopping → Idle`, with `Crashed` when the
//! process exits on its own. Public operations never await the child; the
//! output relay, health monitor and shutdown escalator run as background
//! tasks and report back through [`SupervisorEvent`]s.
//!
//! Every successful `start` opens a new run. Background tasks carry their
//! run id and are ignored once the supervisor has moved on to another run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use llamactl_core::{
    HealthVerdict, LaunchSpec, OutputEvent, ShutdownOutcome, StateSnapshot, SupervisorError,
    SupervisorEvent, SupervisorResult, SupervisorState, render_command_line,
};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcaster::EventBroadcaster;
use crate::config::SupervisorConfig;
use crate::escalator::ShutdownEscalator;
use crate::health::HealthMonitor;
use crate::output_log::OutputLog;
use crate::process::{ProcessHandle, SpawnedServer, exit_code, spawn_server};
use crate::relay::{OutputRelay, RelayEnd};

/// Supervises a single llama-server process.
///
/// Cheap to clone; clones share the same process and state.
#[derive(Debug, Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    config: SupervisorConfig,
    inner: Mutex<Inner>,
    events: EventBroadcaster,
    output: OutputLog,
}

#[derive(Debug, Default)]
struct Inner {
    state: SupervisorState,
    last_exit_code: Option<i32>,
    command_line: Option<String>,
    run_id: u64,
    active: Option<ActiveRun>,
}

/// Everything tied to the live process of one run.
#[derive(Debug)]
struct ActiveRun {
    id: u64,
    handle: Arc<ProcessHandle>,
    relay_cancel: CancellationToken,
    relay_task: Option<JoinHandle<()>>,
    /// Cancels the health monitor, then the escalator once stopping.
    poller_cancel: CancellationToken,
    runtime: Handle,
}

impl Inner {
    fn owns(&self, run_id: u64, state: SupervisorState) -> bool {
        self.state == state && self.active.as_ref().is_some_and(|run| run.id == run_id)
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                events: EventBroadcaster::new(config.event_capacity),
                output: OutputLog::new(config.output_log_capacity),
                inner: Mutex::new(Inner::default()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Validate `spec`, spawn the server and begin observing it.
    ///
    /// Returns once the process is spawned; the outcome of startup arrives
    /// later as a [`SupervisorEvent::Verdict`]. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` unless the state is `Idle` or `Crashed`; state is
    ///   left unchanged.
    /// - `Validation` for the first failed precondition of `spec`.
    /// - `Spawn` if the OS refused to create the process; state becomes
    ///   `Idle`.
    pub fn start(&self, spec: &LaunchSpec) -> SupervisorResult<()> {
        let shared = &self.shared;
        let mut inner = shared.lock();

        if !inner.state.can_start() {
            return Err(SupervisorError::AlreadyRunning { state: inner.state });
        }
        spec.validate()?;

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                return Err(shared.spawn_failed(&mut inner, spec, std::io::Error::other(e)));
            }
        };

        let command_line = render_command_line(spec);
        info!(command = %command_line, "Starting server with command");

        let SpawnedServer {
            handle,
            stdout,
            stderr,
        } = match spawn_server(spec) {
            Ok(spawned) => spawned,
            Err(source) => return Err(shared.spawn_failed(&mut inner, spec, source)),
        };

        inner.run_id += 1;
        let run_id = inner.run_id;
        let handle = Arc::new(handle);
        info!(pid = ?handle.pid(), run_id, "Server process spawned");

        inner.state = SupervisorState::Starting;
        inner.last_exit_code = None;
        inner.command_line = Some(command_line);
        shared.output.clear();
        shared.emit(SupervisorEvent::state_changed(SupervisorState::Starting, None));

        let relay_cancel = CancellationToken::new();
        let relay = OutputRelay::new(Arc::clone(&handle), stdout, stderr)
            .with_poll_timeout(shared.config.relay_poll)
            .with_drain_timeout(shared.config.relay_drain);
        let relay_task = runtime.spawn(run_relay(
            Arc::clone(shared),
            run_id,
            relay,
            relay_cancel.clone(),
        ));

        let poller_cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(Arc::clone(&handle), shared.config.health);
        runtime.spawn(run_health_monitor(
            Arc::clone(shared),
            run_id,
            monitor,
            poller_cancel.clone(),
        ));

        inner.active = Some(ActiveRun {
            id: run_id,
            handle,
            relay_cancel,
            relay_task: Some(relay_task),
            poller_cancel,
            runtime,
        });

        Ok(())
    }

    /// Ask the server to exit.
    ///
    /// Stops the output relay, cancels the health monitor, sends the
    /// terminate signal and starts the escalation. The result arrives as a
    /// [`SupervisorEvent::Shutdown`].
    ///
    /// # Errors
    ///
    /// `NotRunning` unless the state is `Starting` or `Running`. A process
    /// found to have exited already is recorded as crashed first, and the
    /// error carries `Crashed`.
    pub fn stop(&self) -> SupervisorResult<()> {
        let shared = &self.shared;
        let mut inner = shared.lock();
        let state = inner.state;

        if !state.can_stop() {
            return Err(SupervisorError::NotRunning { state });
        }
        let Some(run) = inner.active.as_mut() else {
            return Err(SupervisorError::NotRunning { state });
        };

        if let Ok(Some(status)) = run.handle.try_exit() {
            let code = exit_code(status);
            let run_id = run.id;
            debug!(run_id, exit_code = code, "Stop requested after server exited");
            // The relay drains and finishes on its own
            if let Some(run) = shared.record_crash(&mut inner, run_id, code) {
                run.poller_cancel.cancel();
            }
            return Err(SupervisorError::NotRunning { state: inner.state });
        }

        run.relay_cancel.cancel();
        run.poller_cancel.cancel();

        let pid = run.handle.pid();
        info!(?pid, "Stopping server");
        match run.handle.terminate() {
            Ok(true) => debug!(?pid, "Sent terminate signal"),
            Ok(false) => debug!(?pid, "Server already exited before terminate"),
            Err(e) => warn!(?pid, error = %e, "Failed to send terminate signal"),
        }

        let escalator_cancel = CancellationToken::new();
        run.poller_cancel = escalator_cancel.clone();
        let escalator = ShutdownEscalator::new(
            Arc::clone(&run.handle),
            shared.config.grace,
            shared.config.kill_settle,
        );
        run.runtime.spawn(run_escalation(
            Arc::clone(shared),
            run.id,
            escalator,
            escalator_cancel,
        ));

        inner.state = SupervisorState::Stopping;
        shared.emit(SupervisorEvent::state_changed(SupervisorState::Stopping, None));

        Ok(())
    }

    /// Force-kill the server, if any, for application exit.
    ///
    /// Unlike [`stop`](Self::stop) there is no grace window. Any stop already
    /// in progress is superseded. Does nothing when no process is owned.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let run = {
            let mut inner = shared.lock();
            let Some(run) = inner.active.take() else {
                return;
            };
            if inner.state != SupervisorState::Stopping {
                inner.state = SupervisorState::Stopping;
                shared.emit(SupervisorEvent::state_changed(SupervisorState::Stopping, None));
            }
            run
        };

        run.poller_cancel.cancel();
        let pid = run.handle.pid();
        warn!(?pid, "Killing server on shutdown");
        if let Err(e) = run.handle.kill() {
            warn!(?pid, error = %e, "Failed to kill server");
        }
        sleep(shared.config.kill_settle).await;

        let exit_code = match run.handle.try_exit() {
            Ok(status) => status.map(exit_code),
            Err(_) => None,
        };
        let outcome = ShutdownOutcome::StoppedForcibly { exit_code };

        {
            let mut inner = shared.lock();
            inner.state = SupervisorState::Idle;
            inner.last_exit_code = exit_code;
            shared.emit(SupervisorEvent::Shutdown(outcome));
            shared.emit(SupervisorEvent::state_changed(SupervisorState::Idle, exit_code));
        }

        shared.release(run, true).await;
    }

    /// Current state, last exit code and live pid. Never waits on the child.
    pub fn query_state(&self) -> StateSnapshot {
        let inner = self.shared.lock();
        StateSnapshot {
            state: inner.state,
            last_exit_code: inner.last_exit_code,
            pid: inner.active.as_ref().and_then(|run| run.handle.pid()),
            command_line: inner.command_line.clone(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.shared.lock().state
    }

    /// Subscribe to lifecycle and output events.
    ///
    /// Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.shared.events.subscribe()
    }

    /// Buffered output of the current or most recent run, oldest first.
    pub fn recent_output(&self) -> Vec<OutputEvent> {
        self.shared.output.snapshot()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the state lock, so events go out in transition order.
    fn emit(&self, event: SupervisorEvent) {
        self.events.broadcast(event);
    }

    /// Stop the pollers and join the relay with a bounded wait.
    ///
    /// With `cancel_relay` unset the relay may finish draining output of an
    /// exited process first.
    async fn release(&self, mut run: ActiveRun, cancel_relay: bool) {
        run.poller_cancel.cancel();
        if cancel_relay {
            run.relay_cancel.cancel();
        }

        let Some(task) = run.relay_task.take() else {
            return;
        };
        if timeout(self.config.relay_join, task).await.is_err() {
            debug!(run_id = run.id, "Output relay did not finish in time, detaching");
            run.relay_cancel.cancel();
        }
    }

    /// Move run `run_id` to `Crashed` and hand back its resources.
    ///
    /// An exit while `Starting` is the startup verdict and is announced as
    /// one; an exit while `Running` is only a state change. Does nothing
    /// unless `run_id` is the live run in one of those states.
    fn record_crash(&self, inner: &mut Inner, run_id: u64, code: i32) -> Option<ActiveRun> {
        let during_startup = inner.owns(run_id, SupervisorState::Starting);
        if !during_startup && !inner.owns(run_id, SupervisorState::Running) {
            return None;
        }

        warn!(run_id, exit_code = code, during_startup, "Server exited unexpectedly");
        inner.state = SupervisorState::Crashed;
        inner.last_exit_code = Some(code);
        if during_startup {
            self.emit(SupervisorEvent::Verdict(HealthVerdict::CrashedWithCode { code }));
        }
        self.emit(SupervisorEvent::state_changed(
            SupervisorState::Crashed,
            Some(code),
        ));
        inner.active.take()
    }

    /// A start attempt failed before a process existed. Leaves the
    /// supervisor `Idle`.
    fn spawn_failed(
        &self,
        inner: &mut Inner,
        spec: &LaunchSpec,
        source: std::io::Error,
    ) -> SupervisorError {
        warn!(binary = %spec.binary_path.display(), error = %source, "Failed to spawn server");
        if inner.state != SupervisorState::Idle {
            inner.state = SupervisorState::Idle;
            self.emit(SupervisorEvent::state_changed(
                SupervisorState::Idle,
                inner.last_exit_code,
            ));
        }
        SupervisorError::Spawn {
            binary: spec.binary_path.clone(),
            source,
        }
    }

    /// The relay saw the process exit. Only meaningful once `Running`;
    /// earlier exits belong to the health monitor.
    fn on_process_exit(&self, run_id: u64, code: i32) {
        let run = {
            let mut inner = self.lock();
            if !inner.owns(run_id, SupervisorState::Running) {
                return;
            }
            self.record_crash(&mut inner, run_id, code)
        };

        // Called from the relay task itself; nothing to join
        if let Some(run) = run {
            run.poller_cancel.cancel();
        }
    }
}

async fn run_relay(
    shared: Arc<Shared>,
    run_id: u64,
    relay: OutputRelay<ChildStdout, ChildStderr>,
    cancel: CancellationToken,
) {
    let end = relay
        .run(&cancel, |event| {
            debug!(stream = event.stream.as_str(), "{}", event.text);
            shared.output.push(event.clone());
            shared.emit(SupervisorEvent::Output(event));
        })
        .await;

    shared.emit(SupervisorEvent::OutputClosed);

    if let RelayEnd::ProcessExited(status) = end {
        shared.on_process_exit(run_id, exit_code(status));
    }
}

async fn run_health_monitor(
    shared: Arc<Shared>,
    run_id: u64,
    monitor: HealthMonitor,
    cancel: CancellationToken,
) {
    let verdict = monitor
        .run(&cancel, || shared.lock().owns(run_id, SupervisorState::Starting))
        .await;
    let Some(verdict) = verdict else {
        return;
    };

    let released = {
        let mut inner = shared.lock();
        if !inner.owns(run_id, SupervisorState::Starting) {
            return;
        }

        match verdict {
            HealthVerdict::Stable => {
                info!(run_id, "Server is running");
                inner.state = SupervisorState::Running;
                shared.emit(SupervisorEvent::Verdict(verdict));
                shared.emit(SupervisorEvent::state_changed(SupervisorState::Running, None));
                None
            }
            HealthVerdict::CrashedWithCode { code } => {
                shared.record_crash(&mut inner, run_id, code)
            }
            HealthVerdict::StillStarting => None,
        }
    };

    if let Some(run) = released {
        shared.release(run, false).await;
    }
}

async fn run_escalation(
    shared: Arc<Shared>,
    run_id: u64,
    escalator: ShutdownEscalator,
    cancel: CancellationToken,
) {
    let Some(outcome) = escalator.run(&cancel).await else {
        return;
    };

    let run = {
        let mut inner = shared.lock();
        if !inner.owns(run_id, SupervisorState::Stopping) {
            return;
        }
        let exit_code = outcome.exit_code();
        info!(run_id, ?exit_code, forced = outcome.was_forced(), "Server stopped");
        inner.state = SupervisorState::Idle;
        inner.last_exit_code = exit_code;
        shared.emit(SupervisorEvent::Shutdown(outcome));
        shared.emit(SupervisorEvent::state_changed(SupervisorState::Idle, exit_code));
        inner.active.take()
    };

    if let Some(run) = run {
        shared.release(run, true).await;
    }
}
