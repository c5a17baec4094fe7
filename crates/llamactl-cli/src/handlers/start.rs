//! Start command handler.
//!
//! Starts llama-server under a [`Supervisor`] and stays in the foreground
//! until it stops. The first Ctrl-C asks the server to stop gracefully, a
//! second one kills it.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use llamactl_core::{
    HealthVerdict, LaunchSpec, ShutdownOutcome, SupervisorEvent, SupervisorState,
    render_command_line,
};
use llamactl_runtime::Supervisor;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{open_store, resolve_with_overrides};
use crate::commands::ProfileOverrides;
use crate::error::CliError;

/// How long to wait for trailing output once the server has stopped.
const OUTPUT_LINGER: Duration = Duration::from_secs(2);

/// Execute the start command.
pub async fn execute(
    store_path: Option<&Path>,
    profile: Option<&str>,
    overrides: &ProfileOverrides,
) -> Result<()> {
    let mut store = open_store(store_path)?;
    let (name, settings) = resolve_with_overrides(store.document(), profile, overrides)?;
    let spec = settings.to_launch_spec();

    if let Some(name) = &name {
        eprintln!("Using profile: {name}");
        store.mark_used(name).map_err(CliError::from)?;
    }

    run(&spec).await
}

/// Start `spec` and follow the server until it stops.
pub async fn run(spec: &LaunchSpec) -> Result<()> {
    let supervisor = Supervisor::default();
    let mut events = supervisor.subscribe();

    eprintln!("Starting server with command: {}", render_command_line(spec));
    supervisor.start(spec).map_err(CliError::from)?;

    follow(&supervisor, spec, &mut events).await?;
    Ok(())
}

/// Print events until the server has stopped and its output is closed.
async fn follow(
    supervisor: &Supervisor,
    spec: &LaunchSpec,
    events: &mut Receiver<SupervisorEvent>,
) -> Result<(), CliError> {
    let mut interrupts = 0u32;
    let mut output_closed = false;
    let mut finished: Option<Result<(), CliError>> = None;

    loop {
        if output_closed {
            if let Some(result) = finished.take() {
                return result;
            }
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c(), if finished.is_none() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    continue;
                }
                interrupts += 1;
                if interrupts == 1 {
                    eprintln!("Stopping server (press Ctrl-C again to kill it)...");
                    if let Err(e) = supervisor.stop() {
                        debug!(error = %e, "Stop request ignored");
                    }
                } else {
                    eprintln!("Killing server...");
                    supervisor.shutdown().await;
                }
            }
            event = events.recv() => match event {
                Ok(SupervisorEvent::Output(line)) => println!("{}", line.text),
                Ok(SupervisorEvent::OutputClosed) => output_closed = true,
                Ok(SupervisorEvent::Verdict(verdict)) => report_verdict(verdict, spec),
                Ok(SupervisorEvent::Shutdown(outcome)) => report_shutdown(outcome),
                Ok(SupervisorEvent::StateChanged { state, exit_code }) => match state {
                    SupervisorState::Idle => finished = Some(Ok(())),
                    SupervisorState::Crashed => {
                        finished = Some(Err(CliError::ServerCrashed(exit_code)));
                    }
                    SupervisorState::Starting
                    | SupervisorState::Running
                    | SupervisorState::Stopping => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Terminal fell behind, dropped server events");
                }
                Err(RecvError::Closed) => {
                    return finished.unwrap_or(Ok(()));
                }
            },
            () = sleep(OUTPUT_LINGER), if finished.is_some() => {
                debug!("Output did not close after stop, giving up on it");
                output_closed = true;
            }
        }
    }
}

fn report_verdict(verdict: HealthVerdict, spec: &LaunchSpec) {
    match verdict {
        HealthVerdict::Stable => {
            eprintln!("Server is running on http://{}:{}", spec.host, spec.port);
        }
        HealthVerdict::CrashedWithCode { code } => {
            eprintln!("Server exited during startup with code {code}");
        }
        HealthVerdict::StillStarting => {}
    }
}

fn report_shutdown(outcome: ShutdownOutcome) {
    let how = if outcome.was_forced() {
        "killed"
    } else {
        "stopped"
    };
    match outcome.exit_code() {
        Some(code) => eprintln!("Server {how} (exit code {code})"),
        None => eprintln!("Server {how}"),
    }
}
