//! Terminate → wait → kill escalation.
//!
//! After a terminate signal the process gets a grace window to exit on its
//! own. If it is still running when the window closes it is killed, and the
//! outcome is reported after a short settle delay.

use std::sync::Arc;
use std::time::Duration;

use llamactl_core::ShutdownOutcome;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::poll::{BoundedPoll, Tick};
use crate::process::{ProcessHandle, exit_code};

/// Waits for a terminated process to exit, force-killing it if it does not.
#[derive(Debug)]
pub struct ShutdownEscalator {
    handle: Arc<ProcessHandle>,
    grace: BoundedPoll,
    kill_settle: Duration,
}

impl ShutdownEscalator {
    pub const fn new(
        handle: Arc<ProcessHandle>,
        grace: BoundedPoll,
        kill_settle: Duration,
    ) -> Self {
        Self {
            handle,
            grace,
            kill_settle,
        }
    }

    /// Run the escalation. The terminate signal must already have been sent.
    ///
    /// Returns exactly one outcome unless cancelled.
    pub async fn run(self, cancel: &CancellationToken) -> Option<ShutdownOutcome> {
        let handle = self.handle;
        let pid = handle.pid();
        let kill_settle = self.kill_settle;
        let killer = Arc::clone(&handle);

        self.grace
            .run(
                cancel,
                |attempt| match handle.try_exit() {
                    Ok(Some(status)) => {
                        debug!(?pid, attempt, ?status, "Server exited after terminate");
                        Tick::Finish(ShutdownOutcome::StoppedGracefully {
                            exit_code: Some(exit_code(status)),
                        })
                    }
                    Ok(None) => Tick::Continue,
                    Err(e) => {
                        debug!(?pid, attempt, error = %e, "Failed to poll server status");
                        Tick::Continue
                    }
                },
                move || async move {
                    warn!(?pid, "Server not responding, forcing kill");
                    if let Err(e) = killer.kill() {
                        warn!(?pid, error = %e, "Failed to kill server");
                    }
                    sleep(kill_settle).await;

                    let exit_code = match killer.try_exit() {
                        Ok(status) => status.map(exit_code),
                        Err(_) => None,
                    };
                    ShutdownOutcome::StoppedForcibly { exit_code }
                },
            )
            .await
    }
}
