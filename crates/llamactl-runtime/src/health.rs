//! Post-start health classification.
//!
//! Startup failures for a large-model server (bad file, OOM, incompatible
//! flags) show up within seconds. The monitor watches the process for a short
//! window: any exit inside it is a crash, surviving it is stable. There is no
//! HTTP probing; only process status is observed.

use std::sync::Arc;

use llamactl_core::HealthVerdict;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::poll::{BoundedPoll, Tick};
use crate::process::{ProcessHandle, exit_code};

/// Classifies a freshly started process as crashed or stable.
#[derive(Debug)]
pub struct HealthMonitor {
    handle: Arc<ProcessHandle>,
    schedule: BoundedPoll,
}

impl HealthMonitor {
    pub const fn new(handle: Arc<ProcessHandle>, schedule: BoundedPoll) -> Self {
        Self { handle, schedule }
    }

    /// Watch the process until it exits or the window elapses.
    ///
    /// `still_owned` is checked on every tick; once it returns `false` (the
    /// supervisor let go of this process) the monitor stops without a
    /// verdict, as it does on cancellation. Otherwise exactly one verdict is
    /// returned: `CrashedWithCode` on the first tick that sees an exit,
    /// `Stable` after the last tick.
    pub async fn run<F>(
        self,
        cancel: &CancellationToken,
        mut still_owned: F,
    ) -> Option<HealthVerdict>
    where
        F: FnMut() -> bool,
    {
        let handle = self.handle;
        let pid = handle.pid();

        self.schedule
            .run(
                cancel,
                |attempt| {
                    if !still_owned() {
                        debug!(?pid, attempt, "Process released, health monitor stopping");
                        return Tick::Abandon;
                    }

                    match handle.try_exit() {
                        Ok(Some(status)) => {
                            let code = exit_code(status);
                            warn!(?pid, attempt, exit_code = code, "Server exited during startup");
                            Tick::Finish(HealthVerdict::CrashedWithCode { code })
                        }
                        Ok(None) => {
                            debug!(?pid, attempt, "Server still starting");
                            Tick::Continue
                        }
                        Err(e) => {
                            debug!(?pid, attempt, error = %e, "Failed to poll server status");
                            Tick::Continue
                        }
                    }
                },
                || std::future::ready(HealthVerdict::Stable),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::process::Command;

    const WINDOW: BoundedPoll = BoundedPoll::new(Duration::from_millis(30), 5);

    fn spawn(program: &str, args: &[&str]) -> Arc<ProcessHandle> {
        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        Arc::new(ProcessHandle::from_child(child).0)
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn early_exit_is_crash() {
        let handle = spawn("sh", &["-c", "exit 3"]);
        let cancel = CancellationToken::new();
        let verdict = HealthMonitor::new(handle, WINDOW).run(&cancel, || true).await;
        assert_eq!(verdict, Some(HealthVerdict::CrashedWithCode { code: 3 }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn clean_exit_in_window_is_still_a_crash() {
        let handle = spawn("true", &[]);
        let cancel = CancellationToken::new();
        let verdict = HealthMonitor::new(handle, WINDOW).run(&cancel, || true).await;
        assert_eq!(verdict, Some(HealthVerdict::CrashedWithCode { code: 0 }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn survivor_is_stable() {
        let handle = spawn("sleep", &["5"]);
        let cancel = CancellationToken::new();
        let mut ticks = 0;
        let verdict = HealthMonitor::new(handle.clone(), WINDOW)
            .run(&cancel, || {
                ticks += 1;
                true
            })
            .await;
        assert_eq!(verdict, Some(HealthVerdict::Stable));
        assert_eq!(ticks, 5);
        handle.kill().unwrap();
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn released_process_yields_no_verdict() {
        let handle = spawn("sleep", &["5"]);
        let cancel = CancellationToken::new();
        let verdict = HealthMonitor::new(handle.clone(), WINDOW)
            .run(&cancel, || false)
            .await;
        assert_eq!(verdict, None);
        handle.kill().unwrap();
    }
}
