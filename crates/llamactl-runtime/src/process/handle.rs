//! Shared, non-blocking handle to a spawned llama-server process.

use std::io;
use std::process::ExitStatus;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::debug;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Handle to a running child process.
///
/// Every method takes `&self` and returns immediately, so the handle can be
/// shared (`Arc<ProcessHandle>`) between the supervisor, the output relay and
/// the polling state machines. Exit status is collected with `try_wait`;
/// nothing here ever blocks waiting for the process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Mutex<Child>,
}

impl ProcessHandle {
    /// Wrap a freshly spawned child, taking its output pipes.
    pub fn from_child(mut child: Child) -> (Self, Option<ChildStdout>, Option<ChildStderr>) {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let handle = Self {
            pid: child.id(),
            child: Mutex::new(child),
        };
        (handle, stdout, stderr)
    }

    /// OS process id, if it was available at spawn time.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll for exit without blocking. Reaps the process once it has exited.
    pub fn try_exit(&self) -> io::Result<Option<ExitStatus>> {
        self.child().try_wait()
    }

    /// Whether the process has exited. Poll errors count as still running.
    pub fn has_exited(&self) -> bool {
        match self.try_exit() {
            Ok(status) => status.is_some(),
            Err(e) => {
                debug!(pid = ?self.pid, error = %e, "Failed to poll process status");
                false
            }
        }
    }

    /// Ask the process to shut down (SIGTERM on Unix).
    ///
    /// Returns `Ok(false)` if the process had already exited. Platforms
    /// without a graceful signal fall back to [`kill`](Self::kill).
    pub fn terminate(&self) -> io::Result<bool> {
        if self.has_exited() {
            return Ok(false);
        }

        #[cfg(unix)]
        {
            let Some(pid) = self.pid else {
                return self.kill();
            };
            let raw = i32::try_from(pid)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
            match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
                Ok(()) => Ok(true),
                // Exited between the poll and the signal
                Err(Errno::ESRCH) => Ok(false),
                Err(e) => Err(io::Error::other(e)),
            }
        }

        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    /// Force the process to stop (SIGKILL on Unix). Does not wait for exit.
    ///
    /// Returns `Ok(false)` if the process had already exited.
    pub fn kill(&self) -> io::Result<bool> {
        let mut child = self.child();
        if child.try_wait()?.is_some() {
            return Ok(false);
        }
        child.start_kill()?;
        Ok(true)
    }
}

/// Integer exit code for a finished process.
///
/// A process killed by a signal reports the negated signal number, so
/// SIGKILL becomes `-9`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }

    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::process::Command;
    use tokio::time::sleep;

    async fn wait_exit(handle: &ProcessHandle) -> ExitStatus {
        for _ in 0..50 {
            if let Some(status) = handle.try_exit().unwrap() {
                return status;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("process did not exit");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn terminate_delivers_sigterm() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let (handle, _, _) = ProcessHandle::from_child(child);

        assert!(handle.pid().is_some());
        assert!(!handle.has_exited());
        assert!(handle.terminate().unwrap());

        let status = wait_exit(&handle).await;
        assert_eq!(exit_code(status), -15);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_after_exit_is_noop() {
        let child = Command::new("sh").args(["-c", "exit 4"]).spawn().unwrap();
        let (handle, _, _) = ProcessHandle::from_child(child);

        let status = wait_exit(&handle).await;
        assert_eq!(exit_code(status), 4);
        assert!(!handle.kill().unwrap());
        assert!(!handle.terminate().unwrap());
        // Exit status stays available after reaping
        assert!(handle.try_exit().unwrap().is_some());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_reports_signal_code() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let (handle, _, _) = ProcessHandle::from_child(child);

        assert!(handle.kill().unwrap());
        let status = wait_exit(&handle).await;
        assert_eq!(exit_code(status), -9);
    }
}
