//! Output relay: merges the child's stdout and stderr into one line stream.
//!
//! llama-server (and other C/C++ tooling) can emit non-UTF8 bytes on
//! stdout/stderr, and `BufReader::lines()` would end the stream on the first
//! invalid byte. Lines are read as bytes and decoded lossily instead.
//!
//! stderr is ordinary log output for llama-server; lines from it are never
//! treated as errors.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use llamactl_core::{OutputEvent, OutputStream};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::process::ProcessHandle;

/// Line reader over one pipe.
///
/// The partial-line buffer lives across calls, so a `next_line` future
/// dropped inside `select!` loses nothing: bytes already read stay in the
/// buffer and the next call continues the same line.
struct LineReader<R> {
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
    stream: OutputStream,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: Option<R>, stream: OutputStream) -> Self {
        Self {
            reader: reader.map(BufReader::new),
            buf: Vec::with_capacity(1024),
            stream,
        }
    }

    const fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next complete line, or `None` once the pipe is closed.
    ///
    /// A read error closes the pipe. A trailing line without a newline is
    /// still returned before end-of-stream.
    async fn next_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;

        match reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) => {
                self.reader = None;
                if self.buf.is_empty() {
                    None
                } else {
                    Some(self.take_line())
                }
            }
            Ok(_) => Some(self.take_line()),
            Err(e) => {
                debug!(
                    stream = self.stream.as_str(),
                    error = %e,
                    "Output stream read failed, closing"
                );
                self.reader = None;
                None
            }
        }
    }

    fn take_line(&mut self) -> String {
        // Trim trailing newline(s)
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

/// Why the relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Cancelled from outside.
    Stopped,
    /// The process exited and its remaining output was drained.
    ProcessExited(ExitStatus),
}

/// Drains a child's two output pipes into [`OutputEvent`]s.
#[derive(Debug)]
pub struct OutputRelay<O, E> {
    handle: Arc<ProcessHandle>,
    stdout: Option<O>,
    stderr: Option<E>,
    poll_timeout: Duration,
    drain_timeout: Duration,
}

impl<O, E> OutputRelay<O, E>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    pub const fn new(handle: Arc<ProcessHandle>, stdout: Option<O>, stderr: Option<E>) -> Self {
        Self {
            handle,
            stdout,
            stderr,
            poll_timeout: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(1),
        }
    }

    /// How long to wait for a line before re-checking for process exit.
    #[must_use]
    pub const fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Upper bound on reading leftover output after the process exited.
    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Relay lines to `emit` until cancelled or the process exits.
    ///
    /// Lines are emitted in the order they were read. Cancellation is checked
    /// every iteration; a read already in flight is abandoned, not awaited.
    pub async fn run<F>(self, cancel: &CancellationToken, mut emit: F) -> RelayEnd
    where
        F: FnMut(OutputEvent),
    {
        let pid = self.handle.pid();
        let mut out = LineReader::new(self.stdout, OutputStream::Stdout);
        let mut err = LineReader::new(self.stderr, OutputStream::Stderr);

        debug!(?pid, "Output relay started");

        // Fixed cadence, so a steady stream of lines cannot postpone the check
        let mut exit_check = interval_at(Instant::now() + self.poll_timeout, self.poll_timeout);
        exit_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if cancel.is_cancelled() {
                debug!(?pid, "Output relay stopped");
                return RelayEnd::Stopped;
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(?pid, "Output relay stopped");
                    return RelayEnd::Stopped;
                }
                line = out.next_line(), if out.is_open() => {
                    if let Some(text) = line {
                        emit(OutputEvent::new(text, OutputStream::Stdout));
                    }
                }
                line = err.next_line(), if err.is_open() => {
                    if let Some(text) = line {
                        emit(OutputEvent::new(text, OutputStream::Stderr));
                    }
                }
                _ = exit_check.tick() => {
                    if let Ok(Some(status)) = self.handle.try_exit() {
                        debug!(?pid, ?status, "Process exited, draining remaining output");
                        drain(&mut out, &mut err, self.drain_timeout, &mut emit).await;
                        debug!(?pid, "Output relay finished");
                        return RelayEnd::ProcessExited(status);
                    }
                }
            }
        }
    }
}

async fn drain<O, E, F>(
    out: &mut LineReader<O>,
    err: &mut LineReader<E>,
    limit: Duration,
    emit: &mut F,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    F: FnMut(OutputEvent),
{
    let drained = timeout(limit, async {
        while out.is_open() {
            if let Some(text) = out.next_line().await {
                emit(OutputEvent::new(text, OutputStream::Stdout));
            }
        }
        while err.is_open() {
            if let Some(text) = err.next_line().await {
                emit(OutputEvent::new(text, OutputStream::Stderr));
            }
        }
    })
    .await;

    if drained.is_err() {
        // A grandchild can hold the pipes open past our child's exit
        debug!("Output drain timed out, abandoning remaining output");
    }
}
