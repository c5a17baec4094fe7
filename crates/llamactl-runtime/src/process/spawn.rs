//! Spawning llama-server from a launch spec.

use std::io;
use std::process::Stdio;

use llamactl_core::{LaunchSpec, build_server_args};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::debug;

use super::handle::ProcessHandle;

/// A spawned server with its output pipes detached from the handle.
#[derive(Debug)]
pub struct SpawnedServer {
    pub handle: ProcessHandle,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Build and spawn the llama-server command for `spec`.
///
/// stdout and stderr are piped for the output relay, stdin is detached.
/// The child is killed if its handle is dropped while still running.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_server(spec: &LaunchSpec) -> io::Result<SpawnedServer> {
    let mut cmd = Command::new(&spec.binary_path);
    cmd.args(build_server_args(spec))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    let (handle, stdout, stderr) = ProcessHandle::from_child(child);
    debug!(pid = ?handle.pid(), binary = %spec.binary_path.display(), "Spawned server process");

    Ok(SpawnedServer {
        handle,
        stdout,
        stderr,
    })
}
