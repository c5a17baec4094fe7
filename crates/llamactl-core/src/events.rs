//! Supervisor lifecycle and output events.
//!
//! These events are emitted by the runtime and consumed by whatever presents
//! the server to the operator. They are the only channel through which
//! background work (output relay, health monitor, shutdown escalator)
//! reports back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    /// No process; ready to start.
    #[default]
    Idle,
    /// Process spawned, observation window still open.
    Starting,
    /// Process survived the observation window.
    Running,
    /// Terminate sent, waiting for exit.
    Stopping,
    /// Last process exited on its own.
    Crashed,
}

impl SupervisorState {
    /// Whether `start` is permitted from this state.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Crashed)
    }

    /// Whether `stop` is permitted from this state.
    pub const fn can_stop(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// Which pipe a line of output came from.
///
/// llama-server writes routine logging to stderr, so this is metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// A single line of server output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    /// The line, without its trailing newline.
    pub text: String,
    /// When the relay read the line.
    pub timestamp: DateTime<Utc>,
    pub stream: OutputStream,
}

impl OutputEvent {
    /// Create an output event stamped with the current time.
    pub fn new(text: impl Into<String>, stream: OutputStream) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            stream,
        }
    }
}

/// Classification of a freshly started process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum HealthVerdict {
    /// Observation window still open.
    StillStarting,
    /// Process outlived the observation window.
    Stable,
    /// Process exited during the observation window.
    CrashedWithCode { code: i32 },
}

/// How a requested stop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShutdownOutcome {
    /// Process exited after the terminate signal.
    StoppedGracefully { exit_code: Option<i32> },
    /// Process had to be killed after the grace window.
    StoppedForcibly { exit_code: Option<i32> },
}

impl ShutdownOutcome {
    pub const fn exit_code(self) -> Option<i32> {
        match self {
            Self::StoppedGracefully { exit_code } | Self::StoppedForcibly { exit_code } => {
                exit_code
            }
        }
    }

    pub const fn was_forced(self) -> bool {
        matches!(self, Self::StoppedForcibly { .. })
    }
}

/// Point-in-time view of a supervisor, as returned by `query_state`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub state: SupervisorState,
    /// Exit code of the most recent process, once it has exited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    /// PID of the live process, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Rendered command line of the current or most recent run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
}

impl StateSnapshot {
    /// Verdict implied by this snapshot, if the state carries one.
    pub const fn verdict(&self) -> Option<HealthVerdict> {
        match self.state {
            SupervisorState::Starting => Some(HealthVerdict::StillStarting),
            SupervisorState::Running => Some(HealthVerdict::Stable),
            SupervisorState::Crashed => match self.last_exit_code {
                Some(code) => Some(HealthVerdict::CrashedWithCode { code }),
                None => None,
            },
            SupervisorState::Idle | SupervisorState::Stopping => None,
        }
    }
}

/// Event payload delivered to supervisor subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// A line of server output.
    Output(OutputEvent),

    /// The supervisor moved to a new state.
    StateChanged {
        state: SupervisorState,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    /// Terminal health classification after start.
    Verdict(HealthVerdict),

    /// Terminal outcome of a stop request.
    Shutdown(ShutdownOutcome),

    /// The output relay finished; no more output for this run.
    OutputClosed,
}

impl SupervisorEvent {
    pub const fn state_changed(state: SupervisorState, exit_code: Option<i32>) -> Self {
        Self::StateChanged { state, exit_code }
    }
}
