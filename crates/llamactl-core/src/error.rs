//! Supervisor error taxonomy.
//!
//! A crashed server is not an error here: it is reported as a
//! [`HealthVerdict`](crate::HealthVerdict) event.

use std::path::PathBuf;
use thiserror::Error;

use crate::events::SupervisorState;
use crate::launch::ValidationError;

/// Errors returned synchronously by supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The launch spec failed validation; nothing was started.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The OS refused to create the process.
    #[error("Failed to start server {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called while a process is already owned.
    #[error("Server is already running (state: {state})")]
    AlreadyRunning { state: SupervisorState },

    /// `stop` was called with no live process.
    #[error("Server is not running (state: {state})")]
    NotRunning { state: SupervisorState },
}

impl SupervisorError {
    /// Whether the call was made in a state that does not permit it.
    pub const fn is_usage_error(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. } | Self::NotRunning { .. })
    }
}

/// Result alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
