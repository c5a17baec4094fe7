//! Process supervision for a single llama-server instance.
//!
//! [`Supervisor`] is the entry point: it validates a
//! [`LaunchSpec`](llamactl_core::LaunchSpec), spawns the server, relays its
//! output, classifies the first seconds of its life as crashed or stable and
//! shuts it down with a terminate → wait → kill escalation. Progress is
//! reported as [`SupervisorEvent`](llamactl_core::SupervisorEvent)s.

#![deny(unsafe_code)]

mod broadcaster;
pub mod config;
mod escalator;
mod health;
mod output_log;
pub mod poll;
pub mod process;
mod relay;
mod supervisor;

pub use broadcaster::EventBroadcaster;
pub use config::SupervisorConfig;
pub use escalator::ShutdownEscalator;
pub use health::HealthMonitor;
pub use output_log::OutputLog;
pub use poll::{BoundedPoll, Tick};
pub use relay::{OutputRelay, RelayEnd};
pub use supervisor::Supervisor;
