//! OS process layer: spawn, poll, terminate, kill.

mod handle;
mod spawn;

pub use handle::{ProcessHandle, exit_code};
pub use spawn::{SpawnedServer, spawn_server};
