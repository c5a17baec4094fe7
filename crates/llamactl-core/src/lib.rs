//! Core domain types for llamactl.
//!
//! Launch specification, argument building, lifecycle events, errors and the
//! profile document. Nothing in this crate spawns processes or touches the
//! async runtime; see `llamactl-runtime` for that.

#![deny(unused_crate_dependencies)]

pub mod error;
pub mod events;
pub mod launch;
pub mod profiles;

pub use error::{SupervisorError, SupervisorResult};
pub use events::{
    HealthVerdict, OutputEvent, OutputStream, ShutdownOutcome, StateSnapshot, SupervisorEvent,
    SupervisorState,
};
pub use launch::{
    LaunchSpec, ValidationError, build_server_args, render_command_line, tokenize_extra_args,
};
pub use profiles::{
    ProfileDocument, ProfileError, ProfileStore, ServerProfile, default_profiles_path,
};
