//! Launch specification and argument building for llama-server.

mod args;
mod spec;

pub use args::{build_server_args, render_command_line, tokenize_extra_args};
pub use spec::{
    BATCH_SIZE_RANGE, CONTEXT_LENGTH_RANGE, DEFAULT_BATCH_SIZE, DEFAULT_CONTEXT_LENGTH,
    DEFAULT_GPU_LAYERS, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_THREAD_COUNT, GPU_LAYERS_RANGE,
    LaunchSpec, THREAD_COUNT_RANGE, ValidationError,
};
