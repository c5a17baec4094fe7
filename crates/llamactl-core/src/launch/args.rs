//! llama-server argument vector construction.

use std::ffi::OsString;

use super::spec::LaunchSpec;

/// Split a raw extra-arguments string on runs of whitespace.
///
/// There are no quoting semantics: `--alias "my model"` becomes
/// `["--alias", "\"my", "model\""]`.
pub fn tokenize_extra_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Build the ordered argument vector for a llama-server launch.
///
/// The vector is constructed with:
/// 1. Model path (`-m`)
/// 2. Host (`--host`) and port (`--port`)
/// 3. Context length (`-c`)
/// 4. GPU layers (`-ngl`)
/// 5. Threads (`-t`) and batch size (`-b`)
/// 6. Extra arguments, verbatim and in order
///
/// The binary itself is not part of the vector. `spec` is expected to have
/// passed [`LaunchSpec::validate`] already.
pub fn build_server_args(spec: &LaunchSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(14 + spec.extra_args.len());

    args.push("-m".into());
    args.push(spec.model_path.clone().into_os_string());
    args.push("--host".into());
    args.push(spec.host.clone().into());
    args.push("--port".into());
    args.push(spec.port.to_string().into());
    args.push("-c".into());
    args.push(spec.context_length.to_string().into());
    args.push("-ngl".into());
    args.push(spec.gpu_layers.to_string().into());
    args.push("-t".into());
    args.push(spec.thread_count.to_string().into());
    args.push("-b".into());
    args.push(spec.batch_size.to_string().into());

    args.extend(spec.extra_args.iter().map(OsString::from));
    args
}

/// Render the full command line for display, space-joined.
///
/// Non-UTF-8 path components are replaced lossily; the result is for humans,
/// not for re-parsing.
pub fn render_command_line(spec: &LaunchSpec) -> String {
    std::iter::once(spec.binary_path.clone().into_os_string())
        .chain(build_server_args(spec))
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
