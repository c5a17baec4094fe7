//! End-to-end supervisor lifecycle tests.
//!
//! Each test writes a small shell script standing in for llama-server and
//! drives it through the supervisor with shortened timings.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use llamactl_core::{
    HealthVerdict, LaunchSpec, OutputStream, ShutdownOutcome, SupervisorError, SupervisorEvent,
    SupervisorState, ValidationError,
};
use llamactl_runtime::{Supervisor, SupervisorConfig};
use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

struct FakeServer {
    _dir: TempDir,
    binary: PathBuf,
    model: PathBuf,
}

impl FakeServer {
    fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("llama-server");
        fs::write(&binary, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        let model = dir.path().join("model.gguf");
        fs::write(&model, b"GGUF").unwrap();

        Self {
            _dir: dir,
            binary,
            model,
        }
    }

    fn spec(&self) -> LaunchSpec {
        LaunchSpec::new(&self.binary, &self.model)
    }
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig::default()
        .with_health(Duration::from_millis(50), 6)
        .with_grace(Duration::from_millis(50), 10)
        .with_kill_settle(Duration::from_millis(100))
        .with_relay_poll(Duration::from_millis(20))
        .with_relay_drain(Duration::from_millis(500))
        .with_relay_join(Duration::from_millis(500))
}

/// Start, retrying while the freshly written script is still busy.
///
/// Another test thread forking while our script's write handle is open can
/// make exec fail with ETXTBSY.
fn start(supervisor: &Supervisor, spec: &LaunchSpec) {
    for _ in 0..5 {
        match supervisor.start(spec) {
            Ok(()) => return,
            Err(SupervisorError::Spawn { source, .. })
                if source.raw_os_error() == Some(Errno::ETXTBSY as i32) =>
            {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("start failed: {e}"),
        }
    }
    panic!("start kept failing with ETXTBSY");
}

/// Receive events until `done` matches one, returning all of them.
async fn collect_until(
    rx: &mut broadcast::Receiver<SupervisorEvent>,
    mut done: impl FnMut(&SupervisorEvent) -> bool,
) -> Vec<SupervisorEvent> {
    let mut seen = Vec::new();
    timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            let finished = done(&event);
            seen.push(event);
            if finished {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for event");
    seen
}

fn reached(state: SupervisorState) -> impl FnMut(&SupervisorEvent) -> bool {
    move |event| matches!(event, SupervisorEvent::StateChanged { state: s, .. } if *s == state)
}

fn verdicts(events: &[SupervisorEvent]) -> Vec<HealthVerdict> {
    events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::Verdict(verdict) => Some(*verdict),
            _ => None,
        })
        .collect()
}

fn shutdowns(events: &[SupervisorEvent]) -> Vec<ShutdownOutcome> {
    events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::Shutdown(outcome) => Some(*outcome),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_missing_binary_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.gguf");
    fs::write(&model, b"GGUF").unwrap();

    let supervisor = Supervisor::new(fast_config());
    let err = supervisor
        .start(&LaunchSpec::new(dir.path().join("missing-server"), &model))
        .unwrap_err();

    assert!(matches!(
        err,
        SupervisorError::Validation(ValidationError::BinaryNotFound(_))
    ));
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn test_early_exit_is_reported_as_crash() {
    let server = FakeServer::new("exit 1");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    let events = collect_until(&mut rx, reached(SupervisorState::Crashed)).await;

    assert_eq!(
        verdicts(&events),
        vec![HealthVerdict::CrashedWithCode { code: 1 }]
    );
    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Crashed);
    assert_eq!(snapshot.last_exit_code, Some(1));
    assert_eq!(snapshot.pid, None);

    // Nothing else may classify this run after the window closes
    sleep(Duration::from_millis(400)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, SupervisorEvent::Verdict(_)), "unexpected {event:?}");
    }
    assert_eq!(supervisor.state(), SupervisorState::Crashed);
}

#[tokio::test]
async fn test_restart_after_crash() {
    let server = FakeServer::new("exit 1");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    collect_until(&mut rx, reached(SupervisorState::Crashed)).await;

    start(&supervisor, &server.spec());
    assert_eq!(supervisor.state(), SupervisorState::Starting);
    assert_eq!(supervisor.query_state().last_exit_code, None);

    let events = collect_until(&mut rx, reached(SupervisorState::Crashed)).await;
    assert_eq!(
        verdicts(&events),
        vec![HealthVerdict::CrashedWithCode { code: 1 }]
    );
}

#[tokio::test]
async fn test_stable_server_runs_and_stops_gracefully() {
    let server = FakeServer::new("exec sleep 30");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    let events = collect_until(&mut rx, reached(SupervisorState::Running)).await;
    assert_eq!(verdicts(&events), vec![HealthVerdict::Stable]);

    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Running);
    assert!(snapshot.pid.is_some());
    assert!(snapshot.command_line.unwrap().contains("--port 8080"));

    let err = supervisor.start(&server.spec()).unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::AlreadyRunning {
            state: SupervisorState::Running
        }
    ));
    assert_eq!(supervisor.state(), SupervisorState::Running);

    supervisor.stop().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopping);

    let events = collect_until(&mut rx, reached(SupervisorState::Idle)).await;
    assert_eq!(
        shutdowns(&events),
        vec![ShutdownOutcome::StoppedGracefully {
            exit_code: Some(-15)
        }]
    );
    assert_eq!(supervisor.query_state().last_exit_code, Some(-15));

    let err = supervisor.stop().unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::NotRunning {
            state: SupervisorState::Idle
        }
    ));
}

#[tokio::test]
async fn test_stop_during_startup() {
    let server = FakeServer::new("exec sleep 30");
    let supervisor = Supervisor::new(fast_config().with_health(Duration::from_secs(5), 6));
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    supervisor.stop().unwrap();

    let events = collect_until(&mut rx, reached(SupervisorState::Idle)).await;
    assert!(verdicts(&events).is_empty());
    assert_eq!(shutdowns(&events).len(), 1);
}

#[tokio::test]
async fn test_server_ignoring_terminate_is_killed() {
    let server = FakeServer::new("trap '' TERM\nwhile :; do sleep 1; done");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    collect_until(&mut rx, reached(SupervisorState::Running)).await;
    let pid = supervisor.query_state().pid.unwrap();

    supervisor.stop().unwrap();
    let events = collect_until(&mut rx, reached(SupervisorState::Idle)).await;

    assert_eq!(
        shutdowns(&events),
        vec![ShutdownOutcome::StoppedForcibly {
            exit_code: Some(-9)
        }]
    );
    let pid = Pid::from_raw(i32::try_from(pid).unwrap());
    assert_eq!(signal::kill(pid, None), Err(Errno::ESRCH));
}

#[tokio::test]
async fn test_output_lines_are_relayed_once() {
    let server = FakeServer::new("echo line1\necho line2 >&2\nexit 0");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    let events = collect_until(&mut rx, |event| {
        matches!(event, SupervisorEvent::OutputClosed)
    })
    .await;

    let mut lines: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::Output(output) => Some((output.stream, output.text.clone())),
            _ => None,
        })
        .collect();
    lines.sort_by_key(|(stream, _)| stream.as_str());
    assert_eq!(
        lines,
        vec![
            (OutputStream::Stderr, "line2".to_string()),
            (OutputStream::Stdout, "line1".to_string()),
        ]
    );

    let recent: Vec<_> = supervisor
        .recent_output()
        .into_iter()
        .map(|output| output.text)
        .collect();
    assert_eq!(recent.len(), 2);
    assert!(recent.contains(&"line1".to_string()));
    assert!(recent.contains(&"line2".to_string()));
}

#[tokio::test]
async fn test_exit_after_startup_window_is_a_crash() {
    let server = FakeServer::new("sleep 1\nexit 4");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    let events = collect_until(&mut rx, reached(SupervisorState::Crashed)).await;

    assert_eq!(verdicts(&events), vec![HealthVerdict::Stable]);
    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Crashed);
    assert_eq!(snapshot.last_exit_code, Some(4));
}

#[tokio::test]
async fn test_shutdown_kills_running_server() {
    let server = FakeServer::new("exec sleep 30");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    collect_until(&mut rx, reached(SupervisorState::Running)).await;

    supervisor.shutdown().await;

    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Idle);
    assert_eq!(snapshot.last_exit_code, Some(-9));
    assert_eq!(snapshot.pid, None);

    let events = collect_until(&mut rx, reached(SupervisorState::Idle)).await;
    assert_eq!(
        shutdowns(&events),
        vec![ShutdownOutcome::StoppedForcibly {
            exit_code: Some(-9)
        }]
    );
}

#[tokio::test]
async fn test_start_while_starting_is_rejected() {
    let server = FakeServer::new("exec sleep 30");
    let supervisor = Supervisor::new(fast_config().with_health(Duration::from_secs(5), 6));

    start(&supervisor, &server.spec());
    let pid = supervisor.query_state().pid;

    let err = supervisor.start(&server.spec()).unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::AlreadyRunning {
            state: SupervisorState::Starting
        }
    ));
    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Starting);
    assert_eq!(snapshot.pid, pid);

    supervisor.shutdown().await;
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn test_stop_after_crash_is_rejected() {
    let server = FakeServer::new("exit 1");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    collect_until(&mut rx, reached(SupervisorState::Crashed)).await;

    let err = supervisor.stop().unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::NotRunning {
            state: SupervisorState::Crashed
        }
    ));
    assert_eq!(supervisor.state(), SupervisorState::Crashed);
    assert_eq!(supervisor.query_state().last_exit_code, Some(1));
}

#[tokio::test]
async fn test_stop_after_unobserved_exit_reports_crash() {
    let server = FakeServer::new("exit 1");
    let supervisor = Supervisor::new(fast_config().with_health(Duration::from_secs(5), 6));
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    // Exited, but the health monitor has not ticked yet
    sleep(Duration::from_millis(300)).await;
    assert_eq!(supervisor.state(), SupervisorState::Starting);

    let err = supervisor.stop().unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::NotRunning {
            state: SupervisorState::Crashed
        }
    ));

    let events = collect_until(&mut rx, reached(SupervisorState::Crashed)).await;
    assert_eq!(
        verdicts(&events),
        vec![HealthVerdict::CrashedWithCode { code: 1 }]
    );
    assert!(shutdowns(&events).is_empty());
    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Crashed);
    assert_eq!(snapshot.last_exit_code, Some(1));
    assert_eq!(snapshot.pid, None);

    sleep(Duration::from_millis(200)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(
                event,
                SupervisorEvent::Verdict(_)
                    | SupervisorEvent::Shutdown(_)
                    | SupervisorEvent::StateChanged { .. }
            ),
            "unexpected {event:?}"
        );
    }
}

#[tokio::test]
async fn test_unexecutable_binary_after_crash_returns_to_idle() {
    let server = FakeServer::new("exit 1");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    collect_until(&mut rx, reached(SupervisorState::Crashed)).await;

    fs::set_permissions(&server.binary, fs::Permissions::from_mode(0o644)).unwrap();
    let err = supervisor.start(&server.spec()).unwrap_err();

    match err {
        SupervisorError::Spawn { binary, source } => {
            assert_eq!(binary, server.binary);
            assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
        }
        other => panic!("expected spawn error, got {other:?}"),
    }
    let snapshot = supervisor.query_state();
    assert_eq!(snapshot.state, SupervisorState::Idle);
    assert_eq!(snapshot.pid, None);
    collect_until(&mut rx, reached(SupervisorState::Idle)).await;
}

#[tokio::test]
async fn test_start_outside_runtime_after_crash_returns_to_idle() {
    let server = FakeServer::new("exit 1");
    let supervisor = Supervisor::new(fast_config());
    let mut rx = supervisor.subscribe();

    start(&supervisor, &server.spec());
    collect_until(&mut rx, reached(SupervisorState::Crashed)).await;

    let worker = supervisor.clone();
    let spec = server.spec();
    let err = std::thread::spawn(move || worker.start(&spec))
        .join()
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Spawn { .. }));
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert_eq!(supervisor.query_state().last_exit_code, Some(1));
    collect_until(&mut rx, reached(SupervisorState::Idle)).await;
}
