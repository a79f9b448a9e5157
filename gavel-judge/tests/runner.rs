//! End-to-end runs of a single task through the sandbox, without seccomp
//! (compile-mode) so ordinary shell commands can execute.

use gavel_judge::run_pool::RunTask;
use gavel_judge::runner::SandboxRun;
use gavel_protocol::StatusId;
use gavel_sandbox::Limiter;
use gavel_utils::cancel::CancelToken;

use std::time::{Duration, Instant};

fn run(command: &str, stdin: &[u8], cpu_time: f64) -> gavel_protocol::TestResult {
    let workdir = tempfile::tempdir().unwrap();
    let task = SandboxRun::new(
        command.to_owned(),
        workdir.path().to_owned(),
        Limiter {
            cpu_time,
            memory: 262144,
        },
        0.5,
        stdin.to_vec(),
        false,
        None,
    );
    Box::new(task).run(&CancelToken::new())
}

#[test]
fn echo_round_trip_is_accepted() {
    let result = run("cat", b"ping\n", 5.0);
    assert!(result.status.is(StatusId::Accepted), "{:?}", result);
    assert_eq!(result.stdout, "ping\n");
    assert!(result.stderr.is_empty());
    assert!(result.time >= 0.0);
}

#[test]
fn nonzero_exit_is_classified_nzec() {
    let result = run("exit 1", b"", 5.0);
    assert!(result.status.is(StatusId::RuntimeNonZeroExit), "{:?}", result);
}

#[test]
fn stderr_output_is_captured() {
    let result = run("echo diag >&2", b"", 5.0);
    assert!(result.status.is(StatusId::Accepted));
    assert_eq!(result.stderr, "diag\n");
}

#[test]
fn sleeper_hits_the_deadline_and_reports_tle() {
    let t0 = Instant::now();
    let result = run("sleep 30", b"", 0.2);
    assert!(
        result.status.is(StatusId::TimeLimitExceeded),
        "{:?}",
        result
    );
    assert!(t0.elapsed() < Duration::from_secs(5));
}

#[test]
fn cancellation_yields_internal_error() {
    let workdir = tempfile::tempdir().unwrap();
    let token = CancelToken::new();
    let killer = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        killer.cancel();
    });

    let task = SandboxRun::new(
        "sleep 30".to_owned(),
        workdir.path().to_owned(),
        Limiter {
            cpu_time: 60.0,
            memory: 262144,
        },
        0.5,
        Vec::new(),
        false,
        None,
    );
    let t0 = Instant::now();
    let result = Box::new(task).run(&token);
    assert!(result.status.is(StatusId::InternalError), "{:?}", result);
    assert_eq!(result.message, "cancelled");
    assert!(t0.elapsed() < Duration::from_secs(5));
}
