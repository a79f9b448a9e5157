use gavel_sandbox::pipe::ExecutorPipes;
use gavel_sandbox::{monitor, spawn, Limiter, SandboxOutput, SandboxSpec};
use gavel_utils::cancel::CancelToken;

use std::io::Read;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn run_command(
    command: &str,
    stdin: &[u8],
    token: &CancelToken,
    deadline: Duration,
) -> Result<(SandboxOutput, Vec<u8>, Vec<u8>)> {
    init();

    let workdir = std::env::temp_dir();
    let mut pipes = ExecutorPipes::new()?;

    let spec = SandboxSpec {
        command,
        workdir: &workdir,
        limiter: Limiter {
            cpu_time: 5.0,
            memory: 262144,
        },
        hard_cpu_time: 5.5,
        stdin_fd: pipes.stdin.reader_fd().context("stdin endpoint missing")?,
        stdout_fd: pipes.stdout.writer_fd().context("stdout endpoint missing")?,
        stderr_fd: pipes.stderr.writer_fd().context("stderr endpoint missing")?,
        run_mode: false,
        filter: None,
    };

    let pid = spawn(&spec)?;

    pipes.stdin.close_reader()?;
    pipes.stdout.close_writer()?;
    pipes.stderr.close_writer()?;

    let _ = pipes.stdin.write_all(stdin);
    pipes.stdin.close_writer()?;

    let mut out_reader = pipes.stdout.take_reader().context("stdout reader missing")?;
    let out_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        out_reader.read_to_end(&mut buf).map(|_| buf)
    });
    let mut err_reader = pipes.stderr.take_reader().context("stderr reader missing")?;
    let err_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        err_reader.read_to_end(&mut buf).map(|_| buf)
    });

    let output = monitor(pid, token, deadline)?;

    let stdout = out_handle.join().unwrap()?;
    let stderr = err_handle.join().unwrap()?;

    Ok((output, stdout, stderr))
}

#[test]
fn echo_to_stdout() -> Result<()> {
    let token = CancelToken::new();
    let (output, stdout, stderr) =
        run_command("echo hello", b"", &token, Duration::from_secs(10))?;

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.signal, 0);
    assert!(!output.timed_out);
    assert_eq!(stdout, b"hello\n");
    assert!(stderr.is_empty());
    Ok(())
}

#[test]
fn stdin_reaches_the_child() -> Result<()> {
    let token = CancelToken::new();
    let (output, stdout, _) = run_command("cat", b"ping\n", &token, Duration::from_secs(10))?;

    assert_eq!(output.exit_code, 0);
    assert_eq!(stdout, b"ping\n");
    Ok(())
}

#[test]
fn nonzero_exit_code_is_reported() -> Result<()> {
    let token = CancelToken::new();
    let (output, _, _) = run_command("exit 7", b"", &token, Duration::from_secs(10))?;

    assert_eq!(output.exit_code, 7);
    assert_eq!(output.signal, 0);
    Ok(())
}

#[test]
fn stderr_is_captured_separately() -> Result<()> {
    let token = CancelToken::new();
    let (output, stdout, stderr) =
        run_command("echo oops >&2", b"", &token, Duration::from_secs(10))?;

    assert_eq!(output.exit_code, 0);
    assert!(stdout.is_empty());
    assert_eq!(stderr, b"oops\n");
    Ok(())
}

#[test]
fn deadline_kills_a_sleeper() -> Result<()> {
    let token = CancelToken::new();
    let t0 = Instant::now();
    let (output, _, _) = run_command("sleep 30", b"", &token, Duration::from_millis(200))?;

    assert!(output.timed_out);
    assert!(t0.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[test]
fn cancellation_kills_promptly() -> Result<()> {
    let token = CancelToken::new();
    let killer = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        killer.cancel();
    });

    let t0 = Instant::now();
    let (output, _, _) = run_command("sleep 30", b"", &token, Duration::from_secs(60))?;

    assert_eq!(output.exit_code, -1);
    assert!(t0.elapsed() < Duration::from_secs(5));
    Ok(())
}
