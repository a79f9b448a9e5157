//! The concrete run task: one sandboxed execution of a command against one
//! stdin stream.

use crate::outcome::classify;
use crate::run_pool::RunTask;

use gavel_protocol::TestResult;
use gavel_sandbox::pipe::ExecutorPipes;
use gavel_sandbox::signal::kill_group;
use gavel_sandbox::{monitor, spawn, Limiter, SandboxSpec, SeccompFilter};
use gavel_utils::cancel::CancelToken;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct SandboxRun {
    command: String,
    workdir: PathBuf,
    limiter: Limiter,
    grace: f64,
    stdin: Vec<u8>,
    run_mode: bool,
    filter: Option<Arc<SeccompFilter>>,
}

impl SandboxRun {
    pub fn new(
        command: String,
        workdir: PathBuf,
        limiter: Limiter,
        grace: f64,
        stdin: Vec<u8>,
        run_mode: bool,
        filter: Option<Arc<SeccompFilter>>,
    ) -> Self {
        Self {
            command,
            workdir,
            limiter,
            grace,
            stdin,
            run_mode,
            filter,
        }
    }
}

impl RunTask for SandboxRun {
    fn run(self: Box<Self>, token: &CancelToken) -> TestResult {
        let SandboxRun {
            command,
            workdir,
            limiter,
            grace,
            stdin,
            run_mode,
            filter,
        } = *self;

        let mut pipes = match ExecutorPipes::new() {
            Ok(pipes) => pipes,
            Err(err) => {
                return TestResult::internal_error(format!("new executor pipe failed: {}", err))
            }
        };

        let fds = (
            pipes.stdin.reader_fd(),
            pipes.stdout.writer_fd(),
            pipes.stderr.writer_fd(),
        );
        let (stdin_fd, stdout_fd, stderr_fd) = match fds {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => return TestResult::internal_error("executor pipe endpoints missing"),
        };

        let spec = SandboxSpec {
            command: &command,
            workdir: &workdir,
            limiter,
            hard_cpu_time: limiter.cpu_time + grace,
            stdin_fd,
            stdout_fd,
            stderr_fd,
            run_mode,
            filter: filter.as_deref(),
        };

        let pid = match spawn(&spec) {
            Ok(pid) => pid,
            Err(err) => {
                return TestResult::internal_error(format!("run executor failed: {:#}", err))
            }
        };

        // The child owns its copies now; keeping ours would wedge the EOF
        // drains below.
        let _ = pipes.stdin.close_reader();
        let _ = pipes.stdout.close_writer();
        let _ = pipes.stderr.close_writer();

        let stdin_writer = pipes.stdin.take_writer();
        let stdin_handle = thread::spawn(move || {
            if let Some(mut writer) = stdin_writer {
                // EPIPE here just means the child never read its input.
                let _ = writer.write_all(&stdin);
            }
        });

        let stdout_handle = drain(pipes.stdout.take_reader());
        let stderr_handle = drain(pipes.stderr.take_reader());

        let deadline = Duration::from_secs_f64(limiter.cpu_time + grace);
        let output = match monitor(pid, token, deadline) {
            Ok(output) => output,
            Err(err) => {
                kill_group(pid);
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                let _ = stdin_handle.join();
                return TestResult::internal_error(format!("failed to monitor child: {:#}", err));
            }
        };

        let _ = stdin_handle.join();

        let stdout = match join_drain(stdout_handle) {
            Ok(bytes) => bytes,
            Err(err) => {
                return TestResult::internal_error(format!("read stdout pipe failed: {}", err))
            }
        };
        let stderr = match join_drain(stderr_handle) {
            Ok(bytes) => bytes,
            Err(err) => {
                return TestResult::internal_error(format!("read stderr pipe failed: {}", err))
            }
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        let (status, message) = classify(&output, &limiter, &stderr);
        TestResult {
            status,
            stdout,
            stderr,
            message,
            time: output.time,
            memory: output.memory,
        }
    }
}

fn drain(reader: Option<File>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            reader.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_drain(handle: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::Other,
            "drain thread panicked",
        )),
    }
}
