#![deny(clippy::all)]

//! Sandboxed execution of untrusted commands.
//!
//! [`spawn`] forks a child that installs resource limits, redirects its
//! standard streams onto the given pipe endpoints, optionally loads a seccomp
//! whitelist, and execs the command through `bash -c`. The caller collects
//! the outcome with [`monitor`].
//!
//! Exit-code ABI between the child setup code and the outcome classifier:
//!
//! - `2`: pipe/workdir/exec setup failed; the reason is on stderr
//! - `3`: stderr redirection or seccomp installation failed
//! - `-1`: never produced by the child itself; [`monitor`] reports it when
//!   the process was killed because its cancellation token fired
//!
//! These sentinels stay inside the sandbox boundary; user-visible results
//! only ever see the statuses derived from them.

mod child;
mod parent;

pub mod filter;
pub mod pipe;
pub mod signal;

pub use self::filter::SeccompFilter;
pub use self::parent::monitor;

use std::io;
use std::path::Path;

use anyhow::{Context as _, Result};
use nix::unistd::{self, Pid};

/// Resource limits for one execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limiter {
    /// CPU seconds.
    pub cpu_time: f64,
    /// KB.
    pub memory: u64,
}

/// Everything needed to launch one sandboxed child.
pub struct SandboxSpec<'a> {
    /// Shell command, run via `bash -c`.
    pub command: &'a str,
    pub workdir: &'a Path,
    pub limiter: Limiter,
    /// CPU ceiling actually installed as `RLIMIT_CPU` (limit plus grace).
    pub hard_cpu_time: f64,
    pub stdin_fd: i32,
    pub stdout_fd: i32,
    pub stderr_fd: i32,
    /// Only run-mode children get the seccomp whitelist; compilers need a
    /// far wider syscall surface and are contained by rlimits and the
    /// throwaway workdir instead.
    pub run_mode: bool,
    pub filter: Option<&'a SeccompFilter>,
}

/// Wait-status and rusage of a finished child.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxOutput {
    /// `-1` when the child was killed through its cancellation token.
    pub exit_code: i32,
    /// Terminating signal, 0 on normal exit.
    pub signal: i32,
    /// CPU seconds, user + system.
    pub time: f64,
    /// Peak resident set size in KB.
    pub memory: u64,
    /// The wall-clock deadline fired and the child was killed.
    pub timed_out: bool,
}

pub(crate) fn libc_call(f: impl FnOnce() -> i32) -> io::Result<i32> {
    let ret = f();
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret)
}

/// Fork a child set up according to `spec` and return its pid.
///
/// The returned pid is also the id of a fresh process group containing the
/// whole child tree, so one `SIGKILL` to the group tears everything down.
/// All strings the child needs are prepared before the fork; the child only
/// performs raw syscalls on its way to `execve`.
pub fn spawn(spec: &SandboxSpec<'_>) -> Result<Pid> {
    let payload = child::ChildPayload::prepare(spec)?;

    match unsafe { unistd::fork() }.context("failed to fork")? {
        unistd::ForkResult::Parent { child } => Ok(child),
        unistd::ForkResult::Child => {
            let code = child::run_child(&payload);
            unsafe { libc::_exit(code) }
        }
    }
}
