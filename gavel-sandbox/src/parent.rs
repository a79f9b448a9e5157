use crate::signal::kill_group;
use crate::SandboxOutput;

use gavel_utils::cancel::CancelToken;

use std::io;
use std::mem::MaybeUninit;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Select, TryRecvError};
use log::debug;
use nix::unistd::Pid;

/// Wait for the child to finish, honoring cancellation and the wall-clock
/// deadline.
///
/// A helper thread blocks in `wait4`; this thread selects over child
/// completion, the cancellation token, and the deadline. On cancellation or
/// deadline expiry the whole process group is SIGKILLed and the status is
/// still harvested, so no zombie survives.
pub fn monitor(pid: Pid, token: &CancelToken, deadline: Duration) -> Result<SandboxOutput> {
    debug!("monitoring child pid = {}", pid);

    let (done_tx, done_rx) = bounded(1);
    let raw_pid = pid.as_raw();
    thread::Builder::new()
        .name("gavel-wait4".to_owned())
        .spawn(move || {
            let _ = done_tx.send(wait4(raw_pid));
        })
        .context("failed to spawn wait4 thread")?;

    let mut sel = Select::new();
    let done_index = sel.recv(&done_rx);
    for rx in token.receivers() {
        sel.recv(rx);
    }

    let deadline_at = Instant::now() + deadline;
    let (status, rusage, cancelled, timed_out) = loop {
        let timeout = deadline_at.saturating_duration_since(Instant::now());
        match sel.ready_timeout(timeout) {
            Ok(i) if i == done_index => match done_rx.try_recv() {
                Ok(result) => {
                    let (status, rusage) = result.context("wait4 failed")?;
                    break (status, rusage, false, false);
                }
                // Spurious readiness; go around again.
                Err(TryRecvError::Empty) => continue,
                Err(TryRecvError::Disconnected) => bail!("wait4 thread disappeared"),
            },
            Ok(_) => {
                if !token.is_cancelled() {
                    continue;
                }
                debug!("cancellation observed, killing group {}", pid);
                kill_group(pid);
                let (status, rusage) = harvest(&done_rx)?;
                break (status, rusage, true, false);
            }
            Err(_) => {
                debug!("deadline expired, killing group {}", pid);
                kill_group(pid);
                let (status, rusage) = harvest(&done_rx)?;
                break (status, rusage, false, true);
            }
        }
    };

    debug!("status = {}, cancelled = {}", status, cancelled);

    let mut output = SandboxOutput {
        timed_out,
        ..SandboxOutput::default()
    };

    if cancelled {
        output.exit_code = -1;
        output.signal = libc::SIGKILL;
    } else if libc::WIFEXITED(status) {
        output.exit_code = libc::WEXITSTATUS(status);
    } else if libc::WIFSIGNALED(status) {
        output.signal = libc::WTERMSIG(status);
    }

    output.time = timeval_secs(rusage.ru_utime) + timeval_secs(rusage.ru_stime);
    // ru_maxrss is KB on Linux.
    output.memory = rusage.ru_maxrss.max(0) as u64;

    debug!("output = {:?}", output);
    Ok(output)
}

fn harvest(
    done_rx: &crossbeam_channel::Receiver<io::Result<(i32, libc::rusage)>>,
) -> Result<(i32, libc::rusage)> {
    let result = done_rx.recv().context("wait4 thread disappeared")?;
    result.context("wait4 failed")
}

fn timeval_secs(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6
}

fn wait4(pid: i32) -> io::Result<(i32, libc::rusage)> {
    let mut status: i32 = 0;
    let mut rusage: MaybeUninit<libc::rusage> = MaybeUninit::zeroed();

    loop {
        let ret = unsafe { libc::wait4(pid, &mut status, 0, rusage.as_mut_ptr()) };
        if ret == pid {
            break;
        }
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
    }

    unsafe { Ok((status, rusage.assume_init())) }
}
