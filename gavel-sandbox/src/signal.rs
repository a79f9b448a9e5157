use log::debug;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

pub fn send_signal(pid: Pid, signal: Signal) -> nix::Result<()> {
    let result = signal::kill(pid, signal);
    debug!(
        "kill pid = {}, signal = {}, result = {:?}",
        pid, signal, result
    );
    result
}

/// SIGKILL the child's process group, then the child itself in case the
/// group was not set up yet. Errors are ignored: the target may already be
/// gone.
pub fn kill_group(pid: Pid) {
    let _ = send_signal(Pid::from_raw(-pid.as_raw()), Signal::SIGKILL);
    let _ = send_signal(pid, Signal::SIGKILL);
}
