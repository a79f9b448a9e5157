//! Outcome classification for one finished execution.

use gavel_protocol::{Status, StatusId};
use gavel_sandbox::{Limiter, SandboxOutput};

/// Map an execution outcome to a status and a diagnostic message, in
/// priority order: setup sentinels, cancellation, time, memory, signal,
/// exit code.
pub fn classify(output: &SandboxOutput, limiter: &Limiter, stderr: &str) -> (Status, String) {
    if output.exit_code == 3 {
        return (
            StatusId::InternalError.status(),
            "stderr pipe setup failed.".to_owned(),
        );
    }
    if output.exit_code == 2 {
        return (StatusId::InternalError.status(), stderr.to_owned());
    }
    if output.exit_code == -1 {
        return (StatusId::InternalError.status(), "cancelled".to_owned());
    }
    if output.timed_out || output.time > limiter.cpu_time {
        return (StatusId::TimeLimitExceeded.status(), String::new());
    }
    // Peak RSS beyond the memory limit presents as a SIGSEGV-class failure
    // even when the kernel reported some other termination.
    if output.memory > limiter.memory {
        return (StatusId::RuntimeSigsegv.status(), String::new());
    }
    if output.signal != 0 {
        return (
            signal_status(output.signal).status(),
            signal_message(output.signal).to_owned(),
        );
    }
    if output.exit_code != 0 {
        return (
            StatusId::RuntimeNonZeroExit.status(),
            format!("process exited with code {}", output.exit_code),
        );
    }
    (StatusId::Accepted.status(), String::new())
}

pub fn signal_status(signal: i32) -> StatusId {
    match signal {
        libc::SIGSEGV => StatusId::RuntimeSigsegv,
        libc::SIGXFSZ => StatusId::RuntimeSigxfsz,
        libc::SIGFPE => StatusId::RuntimeSigfpe,
        libc::SIGABRT => StatusId::RuntimeSigabrt,
        libc::SIGXCPU => StatusId::TimeLimitExceeded,
        _ => StatusId::RuntimeError,
    }
}

pub fn signal_message(signal: i32) -> &'static str {
    match signal {
        libc::SIGSEGV => "segmentation fault",
        libc::SIGXFSZ => "output file size limit exceeded",
        libc::SIGFPE => "arithmetic error",
        libc::SIGABRT => "process aborted",
        libc::SIGSYS => "forbidden system call",
        libc::SIGXCPU => "time limit exceeded",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITER: Limiter = Limiter {
        cpu_time: 2.0,
        memory: 65536,
    };

    fn output() -> SandboxOutput {
        SandboxOutput {
            exit_code: 0,
            signal: 0,
            time: 0.1,
            memory: 1024,
            timed_out: false,
        }
    }

    #[test]
    fn clean_exit_is_accepted() {
        let (status, message) = classify(&output(), &LIMITER, "");
        assert!(status.is(StatusId::Accepted));
        assert!(message.is_empty());
    }

    #[test]
    fn setup_sentinels_win_over_everything() {
        let mut out = output();
        out.exit_code = 3;
        out.signal = libc::SIGSEGV;
        let (status, message) = classify(&out, &LIMITER, "noise");
        assert!(status.is(StatusId::InternalError));
        assert_eq!(message, "stderr pipe setup failed.");

        out.exit_code = 2;
        let (status, message) = classify(&out, &LIMITER, "execve failed");
        assert!(status.is(StatusId::InternalError));
        assert_eq!(message, "execve failed");

        out.exit_code = -1;
        let (status, message) = classify(&out, &LIMITER, "");
        assert!(status.is(StatusId::InternalError));
        assert_eq!(message, "cancelled");
    }

    #[test]
    fn over_cpu_limit_is_tle() {
        let mut out = output();
        out.time = 2.5;
        let (status, _) = classify(&out, &LIMITER, "");
        assert!(status.is(StatusId::TimeLimitExceeded));
    }

    #[test]
    fn deadline_kill_is_tle() {
        let mut out = output();
        out.timed_out = true;
        out.signal = libc::SIGKILL;
        let (status, _) = classify(&out, &LIMITER, "");
        assert!(status.is(StatusId::TimeLimitExceeded));
    }

    #[test]
    fn memory_overrun_is_sigsegv_class() {
        let mut out = output();
        out.memory = LIMITER.memory + 1;
        out.signal = libc::SIGKILL;
        let (status, _) = classify(&out, &LIMITER, "");
        assert!(status.is(StatusId::RuntimeSigsegv));
    }

    #[test]
    fn signals_map_to_their_classes() {
        for (signal, expected) in [
            (libc::SIGSEGV, StatusId::RuntimeSigsegv),
            (libc::SIGXFSZ, StatusId::RuntimeSigxfsz),
            (libc::SIGFPE, StatusId::RuntimeSigfpe),
            (libc::SIGABRT, StatusId::RuntimeSigabrt),
            (libc::SIGXCPU, StatusId::TimeLimitExceeded),
            (libc::SIGSYS, StatusId::RuntimeError),
            (libc::SIGKILL, StatusId::RuntimeError),
        ] {
            let mut out = output();
            out.signal = signal;
            let (status, _) = classify(&out, &LIMITER, "");
            assert!(status.is(expected), "signal {}", signal);
        }
    }

    #[test]
    fn sigsys_names_the_forbidden_syscall() {
        let mut out = output();
        out.signal = libc::SIGSYS;
        let (_, message) = classify(&out, &LIMITER, "");
        assert_eq!(message, "forbidden system call");
    }

    #[test]
    fn nonzero_exit_is_nzec() {
        let mut out = output();
        out.exit_code = 1;
        let (status, message) = classify(&out, &LIMITER, "");
        assert!(status.is(StatusId::RuntimeNonZeroExit));
        assert_eq!(message, "process exited with code 1");
    }
}
