use crate::SandboxSpec;

use std::ffi::CString;
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;

use anyhow::{Context, Result};
use rlimit::Resource;

// Highest fd the child may have inherited; everything in 3..MAX_FD is closed
// before exec and RLIMIT_NOFILE is pinned to the same value.
const MAX_FD: i32 = 1024;

// 64 MiB ceiling on any file the child writes, stdout included.
const OUTPUT_LIMIT: u64 = 64 * 1024 * 1024;

// NPROC counts every task of the uid, the judge's own threads included;
// execve fails outright when the count is above the limit.
const MAX_PROCESSES: u64 = 256;

/// Pre-forked state for the child: every allocation (CStrings, argv/envp
/// pointer tables) happens here, on the parent side. Between `fork` and
/// `execve` the child must not touch the allocator; another thread may hold
/// its lock at fork time.
pub(crate) struct ChildPayload {
    bash: CString,
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    _envp: Vec<CString>,
    envp_ptrs: Vec<*const c_char>,
    workdir: CString,

    rlimit_cpu: u64,
    rlimit_as: u64,

    stdin_fd: i32,
    stdout_fd: i32,
    stderr_fd: i32,

    run_mode: bool,
    filter: Option<(*const libc::sock_filter, u16)>,
}

impl ChildPayload {
    pub(crate) fn prepare(spec: &SandboxSpec<'_>) -> Result<Self> {
        let bash = CString::new("/bin/bash").unwrap();
        let argv = vec![
            CString::new("bash").unwrap(),
            CString::new("-c").unwrap(),
            CString::new(spec.command).context("command contains a NUL byte")?,
        ];
        let envp = vec![
            CString::new("PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin")
                .unwrap(),
            CString::new("HOME=/tmp").unwrap(),
        ];

        let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());
        let mut envp_ptrs: Vec<*const c_char> = envp.iter().map(|e| e.as_ptr()).collect();
        envp_ptrs.push(std::ptr::null());

        let workdir = CString::new(spec.workdir.as_os_str().as_bytes())
            .context("workdir path contains a NUL byte")?;

        Ok(Self {
            bash,
            _argv: argv,
            argv_ptrs,
            _envp: envp,
            envp_ptrs,
            workdir,
            rlimit_cpu: spec.hard_cpu_time.ceil() as u64,
            rlimit_as: spec.limiter.memory * 1024,
            stdin_fd: spec.stdin_fd,
            stdout_fd: spec.stdout_fd,
            stderr_fd: spec.stderr_fd,
            run_mode: spec.run_mode,
            filter: spec.filter.map(|f| f.raw_parts()),
        })
    }
}

// Allocation-free stderr diagnostics for the window before execve.
fn child_report(msg: &[u8]) {
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
    }
}

fn set_limit(resource: Resource, cur: u64, max: u64) -> bool {
    resource.set(cur, max).is_ok()
}

/// Runs between `fork` and `execve`. Returns the exit code to die with when
/// any setup step fails; on success `execve` never comes back.
pub(crate) fn run_child(p: &ChildPayload) -> i32 {
    unsafe {
        // A fresh process group lets the parent kill the whole tree with one
        // signal to -pid.
        if libc::setpgid(0, 0) != 0 {
            child_report(b"gavel-sandbox: setpgid failed\n");
            return 2;
        }

        let limits_ok = set_limit(Resource::CPU, p.rlimit_cpu, p.rlimit_cpu)
            && set_limit(Resource::AS, p.rlimit_as, p.rlimit_as)
            && set_limit(Resource::FSIZE, OUTPUT_LIMIT, OUTPUT_LIMIT)
            && set_limit(Resource::NPROC, MAX_PROCESSES, MAX_PROCESSES)
            && set_limit(Resource::CORE, 0, 0)
            && set_limit(Resource::NOFILE, MAX_FD as u64, MAX_FD as u64);
        if !limits_ok {
            child_report(b"gavel-sandbox: setrlimit failed\n");
            return 2;
        }
        // Best effort: some environments pin a finite hard stack cap.
        let _ = Resource::STACK.set(rlimit::INFINITY, rlimit::INFINITY);

        // stderr first: once it is wired up, later failures can still report.
        if libc::dup2(p.stderr_fd, libc::STDERR_FILENO) == -1 {
            return 3;
        }
        if libc::dup2(p.stdin_fd, libc::STDIN_FILENO) == -1 {
            child_report(b"gavel-sandbox: dup2 stdin failed\n");
            return 2;
        }
        if libc::dup2(p.stdout_fd, libc::STDOUT_FILENO) == -1 {
            child_report(b"gavel-sandbox: dup2 stdout failed\n");
            return 2;
        }

        // Drop every inherited descriptor, the pipe originals included.
        for fd in 3..MAX_FD {
            libc::close(fd);
        }

        if libc::chdir(p.workdir.as_ptr()) != 0 {
            child_report(b"gavel-sandbox: chdir to workdir failed\n");
            return 2;
        }

        if p.run_mode {
            // prctl is variadic; keep every argument a full machine word.
            if libc::prctl(
                libc::PR_SET_NO_NEW_PRIVS,
                1 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            ) != 0
            {
                child_report(b"gavel-sandbox: PR_SET_NO_NEW_PRIVS failed\n");
                return 3;
            }
            if let Some((filter, len)) = p.filter {
                let prog = libc::sock_fprog {
                    len,
                    filter: filter as *mut libc::sock_filter,
                };
                if libc::prctl(
                    libc::PR_SET_SECCOMP,
                    libc::SECCOMP_MODE_FILTER as libc::c_ulong,
                    &prog as *const libc::sock_fprog as libc::c_ulong,
                    0 as libc::c_ulong,
                    0 as libc::c_ulong,
                ) != 0
                {
                    child_report(b"gavel-sandbox: seccomp install failed\n");
                    return 3;
                }
            }
        }

        libc::execve(p.bash.as_ptr(), p.argv_ptrs.as_ptr(), p.envp_ptrs.as_ptr());

        // Only reached when execve itself failed (e.g. exec format error).
        child_report(b"gavel-sandbox: execve failed\n");
        2
    }
}
