//! Seccomp whitelist for run-mode children.
//!
//! The filter is assembled through libseccomp (allow the whitelist, kill the
//! thread on anything else) and exported once at startup as a raw BPF
//! program. Run workers share the exported instructions read-only; each
//! child installs them post-fork via `prctl(PR_SET_SECCOMP)`. Compile tasks
//! bypass the filter entirely.

use crate::pipe::Pipe;

use std::os::raw::c_int;

use anyhow::{bail, Context as _, Result};
use libc::{c_long, sock_filter};
use seccomp_sys::{
    scmp_filter_ctx, seccomp_export_bpf, seccomp_init, seccomp_release, seccomp_rule_add,
    SCMP_ACT_ALLOW, SCMP_ACT_KILL,
};

/// Syscalls a typical compiled program needs for stdio and memory
/// management. Everything else kills the thread.
pub const RUN_WHITELIST: &[c_long] = &[
    libc::SYS_read,
    libc::SYS_write,
    libc::SYS_exit,
    libc::SYS_exit_group,
    libc::SYS_brk,
    libc::SYS_mmap,
    libc::SYS_munmap,
    libc::SYS_fstat,
    libc::SYS_arch_prctl,
    libc::SYS_clock_gettime,
    libc::SYS_rt_sigreturn,
];

pub struct SeccompFilter {
    prog: Vec<sock_filter>,
}

impl SeccompFilter {
    /// Allow exactly `syscalls`; the default action kills the thread. The
    /// exported program opens with libseccomp's architecture check, so a
    /// mismatched architecture dies before the syscall number is inspected.
    pub fn whitelist(syscalls: &[c_long]) -> Result<Self> {
        let ctx = unsafe { seccomp_init(SCMP_ACT_KILL) };
        if ctx.is_null() {
            bail!("seccomp_init failed");
        }

        let result = add_rules(ctx, syscalls).and_then(|_| export(ctx));
        unsafe { seccomp_release(ctx) };

        Ok(Self { prog: result? })
    }

    pub fn run_default() -> Result<Self> {
        Self::whitelist(RUN_WHITELIST)
    }

    pub fn instructions(&self) -> &[sock_filter] {
        &self.prog
    }

    /// Pointer and length for the `sock_fprog` the child builds on its
    /// stack. The backing storage lives as long as `self`, which the parent
    /// keeps alive across fork and exec.
    pub(crate) fn raw_parts(&self) -> (*const sock_filter, u16) {
        (self.prog.as_ptr(), self.prog.len() as u16)
    }
}

fn add_rules(ctx: *mut scmp_filter_ctx, syscalls: &[c_long]) -> Result<()> {
    for &nr in syscalls {
        let ret = unsafe { seccomp_rule_add(ctx, SCMP_ACT_ALLOW, nr as c_int, 0) };
        if ret != 0 {
            bail!("seccomp_rule_add failed for syscall {}: {}", nr, ret);
        }
    }
    Ok(())
}

/// `seccomp_export_bpf` only writes to an fd, so the program is routed
/// through a pipe and decoded back into instructions.
fn export(ctx: *mut scmp_filter_ctx) -> Result<Vec<sock_filter>> {
    let mut pipe = Pipe::new().context("failed to create export pipe")?;
    let fd = pipe.writer_fd().context("export pipe writer missing")?;

    let ret = unsafe { seccomp_export_bpf(ctx, fd) };
    if ret != 0 {
        bail!("seccomp_export_bpf failed: {}", ret);
    }

    pipe.close_writer().context("failed to close export pipe")?;
    let bytes = pipe
        .read_to_end()
        .context("failed to read exported BPF program")?;
    decode(&bytes)
}

fn decode(bytes: &[u8]) -> Result<Vec<sock_filter>> {
    if bytes.is_empty() || bytes.len() % 8 != 0 {
        bail!("exported BPF program has unexpected size {}", bytes.len());
    }

    let prog = bytes
        .chunks_exact(8)
        .map(|raw| sock_filter {
            code: u16::from_ne_bytes([raw[0], raw[1]]),
            jt: raw[2],
            jf: raw[3],
            k: u32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
        .collect();
    Ok(prog)
}
