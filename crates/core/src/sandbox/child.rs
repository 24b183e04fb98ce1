//! Child-side tracee setup.
//!
//! Runs in the forked child, between `fork` and `execveat`. The parent may be
//! multi-threaded, so this code only issues raw async-signal-safe syscalls
//! and never allocates: everything it needs is prepared in [`ChildPlan::new`]
//! before the fork.
//!
//! Failures are reported to the parent over a close-on-exec pipe as one
//! stage byte followed by the errno, after which the child exits. A
//! successful exec closes the pipe, which the parent reads as success.

use std::ffi::{CString, c_char};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::ptr;

use nix::errno::Errno;

use super::SandboxFlags;
use super::seccomp::SeccompProgram;
use crate::common::error::{Error, Result, SpawnStage};
use crate::config::InstanceConfig;

/// Size of one failure report: stage byte plus native-endian errno.
pub const REPORT_LEN: usize = 5;

/// Exit status of a child that failed before exec.
const SETUP_FAILED: i32 = 127;

/// Highest signal number reset to its default disposition.
const MAX_SIGNAL: i32 = 64;

/// `argv[0]` of the tracee.
const TRACEE_NAME: &std::ffi::CStr = c"asmbox-tracee";

/// Everything the child needs, prepared before `fork`.
#[derive(Debug)]
pub struct ChildPlan {
    sandbox: SandboxFlags,
    stack_limit: libc::rlim_t,
    niceness: i32,
    image_fd: RawFd,
    report_fd: RawFd,
    seccomp: Option<SeccompProgram>,
    argv: [*const c_char; 2],
    envp: Vec<*const c_char>,
    // Backing storage for `envp`.
    _environ: Vec<CString>,
}

impl ChildPlan {
    /// Prepares the child sequence.
    ///
    /// # Arguments
    ///
    /// * `config` - Sandbox options and limits.
    /// * `image_fd` - Memfd holding the tracee image.
    /// * `report_fd` - Write end of the failure-report pipe.
    pub fn new(config: &InstanceConfig, image_fd: RawFd, report_fd: RawFd) -> Result<Self> {
        let environ: Vec<CString> = if config.sandbox.contains(SandboxFlags::ENVIRON) {
            Vec::new()
        } else {
            std::env::vars_os()
                .filter_map(|(key, value)| {
                    let mut entry = key.as_bytes().to_vec();
                    entry.push(b'=');
                    entry.extend_from_slice(value.as_bytes());
                    CString::new(entry).ok()
                })
                .collect()
        };
        let mut envp: Vec<*const c_char> = environ.iter().map(|e| e.as_ptr()).collect();
        envp.push(ptr::null());

        let seccomp = config
            .sandbox
            .contains(SandboxFlags::SYSCALLS)
            .then(|| SeccompProgram::new(image_fd, !config.munmap.is_empty()));

        let stack_limit = libc::rlim_t::try_from(config.stack_limit).map_err(|_| {
            Error::InvalidConfiguration {
                what: "stack limit",
                value: config.stack_limit.to_string(),
            }
        })?;

        Ok(Self {
            sandbox: config.sandbox,
            stack_limit,
            niceness: config.niceness,
            image_fd,
            report_fd,
            seccomp,
            argv: [TRACEE_NAME.as_ptr(), ptr::null()],
            envp,
            _environ: environ,
        })
    }

    /// Runs the child sequence. Never returns.
    ///
    /// # Safety
    ///
    /// Must be called only in the child of a `fork`, and only once.
    pub unsafe fn run(&mut self) -> ! {
        // SAFETY: upheld by the caller; every step below is a raw syscall.
        unsafe {
            if let Err((stage, errno)) = self.setup() {
                self.report(stage, errno);
            }
            libc::_exit(SETUP_FAILED)
        }
    }

    unsafe fn setup(&mut self) -> std::result::Result<(), (SpawnStage, Errno)> {
        let check = |stage: SpawnStage, ret: libc::c_long| {
            if ret == -1 {
                Err((stage, Errno::last()))
            } else {
                Ok(())
            }
        };

        // SAFETY: all calls take plain integers or pointers to data owned by
        // `self`, which outlives them. None of them allocate.
        unsafe {
            check(
                SpawnStage::Traceme,
                libc::ptrace(
                    libc::PTRACE_TRACEME,
                    0,
                    ptr::null_mut::<libc::c_void>(),
                    ptr::null_mut::<libc::c_void>(),
                ),
            )?;

            check(SpawnStage::Signals, reset_signals())?;
            // A new session keeps terminal job-control signals away from the tracee.
            let _ = libc::setsid();

            if self.sandbox.contains(SandboxFlags::CPU) {
                let ret = libc::setpriority(libc::PRIO_PROCESS, 0, self.niceness);
                check(SpawnStage::Priority, libc::c_long::from(ret))?;
            }

            if self.sandbox.contains(SandboxFlags::STACK) {
                let mut limit = libc::rlimit {
                    rlim_cur: 0,
                    rlim_max: 0,
                };
                let ret = libc::getrlimit(libc::RLIMIT_STACK, &mut limit);
                check(SpawnStage::StackLimit, libc::c_long::from(ret))?;
                let limit = lowered_stack_limit(limit, self.stack_limit);
                let ret = libc::setrlimit(libc::RLIMIT_STACK, &limit);
                check(SpawnStage::StackLimit, libc::c_long::from(ret))?;
            }

            if self.sandbox.contains(SandboxFlags::FDS) {
                check(SpawnStage::CloseFds, self.close_fds())?;
            }

            if let Some(program) = self.seccomp.as_mut() {
                let ret = libc::prctl(
                    libc::PR_SET_NO_NEW_PRIVS,
                    1 as libc::c_ulong,
                    0 as libc::c_ulong,
                    0 as libc::c_ulong,
                    0 as libc::c_ulong,
                );
                check(SpawnStage::NoNewPrivs, libc::c_long::from(ret))?;
                let fprog = program.as_fprog();
                let ret = libc::prctl(
                    libc::PR_SET_SECCOMP,
                    libc::SECCOMP_MODE_FILTER as libc::c_ulong,
                    &raw const fprog,
                );
                check(SpawnStage::Seccomp, libc::c_long::from(ret))?;
            }

            let ret = libc::syscall(
                libc::SYS_execveat,
                self.image_fd,
                c"".as_ptr(),
                self.argv.as_ptr(),
                self.envp.as_ptr(),
                libc::AT_EMPTY_PATH,
            );
            check(SpawnStage::Exec, ret)
        }
    }

    /// Closes every descriptor except the image and the report pipe.
    unsafe fn close_fds(&self) -> libc::c_long {
        let (low, high) = if self.image_fd < self.report_fd {
            (self.image_fd, self.report_fd)
        } else {
            (self.report_fd, self.image_fd)
        };
        let ranges = [
            (0, low - 1),
            (low + 1, high - 1),
            (high + 1, libc::c_int::MAX),
        ];
        for (first, last) in ranges {
            if first > last {
                continue;
            }
            // SAFETY: close_range only touches this process's descriptor table.
            let ret = unsafe {
                libc::syscall(
                    libc::SYS_close_range,
                    first as libc::c_uint,
                    last as libc::c_uint,
                    0 as libc::c_uint,
                )
            };
            if ret == -1 {
                if Errno::last() != Errno::ENOSYS {
                    return -1;
                }
                // Kernels before 5.9: close one by one up to the soft limit.
                // SAFETY: as above.
                unsafe { close_each(first, last) };
            }
        }
        0
    }

    /// Writes a failure report to the parent.
    unsafe fn report(&self, stage: SpawnStage, errno: Errno) {
        let mut message = [0u8; REPORT_LEN];
        message[0] = stage as u8;
        message[1..].copy_from_slice(&(errno as i32).to_ne_bytes());
        // SAFETY: the buffer is valid for REPORT_LEN bytes. A short or failed
        // write leaves the parent with the exit status alone.
        let _ = unsafe { libc::write(self.report_fd, message.as_ptr().cast(), REPORT_LEN) };
    }
}

/// Resets every catchable signal to its default action and blocks only `SIGWINCH`.
unsafe fn reset_signals() -> libc::c_long {
    // SAFETY: sigaction and sigprocmask are async-signal-safe and only read
    // the locals passed to them.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        for sig in 1..=MAX_SIGNAL {
            if sig == libc::SIGKILL || sig == libc::SIGSTOP {
                continue;
            }
            // Signals reserved by the C library reject the call; that is fine.
            let _ = libc::sigaction(sig, &action, ptr::null_mut());
        }

        let mut mask: libc::sigset_t = std::mem::zeroed();
        let _ = libc::sigemptyset(&mut mask);
        let _ = libc::sigaddset(&mut mask, libc::SIGWINCH);
        libc::c_long::from(libc::sigprocmask(libc::SIG_SETMASK, &mask, ptr::null_mut()))
    }
}

/// Closes `first..=last`, capped at the descriptor soft limit.
unsafe fn close_each(first: libc::c_int, last: libc::c_int) {
    // SAFETY: getrlimit writes into the local; close only affects our own table.
    unsafe {
        let mut limit: libc::rlimit = std::mem::zeroed();
        let cap = if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) == 0 {
            libc::c_int::try_from(limit.rlim_cur).unwrap_or(libc::c_int::MAX)
        } else {
            1024
        };
        for fd in first..=last.min(cap) {
            let _ = libc::close(fd);
        }
    }
}

/// Caps both stack limits at `wanted` without raising either.
const fn lowered_stack_limit(current: libc::rlimit, wanted: libc::rlim_t) -> libc::rlimit {
    const fn min(a: libc::rlim_t, b: libc::rlim_t) -> libc::rlim_t {
        if a < b { a } else { b }
    }
    libc::rlimit {
        rlim_cur: min(current.rlim_cur, wanted),
        rlim_max: min(current.rlim_max, wanted),
    }
}
