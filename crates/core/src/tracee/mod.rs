//! Tracee process control.
//!
//! [`Tracee`] owns one traced child process. Every method issues ptrace
//! requests, so a `Tracee` must stay on the thread that spawned it; the public
//! [`Instance`](crate::Instance) handle enforces that by keeping it on a
//! dedicated worker. It provides:
//! 1. **Spawn:** Fork, sandbox, exec the tracee image, attach and remove mappings.
//! 2. **Execute:** Write code plus a trap into the code region and run it.
//! 3. **Queries:** Register snapshots, memory reads and the mapping list.
//! 4. **Teardown:** Kill and reap, tolerant of a tracee that is already gone.

/// Machine code injected by the controller itself.
pub mod code;
/// Tracee memory reads and writes.
pub mod memory;
/// Wait-status decoding.
pub mod outcome;

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::unistd::{ForkResult, Pid, fork, pipe2};
use tracing::{debug, trace, warn};

use self::outcome::ExecutionOutcome;
use crate::common::error::{Error, Result, SpawnStage};
use crate::config::InstanceConfig;
use crate::registers::{self, RawRegisters, RegisterSet, Registers};
use crate::sandbox::child::{ChildPlan, REPORT_LEN};
use crate::sandbox::image::{CODE_ADDRESS, CODE_CAPACITY, ENTRY_ADDRESS, TraceeImage};
use crate::sandbox::maps::{self, Mapping};
use crate::sandbox::MunmapFlags;

/// Lifecycle of the traced process as seen by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceeState {
    /// Stopped and inspectable; holds the signal of the last stop.
    Stopped(i32),
    /// Terminated and reaped; every later operation reports `ProcessGone`.
    Terminated,
}

/// A traced, sandboxed child process.
#[derive(Debug)]
pub struct Tracee {
    pid: Pid,
    state: TraceeState,
}

impl Tracee {
    /// Spawns a tracee and runs it to its first stop.
    ///
    /// The child applies the sandbox, then execs the tracee image and stops
    /// with `SIGTRAP` at its entry point. Mappings selected by
    /// `config.munmap` are then removed by injected `munmap` calls.
    ///
    /// # Arguments
    ///
    /// * `config` - Sandbox and munmap options; must already be validated.
    ///
    /// # Returns
    ///
    /// A stopped tracee, or `SpawnFailed` naming the step that failed.
    pub fn spawn(config: &InstanceConfig) -> Result<Self> {
        let image = TraceeImage::create()?;
        let (report_rx, report_tx) = report_pipe()?;
        let mut plan = ChildPlan::new(config, image.raw_fd(), report_tx.as_raw_fd())?;

        // SAFETY: the child only runs `ChildPlan::run`, which restricts itself
        // to async-signal-safe syscalls on memory prepared above.
        let pid = match unsafe { fork() } {
            Ok(ForkResult::Child) => unsafe { plan.run() },
            Ok(ForkResult::Parent { child }) => child,
            Err(errno) => return Err(Error::spawn(SpawnStage::Fork, errno)),
        };
        drop(report_tx);
        debug!(pid = pid.as_raw(), sandbox = config.sandbox.bits(), "forked tracee");

        // Alive until a wait status says otherwise.
        let mut tracee = Self {
            pid,
            state: TraceeState::Stopped(0),
        };
        if let Err(err) = tracee.attach(report_rx) {
            tracee.kill();
            return Err(err);
        }
        drop(image);

        if !config.munmap.is_empty() {
            if let Err(err) = tracee.remove_mappings(config.munmap) {
                tracee.kill();
                return Err(err);
            }
        }
        debug!(pid = pid.as_raw(), "tracee ready");
        Ok(tracee)
    }

    /// Waits for the exec stop and sets trace options.
    fn attach(&mut self, report: File) -> Result<()> {
        loop {
            let status = wait(self.pid).map_err(|e| Error::spawn(SpawnStage::Attach, e))?;
            match ExecutionOutcome::from_raw(status) {
                ExecutionOutcome::Stopped(libc::SIGTRAP) => break,
                // A blocked syscall before exec: the filter rejected the bootstrap.
                ExecutionOutcome::Stopped(libc::SIGSYS) => {
                    return Err(Error::spawn(SpawnStage::Exec, Errno::EPERM));
                }
                ExecutionOutcome::Stopped(sig) => {
                    trace!(pid = self.pid.as_raw(), sig, "suppressing pre-exec signal");
                    ptrace::cont(self.pid, None)
                        .map_err(|e| Error::spawn(SpawnStage::Attach, e))?;
                }
                outcome if outcome.is_terminal() => {
                    self.state = TraceeState::Terminated;
                    return Err(read_report(report));
                }
                _ => {}
            }
        }
        self.state = TraceeState::Stopped(libc::SIGTRAP);

        ptrace::setoptions(self.pid, ptrace::Options::PTRACE_O_EXITKILL)
            .map_err(|e| Error::spawn(SpawnStage::Attach, e))?;

        let regs = ptrace::getregs(self.pid).map_err(|e| Error::spawn(SpawnStage::Attach, e))?;
        if regs.rip != ENTRY_ADDRESS {
            warn!(pid = self.pid.as_raw(), rip = regs.rip, "tracee stopped outside its image");
            return Err(Error::spawn(SpawnStage::Attach, Errno::ENOEXEC));
        }
        Ok(())
    }

    /// Unmaps every mapping selected by `flags`, then checks none is left.
    fn remove_mappings(&mut self, flags: MunmapFlags) -> Result<()> {
        let doomed: Vec<Mapping> = self
            .mappings()?
            .into_iter()
            .filter(|m| m.kind.removed_by(flags))
            .collect();

        for mapping in &doomed {
            self.unmap(mapping)?;
        }

        if self.mappings()?.iter().any(|m| m.kind.removed_by(flags)) {
            return Err(Error::spawn(SpawnStage::Munmap, Errno::EBUSY));
        }
        Ok(())
    }

    /// Removes one mapping with an injected `munmap`.
    fn unmap(&mut self, mapping: &Mapping) -> Result<()> {
        debug!(
            pid = self.pid.as_raw(),
            start = mapping.start,
            end = mapping.end,
            kind = ?mapping.kind,
            "unmapping"
        );
        let outcome = self.execute(&code::munmap(mapping.start, mapping.len()))?;
        if !outcome.is_trap() {
            return Err(Error::spawn(SpawnStage::Munmap, Errno::EFAULT));
        }
        let regs = self.regs()?;
        if regs.rax != 0 {
            let errno = Errno::from_raw((regs.rax as i64).wrapping_neg() as i32);
            return Err(Error::spawn(SpawnStage::Munmap, errno));
        }
        Ok(())
    }

    /// Returns the tracee's process id.
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Returns the controller's view of the tracee.
    pub const fn state(&self) -> TraceeState {
        self.state
    }

    /// Returns the last stop signal, or `ProcessGone` once terminated.
    fn stopped(&self) -> Result<i32> {
        match self.state {
            TraceeState::Stopped(sig) => Ok(sig),
            TraceeState::Terminated => Err(self.gone()),
        }
    }

    const fn gone(&self) -> Error {
        Error::ProcessGone {
            pid: self.pid.as_raw(),
        }
    }

    /// Records that the tracee vanished underneath us and reaps it.
    fn vanished(&mut self) -> Error {
        debug!(pid = self.pid.as_raw(), "tracee vanished");
        self.kill();
        self.gone()
    }

    /// Maps a ptrace failure: `ESRCH` means the tracee is gone.
    fn ptrace_error(&mut self, op: &'static str, errno: Errno) -> Error {
        if errno == Errno::ESRCH {
            self.vanished()
        } else {
            Error::os(op, errno)
        }
    }

    fn regs(&mut self) -> Result<libc::user_regs_struct> {
        ptrace::getregs(self.pid).map_err(|e| self.ptrace_error("PTRACE_GETREGS", e))
    }

    fn fpregs(&mut self) -> Result<libc::user_fpregs_struct> {
        let mut fpregs = RawRegisters::zeroed().fpregs;
        // SAFETY: PTRACE_GETFPREGS writes exactly one user_fpregs_struct into
        // the buffer, which lives for the duration of the call.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_GETFPREGS,
                self.pid.as_raw(),
                std::ptr::null_mut::<libc::c_void>(),
                (&raw mut fpregs).cast::<libc::c_void>(),
            )
        };
        let _ = Errno::result(ret).map_err(|e| self.ptrace_error("PTRACE_GETFPREGS", e))?;
        Ok(fpregs)
    }

    /// Runs `code` in the tracee until it stops or terminates.
    ///
    /// The buffer is written to the code region followed by a trap, the
    /// instruction pointer is pointed at it and the tracee is resumed. When
    /// it stops on that trap, the instruction pointer is moved back onto the
    /// trap so it ends exactly `code.len()` bytes past the code region start.
    /// Signals that stop the tracee are not delivered on the next resume.
    ///
    /// # Arguments
    ///
    /// * `code` - Machine code to run. Empty input changes nothing.
    ///
    /// # Returns
    ///
    /// The decoded wait status, `CodeTooLarge` if the buffer does not fit,
    /// or `ProcessGone` if the tracee had already terminated.
    pub fn execute(&mut self, code: &[u8]) -> Result<ExecutionOutcome> {
        let last = self.stopped()?;
        if code.is_empty() {
            return Ok(ExecutionOutcome::Stopped(last));
        }
        let len = code.len() + code::TRAP.len();
        if len > CODE_CAPACITY {
            return Err(Error::CodeTooLarge {
                len,
                capacity: CODE_CAPACITY,
            });
        }

        let mut regs = self.regs()?;

        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(code);
        buf.extend_from_slice(&code::TRAP);
        memory::write(self.pid, CODE_ADDRESS, &buf).map_err(|err| match err {
            memory::AccessError::Gone => self.vanished(),
            memory::AccessError::Fault => Error::os("process_vm_writev", Errno::EFAULT),
            memory::AccessError::Os(errno) => Error::os("process_vm_writev", errno),
        })?;

        regs.rip = CODE_ADDRESS;
        ptrace::setregs(self.pid, regs).map_err(|e| self.ptrace_error("PTRACE_SETREGS", e))?;
        ptrace::cont(self.pid, None).map_err(|e| self.ptrace_error("PTRACE_CONT", e))?;

        let status = wait(self.pid).map_err(|e| Error::os("waitpid", e))?;
        let outcome = ExecutionOutcome::from_raw(status);
        trace!(pid = self.pid.as_raw(), len = code.len(), %outcome, "executed");

        match outcome {
            ExecutionOutcome::Stopped(sig) => {
                self.state = TraceeState::Stopped(sig);
                if sig == libc::SIGTRAP {
                    self.rewind_trap(CODE_ADDRESS + code.len() as u64)?;
                }
            }
            ExecutionOutcome::Exited(_) | ExecutionOutcome::Signaled(_) => {
                self.state = TraceeState::Terminated;
            }
            ExecutionOutcome::Continued | ExecutionOutcome::Unknown(_) => {}
        }
        Ok(outcome)
    }

    /// Moves the instruction pointer back onto our trailing trap, if that is
    /// the trap that fired.
    fn rewind_trap(&mut self, trap_address: u64) -> Result<()> {
        let mut regs = self.regs()?;
        if regs.rip == trap_address + code::TRAP.len() as u64 {
            regs.rip = trap_address;
            ptrace::setregs(self.pid, regs).map_err(|e| self.ptrace_error("PTRACE_SETREGS", e))?;
        }
        Ok(())
    }

    /// Snapshots the registers in `mask`.
    ///
    /// # Returns
    ///
    /// The selected registers in presentation order; an empty map for an
    /// empty mask.
    pub fn registers(&mut self, mask: RegisterSet) -> Result<Registers> {
        let _ = self.stopped()?;
        if mask.is_empty() {
            return Ok(Registers::new());
        }
        let raw = RawRegisters {
            regs: self.regs()?,
            fpregs: self.fpregs()?,
        };
        Ok(registers::collect(&raw, mask))
    }

    /// Reads tracee memory.
    ///
    /// # Returns
    ///
    /// The accessible prefix of `[address, address + length)`, or
    /// `BadAddress` if its first byte is not mapped.
    pub fn read_memory(&mut self, address: u64, length: usize) -> Result<Vec<u8>> {
        let _ = self.stopped()?;
        match memory::read(self.pid, address, length) {
            Ok(bytes) => Ok(bytes),
            Err(memory::AccessError::Gone) => Err(self.vanished()),
            Err(err) => Err(memory::read_error(err, self.pid, address)),
        }
    }

    /// Lists the tracee's current memory mappings.
    pub fn mappings(&mut self) -> Result<Vec<Mapping>> {
        let _ = self.stopped()?;
        maps::read(self.pid).map_err(|err| match err {
            Error::ProcessGone { .. } => self.vanished(),
            other => other,
        })
    }

    /// Kills and reaps the tracee. Safe to call more than once.
    pub fn kill(&mut self) {
        if self.state == TraceeState::Terminated {
            return;
        }
        match signal::kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => warn!(pid = self.pid.as_raw(), %errno, "failed to kill tracee"),
        }
        match wait(self.pid) {
            Ok(_) | Err(Errno::ECHILD) => {}
            Err(errno) => warn!(pid = self.pid.as_raw(), %errno, "failed to reap tracee"),
        }
        self.state = TraceeState::Terminated;
        debug!(pid = self.pid.as_raw(), "tracee reaped");
    }
}

impl Drop for Tracee {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Waits for any state change of `pid`, retrying on `EINTR`.
fn wait(pid: Pid) -> nix::Result<i32> {
    let mut status = 0;
    loop {
        // SAFETY: `status` is a valid out-pointer for the duration of the call.
        let ret = unsafe { libc::waitpid(pid.as_raw(), &raw mut status, libc::__WALL) };
        match Errno::result(ret) {
            Ok(_) => return Ok(status),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(errno),
        }
    }
}

/// Creates the close-on-exec failure-report pipe as `(read, write)`.
fn report_pipe() -> Result<(File, OwnedFd)> {
    let (read, write) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| Error::spawn(SpawnStage::Pipe, e))?;
    Ok((File::from(read), write))
}

/// Decodes the child's failure report after it exited before exec.
fn read_report(mut report: File) -> Error {
    let mut message = [0u8; REPORT_LEN];
    match report.read_exact(&mut message) {
        Ok(()) => {
            let stage = SpawnStage::from_code(message[0]).unwrap_or(SpawnStage::Exec);
            let errno = i32::from_ne_bytes([message[1], message[2], message[3], message[4]]);
            Error::spawn(stage, Errno::from_raw(errno))
        }
        Err(_) => Error::spawn(SpawnStage::Exec, Errno::ECHILD),
    }
}
