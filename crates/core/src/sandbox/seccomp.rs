//! Seccomp filter for the `SYSCALLS` sandbox option.
//!
//! The filter is installed by the child just before it execs the tracee
//! image. It allows exactly that `execveat` (matched on the image descriptor)
//! and, when mappings are to be removed, `munmap`. Every other syscall,
//! and anything made under a foreign audit architecture, returns
//! `SECCOMP_RET_TRAP`: the syscall does not run and the tracee receives
//! `SIGSYS`, which the controller observes as a stop.

use std::fmt;
use std::os::fd::RawFd;

/// `AUDIT_ARCH_X86_64` from `<linux/audit.h>`.
pub const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;

/// Filter verdict: raise `SIGSYS` instead of running the syscall.
pub const SECCOMP_RET_TRAP: u32 = 0x0003_0000;

/// Filter verdict: run the syscall.
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

// Classic BPF opcodes used by the filter.
const BPF_LD_W_ABS: u16 = 0x20;
const BPF_JMP_JEQ_K: u16 = 0x15;
const BPF_RET_K: u16 = 0x06;

// Offsets into `struct seccomp_data`.
const OFFSET_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;
const OFFSET_ARG0_LO: u32 = 16;
const OFFSET_ARG0_HI: u32 = 20;

/// A compiled seccomp BPF program.
#[derive(Clone)]
pub struct SeccompProgram {
    filter: Vec<libc::sock_filter>,
}

/// A jump target inside the program being assembled.
#[derive(Clone, Copy)]
enum Label {
    Next,
    Allow,
    Trap,
}

impl SeccompProgram {
    /// Builds the filter.
    ///
    /// # Arguments
    ///
    /// * `exec_fd` - Descriptor the single permitted `execveat` must use.
    /// * `allow_munmap` - Whether `munmap` stays available for mapping removal.
    pub fn new(exec_fd: RawFd, allow_munmap: bool) -> Self {
        // (code, jt, jf, k) with symbolic jump targets, resolved below.
        let mut body: Vec<(u16, Label, Label, u32)> = vec![
            (BPF_LD_W_ABS, Label::Next, Label::Next, OFFSET_ARCH),
            (BPF_JMP_JEQ_K, Label::Next, Label::Trap, AUDIT_ARCH_X86_64),
            (BPF_LD_W_ABS, Label::Next, Label::Next, OFFSET_NR),
        ];
        if allow_munmap {
            body.push((BPF_JMP_JEQ_K, Label::Allow, Label::Next, libc::SYS_munmap as u32));
        }
        body.extend([
            (BPF_JMP_JEQ_K, Label::Next, Label::Trap, libc::SYS_execveat as u32),
            (BPF_LD_W_ABS, Label::Next, Label::Next, OFFSET_ARG0_LO),
            (BPF_JMP_JEQ_K, Label::Next, Label::Trap, exec_fd as u32),
            (BPF_LD_W_ABS, Label::Next, Label::Next, OFFSET_ARG0_HI),
            (BPF_JMP_JEQ_K, Label::Allow, Label::Trap, 0),
        ]);

        let trap_at = body.len();
        let allow_at = trap_at + 1;
        let resolve = |at: usize, label: Label| -> u8 {
            let target = match label {
                Label::Next => at + 1,
                Label::Allow => allow_at,
                Label::Trap => trap_at,
            };
            (target - at - 1) as u8
        };

        let mut filter: Vec<libc::sock_filter> = body
            .iter()
            .enumerate()
            .map(|(at, &(code, jt, jf, k))| libc::sock_filter {
                code,
                jt: resolve(at, jt),
                jf: resolve(at, jf),
                k,
            })
            .collect();
        filter.push(ret(SECCOMP_RET_TRAP));
        filter.push(ret(SECCOMP_RET_ALLOW));
        Self { filter }
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.filter.len()
    }

    /// Returns true if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// Returns the `sock_fprog` handed to `prctl(PR_SET_SECCOMP)`.
    ///
    /// The result points into `self` and must not outlive it.
    pub fn as_fprog(&mut self) -> libc::sock_fprog {
        libc::sock_fprog {
            len: self.filter.len() as u16,
            filter: self.filter.as_mut_ptr(),
        }
    }

    /// Runs the program against a syscall, as the kernel would.
    ///
    /// Only the opcodes this module emits are understood; anything else traps.
    ///
    /// # Arguments
    ///
    /// * `arch` - Audit architecture of the caller.
    /// * `nr` - Syscall number.
    /// * `arg0` - First syscall argument.
    ///
    /// # Returns
    ///
    /// The filter verdict.
    pub fn evaluate(&self, arch: u32, nr: u32, arg0: u64) -> u32 {
        let mut acc = 0u32;
        let mut pc = 0usize;
        while let Some(insn) = self.filter.get(pc) {
            match insn.code {
                BPF_LD_W_ABS => {
                    acc = match insn.k {
                        OFFSET_NR => nr,
                        OFFSET_ARCH => arch,
                        OFFSET_ARG0_LO => arg0 as u32,
                        OFFSET_ARG0_HI => (arg0 >> 32) as u32,
                        _ => 0,
                    };
                    pc += 1;
                }
                BPF_JMP_JEQ_K => {
                    let skip = if acc == insn.k { insn.jt } else { insn.jf };
                    pc += 1 + usize::from(skip);
                }
                BPF_RET_K => return insn.k,
                _ => break,
            }
        }
        SECCOMP_RET_TRAP
    }
}

const fn ret(verdict: u32) -> libc::sock_filter {
    libc::sock_filter {
        code: BPF_RET_K,
        jt: 0,
        jf: 0,
        k: verdict,
    }
}

impl fmt::Debug for SeccompProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeccompProgram")
            .field("len", &self.filter.len())
            .finish()
    }
}
