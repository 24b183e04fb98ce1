//! Error definitions.
//!
//! This module defines every way an instance operation can fail. It provides:
//! 1. **Error kinds:** Configuration, spawn, vanished-tracee, fault and OS failures.
//! 2. **Spawn stages:** Which step of tracee creation went wrong.
//! 3. **Errno mapping:** A POSIX errno for each kind, used by the Python layer.
//!
//! Nothing here is retried internally; the caller decides what to do.

use std::fmt;

use nix::errno::Errno;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by instance operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is outside its defined range.
    ///
    /// Raised at creation time for sandbox or munmap bit patterns with
    /// undefined bits set, and for out-of-range numeric settings.
    #[error("invalid {what}: {value}")]
    InvalidConfiguration {
        /// The setting that was rejected.
        what: &'static str,
        /// The rejected value, or why it was rejected.
        value: String,
    },

    /// Creating, sandboxing or attaching to the tracee failed.
    #[error("failed to spawn tracee ({stage}): {errno}")]
    SpawnFailed {
        /// The creation step that failed.
        stage: SpawnStage,
        /// The OS error reported for that step.
        errno: Errno,
    },

    /// The tracee terminated or can no longer be controlled.
    ///
    /// Once returned, every later operation on the same instance returns it too.
    #[error("tracee {pid} is gone")]
    ProcessGone {
        /// Process id of the vanished tracee.
        pid: i32,
    },

    /// The first byte of a memory read is not mapped in the tracee.
    #[error("bad address {address:#x}")]
    BadAddress {
        /// The address that could not be read.
        address: u64,
    },

    /// The injected code and its trailing trap do not fit the code region.
    #[error("{len} bytes of code do not fit the {capacity}-byte code region")]
    CodeTooLarge {
        /// Length of the rejected buffer, trap included.
        len: usize,
        /// Size of the code region.
        capacity: usize,
    },

    /// An OS call failed unexpectedly.
    #[error("{op}: {errno}")]
    Os {
        /// The operation that failed.
        op: &'static str,
        /// The OS error it reported.
        errno: Errno,
    },
}

impl Error {
    /// Returns the POSIX errno closest to this error.
    ///
    /// # Returns
    ///
    /// `EINVAL`, the spawn errno, `ESRCH`, `EFAULT`, `E2BIG`, or the OS errno,
    /// depending on the variant.
    pub const fn errno(&self) -> Errno {
        match self {
            Self::InvalidConfiguration { .. } => Errno::EINVAL,
            Self::SpawnFailed { errno, .. } | Self::Os { errno, .. } => *errno,
            Self::ProcessGone { .. } => Errno::ESRCH,
            Self::BadAddress { .. } => Errno::EFAULT,
            Self::CodeTooLarge { .. } => Errno::E2BIG,
        }
    }

    pub(crate) const fn os(op: &'static str, errno: Errno) -> Self {
        Self::Os { op, errno }
    }

    pub(crate) const fn spawn(stage: SpawnStage, errno: Errno) -> Self {
        Self::SpawnFailed { stage, errno }
    }
}

/// Steps of tracee creation, in the order they run.
///
/// The child half of creation reports a failing step back to the parent as
/// its `u8` code, so the discriminants are part of that private protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SpawnStage {
    /// Writing the tracee image into its memfd.
    Image = 1,
    /// Creating the error-report pipe.
    Pipe = 2,
    /// Forking the child.
    Fork = 3,
    /// `PTRACE_TRACEME` in the child.
    Traceme = 4,
    /// Resetting signal dispositions and the signal mask.
    Signals = 5,
    /// Lowering the scheduling priority.
    Priority = 6,
    /// Applying the stack size limit.
    StackLimit = 7,
    /// Closing inherited file descriptors.
    CloseFds = 8,
    /// Setting `PR_SET_NO_NEW_PRIVS`.
    NoNewPrivs = 9,
    /// Installing the seccomp filter.
    Seccomp = 10,
    /// Executing the tracee image.
    Exec = 11,
    /// Waiting for the first stop and setting trace options.
    Attach = 12,
    /// Removing memory mappings.
    Munmap = 13,
}

impl SpawnStage {
    /// Decodes a stage code sent back by the child.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Image,
            2 => Self::Pipe,
            3 => Self::Fork,
            4 => Self::Traceme,
            5 => Self::Signals,
            6 => Self::Priority,
            7 => Self::StackLimit,
            8 => Self::CloseFds,
            9 => Self::NoNewPrivs,
            10 => Self::Seccomp,
            11 => Self::Exec,
            12 => Self::Attach,
            13 => Self::Munmap,
            _ => return None,
        })
    }

    /// Short lowercase name of the stage.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pipe => "pipe",
            Self::Fork => "fork",
            Self::Traceme => "traceme",
            Self::Signals => "signals",
            Self::Priority => "priority",
            Self::StackLimit => "stack limit",
            Self::CloseFds => "close fds",
            Self::NoNewPrivs => "no new privs",
            Self::Seccomp => "seccomp",
            Self::Exec => "exec",
            Self::Attach => "attach",
            Self::Munmap => "munmap",
        }
    }
}

impl fmt::Display for SpawnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
