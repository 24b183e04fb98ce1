//! Wait-status decoding.
//!
//! Every `execute` call ends with one `waitpid` status, decoded here into the
//! POSIX four-way classification. Statuses that match none of the four are
//! kept raw instead of being dropped.

use std::fmt;

use nix::sys::signal::Signal;

/// Why the tracee stopped running after an `execute` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionOutcome {
    /// The tracee exited with this status code.
    Exited(i32),
    /// The tracee was terminated by this signal.
    Signaled(i32),
    /// The tracee stopped with this signal and can be inspected.
    Stopped(i32),
    /// The tracee was resumed by `SIGCONT`.
    Continued,
    /// A status none of the above decode.
    Unknown(i32),
}

impl ExecutionOutcome {
    /// Decodes a raw `waitpid` status.
    pub fn from_raw(status: i32) -> Self {
        if libc::WIFEXITED(status) {
            Self::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            Self::Signaled(libc::WTERMSIG(status))
        } else if libc::WIFSTOPPED(status) {
            Self::Stopped(libc::WSTOPSIG(status))
        } else if libc::WIFCONTINUED(status) {
            Self::Continued
        } else {
            Self::Unknown(status)
        }
    }

    /// Returns the signal number for signaled and stopped outcomes.
    pub const fn signal_number(self) -> Option<i32> {
        match self {
            Self::Signaled(sig) | Self::Stopped(sig) => Some(sig),
            _ => None,
        }
    }

    /// Returns the signal for signaled and stopped outcomes, if it has a name.
    pub fn signal(self) -> Option<Signal> {
        self.signal_number()
            .and_then(|sig| Signal::try_from(sig).ok())
    }

    /// Returns true if the tracee no longer exists after this outcome.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited(_) | Self::Signaled(_))
    }

    /// Returns true for a stop caused by `SIGTRAP`, the normal end of injected code.
    pub const fn is_trap(self) -> bool {
        matches!(self, Self::Stopped(libc::SIGTRAP))
    }
}

/// Formats a signal number by name when it has one.
struct SignalName(i32);

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Signal::try_from(self.0) {
            Ok(sig) => f.write_str(sig.as_str()),
            Err(_) => write!(f, "signal {}", self.0),
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(sig) => write!(f, "terminated by {}", SignalName(sig)),
            Self::Stopped(sig) => write!(f, "stopped by {}", SignalName(sig)),
            Self::Continued => f.write_str("continued"),
            Self::Unknown(status) => write!(f, "unknown status {status:#x}"),
        }
    }
}
