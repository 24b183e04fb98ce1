//! Tracee isolation.
//!
//! Everything that shapes the tracee before injected code can run. It provides:
//! 1. **Flag sets:** [`SandboxFlags`] and [`MunmapFlags`], fixed at creation.
//! 2. **Image:** The minimal static executable the tracee is started from.
//! 3. **Child setup:** The fork-side sequence that applies the sandbox and execs the image.
//! 4. **Seccomp:** The BPF filter that traps every syscall from injected code.
//! 5. **Mappings:** Classification of `/proc/<pid>/maps` entries for removal.

/// Post-fork child setup (runs between `fork` and `execveat`).
pub mod child;
/// Runtime-built ELF image the tracee executes.
pub mod image;
/// Mapping enumeration and classification.
pub mod maps;
/// Seccomp BPF program construction.
pub mod seccomp;

use std::ops::BitOr;

use serde::Deserialize;

use crate::common::error::{Error, Result};

/// Isolation options applied to the tracee at creation.
///
/// Options combine with `|`; [`SandboxFlags::ALL`] enables every one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "i64")]
pub struct SandboxFlags(u32);

impl SandboxFlags {
    /// No isolation.
    pub const NONE: Self = Self(0);
    /// Close every file descriptor.
    pub const FDS: Self = Self(1 << 0);
    /// Trap every syscall made by injected code.
    pub const SYSCALLS: Self = Self(1 << 1);
    /// Start with an empty environment.
    pub const ENVIRON: Self = Self(1 << 2);
    /// Limit the stack size.
    pub const STACK: Self = Self(1 << 3);
    /// Lower the scheduling priority.
    pub const CPU: Self = Self(1 << 4);
    /// Every option above.
    pub const ALL: Self = Self(0x1f);

    /// Validates a raw bit pattern.
    ///
    /// # Arguments
    ///
    /// * `bits` - Raw flag bits, as received from configuration or Python.
    ///
    /// # Returns
    ///
    /// The flag set, or `InvalidConfiguration` if any undefined bit is set
    /// (negative values included).
    pub fn from_bits(bits: i64) -> Result<Self> {
        if bits < 0 || bits & !i64::from(Self::ALL.0) != 0 {
            return Err(Error::InvalidConfiguration {
                what: "sandbox flags",
                value: bits.to_string(),
            });
        }
        Ok(Self(bits as u32))
    }

    /// Returns the raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if no option is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every option in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for SandboxFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl TryFrom<i64> for SandboxFlags {
    type Error = Error;

    fn try_from(bits: i64) -> Result<Self> {
        Self::from_bits(bits)
    }
}

/// Classes of memory mappings removed from the tracee before its first stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "i64")]
pub struct MunmapFlags(u32);

impl MunmapFlags {
    /// Remove nothing.
    pub const NONE: Self = Self(0);
    /// File-backed mappings other than the tracee image.
    pub const FILE: Self = Self(1 << 0);
    /// Anonymous mappings.
    pub const ANON: Self = Self(1 << 1);
    /// The `[heap]` segment.
    pub const HEAP: Self = Self(1 << 2);
    /// Every class above.
    pub const ALL: Self = Self(0x7);

    /// Validates a raw bit pattern.
    ///
    /// # Arguments
    ///
    /// * `bits` - Raw flag bits.
    ///
    /// # Returns
    ///
    /// The flag set, or `InvalidConfiguration` if any undefined bit is set.
    pub fn from_bits(bits: i64) -> Result<Self> {
        if bits < 0 || bits & !i64::from(Self::ALL.0) != 0 {
            return Err(Error::InvalidConfiguration {
                what: "munmap flags",
                value: bits.to_string(),
            });
        }
        Ok(Self(bits as u32))
    }

    /// Returns the raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if nothing is removed.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every class in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for MunmapFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl TryFrom<i64> for MunmapFlags {
    type Error = Error;

    fn try_from(bits: i64) -> Result<Self> {
        Self::from_bits(bits)
    }
}
