//! Tracee memory access.
//!
//! Reads are split at page boundaries so that a range straddling mapped and
//! unmapped pages yields its accessible prefix. A fault on the very first
//! byte is reported as `BadAddress`, distinct from a short read.

use std::io::{IoSlice, IoSliceMut};

use nix::errno::Errno;
use nix::sys::uio::{RemoteIoVec, process_vm_readv, process_vm_writev};
use nix::unistd::Pid;

use crate::common::error::Error;

/// Page granularity used to split reads.
pub const PAGE_SIZE: u64 = 4096;

/// Failure of a raw memory transfer, before it is mapped onto [`Error`].
#[derive(Debug, PartialEq, Eq)]
pub enum AccessError {
    /// Nothing at all could be transferred at the start address.
    Fault,
    /// The process no longer exists.
    Gone,
    /// Any other OS failure.
    Os(Errno),
}

impl AccessError {
    fn from_errno(errno: Errno) -> Self {
        match errno {
            Errno::EFAULT | Errno::EIO => Self::Fault,
            Errno::ESRCH => Self::Gone,
            other => Self::Os(other),
        }
    }
}

/// Splits `[address, address + length)` into page-bounded pieces.
///
/// Pieces past the end of the address space are dropped.
pub fn page_chunks(address: u64, length: usize) -> impl Iterator<Item = (u64, usize)> {
    let end = address.saturating_add(length as u64);
    let mut cursor = address;
    std::iter::from_fn(move || {
        if cursor >= end {
            return None;
        }
        let page_end = (cursor | (PAGE_SIZE - 1)).saturating_add(1).min(end);
        let chunk = (cursor, (page_end - cursor) as usize);
        cursor = page_end;
        Some(chunk)
    })
}

/// Reads up to `length` bytes of tracee memory.
///
/// # Arguments
///
/// * `pid` - The tracee.
/// * `address` - First byte to read.
/// * `length` - Number of bytes requested.
///
/// # Returns
///
/// The accessible prefix of the range (possibly shorter than `length`), or
/// `AccessError::Fault` if the first byte is inaccessible.
pub fn read(pid: Pid, address: u64, length: usize) -> std::result::Result<Vec<u8>, AccessError> {
    // Grown one page at a time, so `length` only bounds the read.
    let mut buf = Vec::new();
    let mut done = 0usize;

    for (base, len) in page_chunks(address, length) {
        buf.resize(done + len, 0);
        let remote = [RemoteIoVec {
            base: base as usize,
            len,
        }];
        let mut local = [IoSliceMut::new(&mut buf[done..])];
        match process_vm_readv(pid, &mut local, &remote) {
            Ok(n) => {
                done += n;
                if n < len {
                    break;
                }
            }
            Err(errno) => {
                let err = AccessError::from_errno(errno);
                if err == AccessError::Fault && done > 0 {
                    break;
                }
                return Err(err);
            }
        }
    }

    if done == 0 && length > 0 {
        return Err(AccessError::Fault);
    }
    buf.truncate(done);
    Ok(buf)
}

/// Writes `bytes` into tracee memory at `address`.
///
/// The whole buffer must land; a short write is reported as a fault.
pub fn write(pid: Pid, address: u64, bytes: &[u8]) -> std::result::Result<(), AccessError> {
    let remote = [RemoteIoVec {
        base: address as usize,
        len: bytes.len(),
    }];
    let local = [IoSlice::new(bytes)];
    match process_vm_writev(pid, &local, &remote) {
        Ok(n) if n == bytes.len() => Ok(()),
        Ok(_) => Err(AccessError::Fault),
        Err(errno) => Err(AccessError::from_errno(errno)),
    }
}

/// Maps a read failure at `address` onto the crate error.
pub(crate) fn read_error(err: AccessError, pid: Pid, address: u64) -> Error {
    match err {
        AccessError::Fault => Error::BadAddress { address },
        AccessError::Gone => Error::ProcessGone { pid: pid.as_raw() },
        AccessError::Os(errno) => Error::os("process_vm_readv", errno),
    }
}
