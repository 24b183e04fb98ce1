//! Memory-mapping enumeration and classification.
//!
//! Mappings are read from `/proc/<pid>/maps` and sorted into the classes the
//! munmap flags select. The tracee image and the kernel's special regions
//! (`[stack]`, `[vdso]`, `[vvar]`, `[vsyscall]`) are never removed.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::Pid;

use super::MunmapFlags;
use super::image::IMAGE_BASE;
use crate::common::error::{Error, Result};

/// What a mapping is backed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// The tracee image itself.
    Image,
    /// A file other than the image.
    File,
    /// Anonymous memory.
    Anonymous,
    /// The `[heap]` segment.
    Heap,
    /// A kernel-provided region such as `[stack]` or `[vdso]`.
    Special,
}

impl MappingKind {
    /// Returns true if `flags` selects this kind for removal.
    pub const fn removed_by(self, flags: MunmapFlags) -> bool {
        match self {
            Self::File => flags.contains(MunmapFlags::FILE),
            Self::Anonymous => flags.contains(MunmapFlags::ANON),
            Self::Heap => flags.contains(MunmapFlags::HEAP),
            Self::Image | Self::Special => false,
        }
    }
}

/// One entry of the tracee's address space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// First address.
    pub start: u64,
    /// One past the last address.
    pub end: u64,
    /// Classification.
    pub kind: MappingKind,
    /// Backing path or pseudo-path, if any.
    pub path: Option<PathBuf>,
}

impl Mapping {
    /// Length in bytes.
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true for an empty range.
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Classifies one mapping.
///
/// # Arguments
///
/// * `start` - First address of the mapping.
/// * `end` - One past its last address.
/// * `path` - The pathname column, if present.
pub fn classify(start: u64, end: u64, path: Option<&Path>) -> MappingKind {
    if (start..end).contains(&IMAGE_BASE) {
        return MappingKind::Image;
    }
    let Some(name) = path.and_then(Path::to_str).filter(|p| !p.is_empty()) else {
        return MappingKind::Anonymous;
    };
    if name == "[heap]" {
        MappingKind::Heap
    } else if name.starts_with('[') {
        MappingKind::Special
    } else {
        MappingKind::File
    }
}

/// Reads and classifies every mapping of `pid`.
pub fn read(pid: Pid) -> Result<Vec<Mapping>> {
    let ranges = proc_maps::get_process_maps(pid.as_raw()).map_err(|e| {
        let errno = Errno::from_raw(e.raw_os_error().unwrap_or(libc::EIO));
        if errno == Errno::ENOENT || errno == Errno::ESRCH {
            Error::ProcessGone { pid: pid.as_raw() }
        } else {
            Error::os("read /proc/<pid>/maps", errno)
        }
    })?;

    Ok(ranges
        .iter()
        .map(|range| {
            let start = range.start() as u64;
            let end = start + range.size() as u64;
            let path = range.filename().map(Path::to_path_buf);
            Mapping {
                start,
                end,
                kind: classify(start, end, path.as_deref()),
                path,
            }
        })
        .collect())
}
