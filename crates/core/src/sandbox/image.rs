//! Tracee image.
//!
//! The tracee does not run a copy of the host program. It execs a tiny static
//! ELF built here, so it starts with nothing but the kernel's own mappings and
//! one RWX segment. It provides:
//! 1. **Layout:** Fixed load address, entry stub and code region.
//! 2. **Builder:** The ELF64 file image ([`build`]).
//! 3. **Memfd:** A close-on-exec memory file holding the image ([`TraceeImage`]).

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};

use nix::errno::Errno;
use nix::sys::memfd::{MemFdCreateFlag, memfd_create};
use object::elf;
use object::endian::{LittleEndian as LE, U16, U32, U64};
use object::pod::bytes_of;

use crate::common::error::{Error, Result, SpawnStage};

/// Virtual address the image is loaded at.
pub const IMAGE_BASE: u64 = 0x1000_0000;

/// Size of the single load segment (64 KiB).
pub const IMAGE_SIZE: usize = 64 * 1024;

/// Offset of the entry stub within the image.
pub const ENTRY_OFFSET: u64 = 0x100;

/// Address the tracee stops at after exec.
pub const ENTRY_ADDRESS: u64 = IMAGE_BASE + ENTRY_OFFSET;

/// Offset of the code region within the image.
pub const CODE_OFFSET: u64 = 0x1000;

/// Address injected code is written to.
pub const CODE_ADDRESS: u64 = IMAGE_BASE + CODE_OFFSET;

/// Size of the code region, trailing trap included.
pub const CODE_CAPACITY: usize = 4096;

/// `int3; jmp .-1`: never leaves the entry point if resumed there.
const ENTRY_STUB: [u8; 3] = [0xcc, 0xeb, 0xfd];

/// Name shown for the memfd in `/proc/<pid>/maps`.
const MEMFD_NAME: &std::ffi::CStr = c"asmbox-image";

/// Builds the ELF64 image.
///
/// One `PT_LOAD` segment covers the whole file at [`IMAGE_BASE`] with equal
/// file and memory sizes, so the kernel maps it as a single file-backed
/// region. A `PT_GNU_STACK` header keeps the stack non-executable.
pub fn build() -> Vec<u8> {
    let header_size = size_of::<elf::FileHeader64<LE>>();
    let phdr_size = size_of::<elf::ProgramHeader64<LE>>();

    let header = elf::FileHeader64::<LE> {
        e_ident: elf::Ident {
            magic: elf::ELFMAG,
            class: elf::ELFCLASS64,
            data: elf::ELFDATA2LSB,
            version: elf::EV_CURRENT,
            os_abi: elf::ELFOSABI_SYSV,
            abi_version: 0,
            padding: [0; 7],
        },
        e_type: U16::new(LE, elf::ET_EXEC),
        e_machine: U16::new(LE, elf::EM_X86_64),
        e_version: U32::new(LE, u32::from(elf::EV_CURRENT)),
        e_entry: U64::new(LE, ENTRY_ADDRESS),
        e_phoff: U64::new(LE, header_size as u64),
        e_shoff: U64::new(LE, 0),
        e_flags: U32::new(LE, 0),
        e_ehsize: U16::new(LE, header_size as u16),
        e_phentsize: U16::new(LE, phdr_size as u16),
        e_phnum: U16::new(LE, 2),
        e_shentsize: U16::new(LE, 0),
        e_shnum: U16::new(LE, 0),
        e_shstrndx: U16::new(LE, 0),
    };

    let load = elf::ProgramHeader64::<LE> {
        p_type: U32::new(LE, elf::PT_LOAD),
        p_flags: U32::new(LE, elf::PF_R | elf::PF_W | elf::PF_X),
        p_offset: U64::new(LE, 0),
        p_vaddr: U64::new(LE, IMAGE_BASE),
        p_paddr: U64::new(LE, IMAGE_BASE),
        p_filesz: U64::new(LE, IMAGE_SIZE as u64),
        p_memsz: U64::new(LE, IMAGE_SIZE as u64),
        p_align: U64::new(LE, 0x1000),
    };

    let stack = elf::ProgramHeader64::<LE> {
        p_type: U32::new(LE, elf::PT_GNU_STACK),
        p_flags: U32::new(LE, elf::PF_R | elf::PF_W),
        p_offset: U64::new(LE, 0),
        p_vaddr: U64::new(LE, 0),
        p_paddr: U64::new(LE, 0),
        p_filesz: U64::new(LE, 0),
        p_memsz: U64::new(LE, 0),
        p_align: U64::new(LE, 16),
    };

    let mut image = vec![0u8; IMAGE_SIZE];
    image[..header_size].copy_from_slice(bytes_of(&header));
    image[header_size..header_size + phdr_size].copy_from_slice(bytes_of(&load));
    image[header_size + phdr_size..header_size + 2 * phdr_size].copy_from_slice(bytes_of(&stack));

    let entry = ENTRY_OFFSET as usize;
    image[entry..entry + ENTRY_STUB.len()].copy_from_slice(&ENTRY_STUB);
    image
}

/// The tracee image held in an anonymous memory file.
///
/// The descriptor is close-on-exec: it lives in the child only until the
/// `execveat` that consumes it.
#[derive(Debug)]
pub struct TraceeImage {
    file: File,
}

impl TraceeImage {
    /// Creates the memfd and writes the image into it.
    pub fn create() -> Result<Self> {
        let fd = memfd_create(MEMFD_NAME, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| Error::spawn(SpawnStage::Image, e))?;
        let mut file = File::from(fd);

        file.write_all(&build()).map_err(|e| {
            Error::spawn(
                SpawnStage::Image,
                Errno::from_raw(e.raw_os_error().unwrap_or(libc::EIO)),
            )
        })?;
        Ok(Self { file })
    }

    /// Returns the descriptor to exec.
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
