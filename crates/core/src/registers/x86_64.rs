//! x86-64 register tables.
//!
//! Register layout follows the kernel's `user_regs_struct` (`NT_PRSTATUS`) and
//! the FXSAVE image in `user_fpregs_struct` (`NT_PRFPREG`). It provides:
//! 1. **Raw dump:** [`RawRegisters`], both structures as read by ptrace.
//! 2. **x87 helpers:** Physical-to-logical stack mapping and full tag word rebuild.
//! 3. **Flag tables:** RFLAGS, FCW, FSW, FTW and MXCSR field layouts.
//! 4. **Register table:** [`REGISTERS`], in presentation order.

use std::fmt;

use super::{Float80, RegisterData, RegisterDescriptor, RegisterSet, StatusField};

/// General-purpose and floating-point register dumps of a stopped tracee.
#[derive(Clone, Copy)]
pub struct RawRegisters {
    /// Integer, flag and segment registers.
    pub regs: libc::user_regs_struct,
    /// FXSAVE area: x87, MMX, SSE and MXCSR.
    pub fpregs: libc::user_fpregs_struct,
}

impl RawRegisters {
    /// Returns a dump with every register zeroed.
    pub fn zeroed() -> Self {
        // SAFETY: both structures are plain C aggregates of integers, for
        // which the all-zero bit pattern is valid.
        unsafe { std::mem::zeroed() }
    }

    /// Returns the x87 stack top (FSW bits 11-13).
    pub const fn fpu_top(&self) -> usize {
        ((self.fpregs.swd >> 11) & 7) as usize
    }

    /// Returns logical stack slot `ST(i)` as stored in the FXSAVE image.
    pub fn st(&self, logical: usize) -> Float80 {
        let words = &self.fpregs.st_space[logical * 4..logical * 4 + 3];
        let mut bytes = [0u8; 12];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let mut image = [0u8; 10];
        image.copy_from_slice(&bytes[..10]);
        Float80::from_le_bytes(image)
    }

    /// Returns physical register `R<n>`.
    ///
    /// FXSAVE stores the stack in logical order starting at `ST(0)`, which
    /// lives in physical register `TOP`.
    pub fn physical(&self, n: usize) -> Float80 {
        self.st((n + 8 - self.fpu_top()) % 8)
    }

    /// Returns `MM<n>`, the low 64 bits of physical register `R<n>`.
    pub fn mmx(&self, n: usize) -> u64 {
        self.physical(n).significand
    }

    /// Returns `XMM<n>`.
    pub fn xmm(&self, n: usize) -> u128 {
        self.fpregs.xmm_space[n * 4..n * 4 + 4]
            .iter()
            .rev()
            .fold(0u128, |acc, word| (acc << 32) | u128::from(*word))
    }

    /// Rebuilds the full 16-bit x87 tag word.
    ///
    /// FXSAVE keeps only one "non-empty" bit per physical register; the two-bit
    /// tags are recomputed from the register contents.
    pub fn full_tag_word(&self) -> u16 {
        let abridged = self.fpregs.ftw;
        (0..8).fold(0u16, |ftw, n| {
            let tag = if abridged & (1 << n) == 0 {
                3
            } else {
                self.physical(n).tag()
            };
            ftw | (tag << (2 * n))
        })
    }
}

impl Default for RawRegisters {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for RawRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRegisters")
            .field("rip", &format_args!("{:#x}", self.regs.rip))
            .field("rsp", &format_args!("{:#x}", self.regs.rsp))
            .finish_non_exhaustive()
    }
}

/// RFLAGS fields.
pub const RFLAGS_FIELDS: &[StatusField] = &[
    StatusField::bit("CF", 0),
    StatusField::bit("PF", 2),
    StatusField::bit("AF", 4),
    StatusField::bit("ZF", 6),
    StatusField::bit("SF", 7),
    StatusField::bit("TF", 8),
    StatusField::bit("IF", 9),
    StatusField::bit("DF", 10),
    StatusField::bit("OF", 11),
    StatusField::field("IOPL", 12, 3),
    StatusField::bit("NT", 14),
    StatusField::bit("RF", 16),
    StatusField::bit("VM", 17),
    StatusField::bit("AC", 18),
    StatusField::bit("VIF", 19),
    StatusField::bit("VIP", 20),
    StatusField::bit("ID", 21),
];

const ROUNDING: &[&str] = &["RN", "R-", "R+", "RZ"];

/// x87 control word fields.
pub const FCW_FIELDS: &[StatusField] = &[
    StatusField::bit("EM=IM", 0),
    StatusField::bit("EM=DM", 1),
    StatusField::bit("EM=ZM", 2),
    StatusField::bit("EM=OM", 3),
    StatusField::bit("EM=UM", 4),
    StatusField::bit("EM=PM", 5),
    StatusField::named("PC", 8, 3, &["SGL", "RSVD", "DBL", "EXT"]),
    StatusField::named("RC", 10, 3, ROUNDING),
];

/// x87 status word fields.
pub const FSW_FIELDS: &[StatusField] = &[
    StatusField::bit("EF=IE", 0),
    StatusField::bit("EF=DE", 1),
    StatusField::bit("EF=ZE", 2),
    StatusField::bit("EF=OE", 3),
    StatusField::bit("EF=UE", 4),
    StatusField::bit("EF=PE", 5),
    StatusField::bit("SF", 6),
    StatusField::bit("ES", 7),
    StatusField::bit("C0", 8),
    StatusField::bit("C1", 9),
    StatusField::bit("C2", 10),
    StatusField::field("TOP", 11, 7),
    StatusField::bit("C3", 14),
    StatusField::bit("B", 15),
];

const TAGS: &[&str] = &["Valid", "Zero", "Special", "Empty"];

/// x87 tag word fields, one per physical register.
pub const FTW_FIELDS: &[StatusField] = &[
    StatusField::named("TAG0", 0, 3, TAGS),
    StatusField::named("TAG1", 2, 3, TAGS),
    StatusField::named("TAG2", 4, 3, TAGS),
    StatusField::named("TAG3", 6, 3, TAGS),
    StatusField::named("TAG4", 8, 3, TAGS),
    StatusField::named("TAG5", 10, 3, TAGS),
    StatusField::named("TAG6", 12, 3, TAGS),
    StatusField::named("TAG7", 14, 3, TAGS),
];

/// MXCSR fields.
pub const MXCSR_FIELDS: &[StatusField] = &[
    StatusField::bit("EF=IE", 0),
    StatusField::bit("EF=DE", 1),
    StatusField::bit("EF=ZE", 2),
    StatusField::bit("EF=OE", 3),
    StatusField::bit("EF=UE", 4),
    StatusField::bit("EF=PE", 5),
    StatusField::bit("DAZ", 6),
    StatusField::bit("EM=IM", 7),
    StatusField::bit("EM=DM", 8),
    StatusField::bit("EM=ZM", 9),
    StatusField::bit("EM=OM", 10),
    StatusField::bit("EM=UM", 11),
    StatusField::bit("EM=PM", 12),
    StatusField::named("RC", 13, 3, ROUNDING),
    StatusField::bit("FZ", 15),
];

macro_rules! reg {
    ($name:literal, $set:ident, $read:expr) => {
        reg!($name, $set, $read, &[])
    };
    ($name:literal, $set:ident, $read:expr, $fields:expr) => {
        RegisterDescriptor {
            name: $name,
            set: RegisterSet::$set,
            read: $read,
            fields: $fields,
        }
    };
}

macro_rules! gpr {
    ($name:literal, $field:ident) => {
        reg!($name, GENERAL_PURPOSE, |r| RegisterData::U64(r.regs.$field))
    };
}

macro_rules! x87 {
    ($name:literal, $n:literal) => {
        reg!($name, FLOATING_POINT, |r| RegisterData::Float80(r.physical($n)))
    };
}

macro_rules! mmx {
    ($name:literal, $n:literal) => {
        reg!($name, VECTOR, |r| RegisterData::U64(r.mmx($n)))
    };
}

macro_rules! xmm {
    ($name:literal, $n:literal) => {
        reg!($name, VECTOR, |r| RegisterData::U128(r.xmm($n)))
    };
}

macro_rules! selector {
    ($name:literal, $field:ident) => {
        reg!($name, SEGMENT, |r| RegisterData::U16(r.regs.$field as u16))
    };
}

/// Every x86-64 register, in presentation order.
pub const REGISTERS: &[RegisterDescriptor] = &[
    reg!("rip", PROGRAM_COUNTER, |r| RegisterData::U64(r.regs.rip)),
    gpr!("rax", rax),
    gpr!("rcx", rcx),
    gpr!("rdx", rdx),
    gpr!("rbx", rbx),
    gpr!("rsp", rsp),
    gpr!("rbp", rbp),
    gpr!("rsi", rsi),
    gpr!("rdi", rdi),
    gpr!("r8", r8),
    gpr!("r9", r9),
    gpr!("r10", r10),
    gpr!("r11", r11),
    gpr!("r12", r12),
    gpr!("r13", r13),
    gpr!("r14", r14),
    gpr!("r15", r15),
    reg!(
        "eflags",
        STATUS,
        |r| RegisterData::U64(r.regs.eflags),
        RFLAGS_FIELDS
    ),
    x87!("R7", 7),
    x87!("R6", 6),
    x87!("R5", 5),
    x87!("R4", 4),
    x87!("R3", 3),
    x87!("R2", 2),
    x87!("R1", 1),
    x87!("R0", 0),
    reg!(
        "fcw",
        FLOATING_POINT_STATUS,
        |r| RegisterData::U16(r.fpregs.cwd),
        FCW_FIELDS
    ),
    reg!(
        "fsw",
        FLOATING_POINT_STATUS,
        |r| RegisterData::U16(r.fpregs.swd),
        FSW_FIELDS
    ),
    reg!(
        "ftw",
        FLOATING_POINT_STATUS,
        |r| RegisterData::U16(r.full_tag_word()),
        FTW_FIELDS
    ),
    reg!("fip", FLOATING_POINT_STATUS, |r| RegisterData::U64(
        r.fpregs.rip
    )),
    reg!("fdp", FLOATING_POINT_STATUS, |r| RegisterData::U64(
        r.fpregs.rdp
    )),
    reg!("fop", FLOATING_POINT_STATUS, |r| RegisterData::U16(
        r.fpregs.fop
    )),
    mmx!("mm0", 0),
    mmx!("mm1", 1),
    mmx!("mm2", 2),
    mmx!("mm3", 3),
    mmx!("mm4", 4),
    mmx!("mm5", 5),
    mmx!("mm6", 6),
    mmx!("mm7", 7),
    xmm!("xmm0", 0),
    xmm!("xmm1", 1),
    xmm!("xmm2", 2),
    xmm!("xmm3", 3),
    xmm!("xmm4", 4),
    xmm!("xmm5", 5),
    xmm!("xmm6", 6),
    xmm!("xmm7", 7),
    xmm!("xmm8", 8),
    xmm!("xmm9", 9),
    xmm!("xmm10", 10),
    xmm!("xmm11", 11),
    xmm!("xmm12", 12),
    xmm!("xmm13", 13),
    xmm!("xmm14", 14),
    xmm!("xmm15", 15),
    reg!(
        "mxcsr",
        VECTOR_STATUS,
        |r| RegisterData::U32(r.fpregs.mxcsr),
        MXCSR_FIELDS
    ),
    selector!("cs", cs),
    selector!("ss", ss),
    selector!("ds", ds),
    selector!("es", es),
    selector!("fs", fs),
    selector!("gs", gs),
    reg!("fs_base", SEGMENT, |r| RegisterData::U64(r.regs.fs_base)),
    reg!("gs_base", SEGMENT, |r| RegisterData::U64(r.regs.gs_base)),
];
