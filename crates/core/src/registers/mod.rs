//! Register model.
//!
//! This module defines how register state is presented to callers. It provides:
//! 1. **Register sets:** A bitmask taxonomy ([`RegisterSet`]) used to select groups.
//! 2. **Values:** Typed snapshots ([`RegisterValue`]) carrying raw data and decoded flags.
//! 3. **Flag decode:** [`StatusField`] tables that turn raw bits into mnemonics.
//! 4. **Tables:** Static per-architecture descriptor tables; see [`x86_64`].
//!
//! A query walks the host table in order and keeps the descriptors whose set is
//! in the mask, so the output order is fixed by the table, not by the mask.

/// x87 extended-precision values.
pub mod float80;
/// Register tables and raw register sets for x86-64.
pub mod x86_64;

use std::fmt;
use std::ops::BitOr;

use indexmap::IndexMap;

pub use self::float80::Float80;
pub use self::x86_64::RawRegisters;

/// Ordered register snapshot, keyed by register name.
pub type Registers = IndexMap<&'static str, RegisterValue>;

/// Groups of related registers, combinable with `|`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegisterSet(u32);

impl RegisterSet {
    /// No registers.
    pub const NONE: Self = Self(0);
    /// The instruction pointer.
    pub const PROGRAM_COUNTER: Self = Self(1 << 0);
    /// Integer registers.
    pub const GENERAL_PURPOSE: Self = Self(1 << 1);
    /// Condition and control flags.
    pub const STATUS: Self = Self(1 << 2);
    /// Floating-point data registers.
    pub const FLOATING_POINT: Self = Self(1 << 3);
    /// Floating-point control, status and tag registers.
    pub const FLOATING_POINT_STATUS: Self = Self(1 << 4);
    /// SIMD data registers.
    pub const VECTOR: Self = Self(1 << 5);
    /// SIMD control and status registers.
    pub const VECTOR_STATUS: Self = Self(1 << 6);
    /// Segment selectors and bases.
    pub const SEGMENT: Self = Self(1 << 7);
    /// Every set above.
    pub const ALL: Self = Self(0xff);

    /// Every single set with its name, in presentation order.
    pub const NAMED: [(&'static str, Self); 8] = [
        ("program_counter", Self::PROGRAM_COUNTER),
        ("general_purpose", Self::GENERAL_PURPOSE),
        ("status", Self::STATUS),
        ("floating_point", Self::FLOATING_POINT),
        ("floating_point_status", Self::FLOATING_POINT_STATUS),
        ("vector", Self::VECTOR),
        ("vector_status", Self::VECTOR_STATUS),
        ("segment", Self::SEGMENT),
    ];

    /// Builds a mask from raw bits, dropping undefined ones.
    pub const fn from_bits_truncate(bits: u64) -> Self {
        Self((bits & Self::ALL.0 as u64) as u32)
    }

    /// Returns the raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if no set is selected.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every set in `other` is selected.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns true if `self` and `other` share a set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the name of a single set, or `None` for unions and the empty mask.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, set)| *set == self)
            .map(|(name, _)| *name)
    }
}

impl BitOr for RegisterSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, set) in Self::NAMED {
            if self.contains(set) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Width and kind of a register value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterType {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// 128-bit unsigned integer.
    U128,
    /// x87 80-bit extended-precision float.
    Float80,
}

impl RegisterType {
    /// Size of the value in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::U32 => 32,
            Self::U64 => 64,
            Self::U128 => 128,
            Self::Float80 => 80,
        }
    }
}

/// Raw contents of one register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterData {
    /// 8-bit value.
    U8(u8),
    /// 16-bit value.
    U16(u16),
    /// 32-bit value.
    U32(u32),
    /// 64-bit value.
    U64(u64),
    /// 128-bit value.
    U128(u128),
    /// Extended-precision float.
    Float80(Float80),
}

impl RegisterData {
    /// Returns the type tag matching this value.
    pub const fn ty(self) -> RegisterType {
        match self {
            Self::U8(_) => RegisterType::U8,
            Self::U16(_) => RegisterType::U16,
            Self::U32(_) => RegisterType::U32,
            Self::U64(_) => RegisterType::U64,
            Self::U128(_) => RegisterType::U128,
            Self::Float80(_) => RegisterType::Float80,
        }
    }

    /// Returns the integer value, or `None` for floats.
    pub const fn as_u128(self) -> Option<u128> {
        match self {
            Self::U8(v) => Some(v as u128),
            Self::U16(v) => Some(v as u128),
            Self::U32(v) => Some(v as u128),
            Self::U64(v) => Some(v as u128),
            Self::U128(v) => Some(v),
            Self::Float80(_) => None,
        }
    }

    /// Returns the raw bit pattern, zero-extended.
    ///
    /// Floats yield their 80-bit encoding in the low bits.
    pub fn raw_bits(self) -> u128 {
        match self {
            Self::Float80(v) => (u128::from(v.sign_exponent) << 64) | u128::from(v.significand),
            other => other.as_u128().unwrap_or_default(),
        }
    }
}

impl fmt::Display for RegisterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v:#04x}"),
            Self::U16(v) => write!(f, "{v:#06x}"),
            Self::U32(v) => write!(f, "{v:#010x}"),
            Self::U64(v) => write!(f, "{v:#018x}"),
            Self::U128(v) => write!(f, "{v:#034x}"),
            Self::Float80(v) => write!(f, "{v}"),
        }
    }
}

/// Snapshot of one register at query time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterValue {
    /// Raw contents.
    pub data: RegisterData,
    /// Set the register belongs to.
    pub set: RegisterSet,
    /// Decoded flag mnemonics, or `None` for registers without flag fields.
    pub flags: Option<Vec<String>>,
}

impl RegisterValue {
    /// Returns the type tag of the value.
    pub const fn ty(&self) -> RegisterType {
        self.data.ty()
    }

    /// Returns true if the decoded flags contain `mnemonic`.
    pub fn has_flag(&self, mnemonic: &str) -> bool {
        self.flags
            .as_ref()
            .is_some_and(|flags| flags.iter().any(|f| f == mnemonic))
    }
}

/// A named bit field inside a status or control register.
///
/// Single-bit fields without value names decode to their name when set and
/// to nothing when clear. Wider fields decode to `NAME=value`, using the value
/// names when present and hex otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusField {
    /// Mnemonic.
    pub name: &'static str,
    /// Position of the lowest bit.
    pub shift: u32,
    /// Mask applied after shifting.
    pub mask: u64,
    /// Names for each field value, indexed by value; empty for hex output.
    pub values: &'static [&'static str],
}

impl StatusField {
    /// A single-bit flag.
    pub const fn bit(name: &'static str, shift: u32) -> Self {
        Self {
            name,
            shift,
            mask: 1,
            values: &[],
        }
    }

    /// A multi-bit field printed in hex.
    pub const fn field(name: &'static str, shift: u32, mask: u64) -> Self {
        Self {
            name,
            shift,
            mask,
            values: &[],
        }
    }

    /// A multi-bit field with named values.
    pub const fn named(
        name: &'static str,
        shift: u32,
        mask: u64,
        values: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            shift,
            mask,
            values,
        }
    }

    /// Decodes this field from a raw register value.
    ///
    /// # Arguments
    ///
    /// * `raw` - The full register contents.
    ///
    /// # Returns
    ///
    /// The mnemonic, or `None` for a clear single-bit flag.
    pub fn decode(&self, raw: u128) -> Option<String> {
        let value = (raw >> self.shift) as u64 & self.mask;
        if self.values.is_empty() {
            if self.mask == 1 {
                return (value != 0).then(|| self.name.to_string());
            }
            return Some(format!("{}=0x{value:x}", self.name));
        }
        match self.values.get(value as usize) {
            Some(label) => Some(format!("{}={label}", self.name)),
            None => Some(format!("{}=0x{value:x}", self.name)),
        }
    }
}

/// Decodes every field of a register, in table order.
pub fn decode_flags(fields: &[StatusField], raw: u128) -> Vec<String> {
    fields.iter().filter_map(|f| f.decode(raw)).collect()
}

/// Static description of one register.
#[derive(Clone, Copy)]
pub struct RegisterDescriptor {
    /// Register name.
    pub name: &'static str,
    /// Set the register belongs to.
    pub set: RegisterSet,
    /// Extracts the value from a raw register dump.
    pub read: fn(&RawRegisters) -> RegisterData,
    /// Flag fields; empty for plain data registers.
    pub fields: &'static [StatusField],
}

impl fmt::Debug for RegisterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterDescriptor")
            .field("name", &self.name)
            .field("set", &self.set)
            .finish_non_exhaustive()
    }
}

impl RegisterDescriptor {
    /// Reads and decodes this register from a raw dump.
    pub fn value(&self, raw: &RawRegisters) -> RegisterValue {
        let data = (self.read)(raw);
        let flags = if self.fields.is_empty() {
            None
        } else {
            Some(decode_flags(self.fields, data.raw_bits()))
        };
        RegisterValue {
            data,
            set: self.set,
            flags,
        }
    }
}

/// Register table of the architecture this crate is built for.
pub const HOST_REGISTERS: &[RegisterDescriptor] = x86_64::REGISTERS;

/// Builds a snapshot of every register whose set is in `mask`.
///
/// # Arguments
///
/// * `raw` - Register dump read from the tracee.
/// * `mask` - Sets to include; undefined bits are ignored.
///
/// # Returns
///
/// The selected registers in table order. An empty mask yields an empty map.
pub fn collect(raw: &RawRegisters, mask: RegisterSet) -> Registers {
    HOST_REGISTERS
        .iter()
        .filter(|d| mask.intersects(d.set))
        .map(|d| (d.name, d.value(raw)))
        .collect()
}
