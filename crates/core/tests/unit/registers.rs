use std::collections::BTreeSet;

use asmbox_core::registers::{self, Float80, HOST_REGISTERS, RawRegisters};
use asmbox_core::{RegisterData, RegisterSet, RegisterType};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

fn flags_of(raw: &RawRegisters, name: &str) -> Vec<String> {
    registers::collect(raw, RegisterSet::ALL)[name]
        .flags
        .clone()
        .unwrap_or_default()
}

/// Dump with `fninit; fld1` applied: TOP=7, ST(0)=1.0 in physical R7.
fn after_fld1() -> RawRegisters {
    let mut raw = RawRegisters::zeroed();
    raw.fpregs.cwd = 0x037f;
    raw.fpregs.swd = 7 << 11;
    raw.fpregs.ftw = 1 << 7;
    raw.fpregs.st_space[1] = 0x8000_0000;
    raw.fpregs.st_space[2] = 0x3fff;
    raw
}

#[test]
fn test_presentation_order() {
    let names: Vec<_> = registers::collect(&RawRegisters::zeroed(), RegisterSet::ALL)
        .keys()
        .copied()
        .collect();
    assert_eq!(names[0], "rip");
    assert_eq!(&names[1..5], &["rax", "rcx", "rdx", "rbx"]);
    assert_eq!(names[17], "eflags");
    assert_eq!(names[18], "R7");
    assert_eq!(names[25], "R0");
    assert_eq!(names.last().copied(), Some("gs_base"));
    assert_eq!(names.len(), HOST_REGISTERS.len());
}

#[test]
fn test_empty_mask_selects_nothing() {
    assert!(registers::collect(&RawRegisters::zeroed(), RegisterSet::NONE).is_empty());
}

#[rstest]
#[case(RegisterSet::PROGRAM_COUNTER, 1)]
#[case(RegisterSet::GENERAL_PURPOSE, 16)]
#[case(RegisterSet::STATUS, 1)]
#[case(RegisterSet::FLOATING_POINT, 8)]
#[case(RegisterSet::FLOATING_POINT_STATUS, 6)]
#[case(RegisterSet::VECTOR, 24)]
#[case(RegisterSet::VECTOR_STATUS, 1)]
#[case(RegisterSet::SEGMENT, 8)]
fn test_set_sizes(#[case] set: RegisterSet, #[case] count: usize) {
    let regs = registers::collect(&RawRegisters::zeroed(), set);
    assert_eq!(regs.len(), count);
    assert!(regs.values().all(|v| v.set == set));
}

#[rstest]
#[case(0x0000_0246, &["PF", "ZF", "IF", "IOPL=0x0"])]
#[case(0x0000_0203, &["CF", "IF", "IOPL=0x0"])]
#[case(0x0000_3a81, &["CF", "SF", "IF", "OF", "IOPL=0x3"])]
fn test_eflags_decode(#[case] eflags: u64, #[case] expected: &[&str]) {
    let mut raw = RawRegisters::zeroed();
    raw.regs.eflags = eflags;
    assert_eq!(flags_of(&raw, "eflags"), expected);
}

#[test]
fn test_control_words_decode() {
    let mut raw = RawRegisters::zeroed();
    raw.fpregs.cwd = 0x037f;
    raw.fpregs.mxcsr = 0x1f80;
    assert_eq!(
        flags_of(&raw, "fcw"),
        &["EM=IM", "EM=DM", "EM=ZM", "EM=OM", "EM=UM", "EM=PM", "PC=EXT", "RC=RN"]
    );
    assert_eq!(
        flags_of(&raw, "mxcsr"),
        &["EM=IM", "EM=DM", "EM=ZM", "EM=OM", "EM=UM", "EM=PM", "RC=RN"]
    );

    raw.fpregs.cwd = 0x0a7f;
    let fcw = flags_of(&raw, "fcw");
    assert!(fcw.contains(&"PC=DBL".to_string()), "{fcw:?}");
    assert!(fcw.contains(&"RC=R+".to_string()), "{fcw:?}");
}

#[test]
fn test_empty_fpu_tags() {
    let raw = RawRegisters::zeroed();
    let regs = registers::collect(&raw, RegisterSet::FLOATING_POINT_STATUS);
    assert_eq!(regs["ftw"].data, RegisterData::U16(0xffff));
    assert!(regs["ftw"].has_flag("TAG0=Empty"));
    assert!(regs["ftw"].has_flag("TAG7=Empty"));
    assert!(regs["fsw"].has_flag("TOP=0x0"));
}

#[test]
fn test_x87_stack_mapping() {
    let raw = after_fld1();
    assert_eq!(raw.fpu_top(), 7);
    assert_eq!(raw.physical(7).to_f64(), 1.0);
    assert_eq!(raw.st(0), raw.physical(7));

    let regs = registers::collect(&raw, RegisterSet::ALL);
    assert_eq!(regs["R7"].ty(), RegisterType::Float80);
    assert_eq!(
        regs["R7"].data,
        RegisterData::Float80(Float80 {
            significand: 0x8000_0000_0000_0000,
            sign_exponent: 0x3fff,
        })
    );
    assert_eq!(regs["mm7"].data, RegisterData::U64(0x8000_0000_0000_0000));
    assert_eq!(regs["ftw"].data, RegisterData::U16(0x3fff));
    assert!(regs["ftw"].has_flag("TAG7=Valid"));
    assert!(regs["ftw"].has_flag("TAG6=Empty"));
    assert!(regs["fsw"].has_flag("TOP=0x7"));
}

#[test]
fn test_xmm_assembly() {
    let mut raw = RawRegisters::zeroed();
    raw.fpregs.xmm_space[..4].copy_from_slice(&[1, 2, 3, 4]);
    raw.fpregs.xmm_space[60..].copy_from_slice(&[u32::MAX; 4]);
    let regs = registers::collect(&raw, RegisterSet::VECTOR);
    assert_eq!(
        regs["xmm0"].data,
        RegisterData::U128(0x0000_0004_0000_0003_0000_0002_0000_0001)
    );
    assert_eq!(regs["xmm15"].data, RegisterData::U128(u128::MAX));
    assert_eq!(regs["xmm0"].ty().bits(), 128);
}

#[test]
fn test_segment_selectors_truncate() {
    let mut raw = RawRegisters::zeroed();
    raw.regs.cs = 0x33;
    raw.regs.fs_base = 0x7f00_0000_1000;
    let regs = registers::collect(&raw, RegisterSet::SEGMENT);
    assert_eq!(regs["cs"].data, RegisterData::U16(0x33));
    assert_eq!(regs["fs_base"].data, RegisterData::U64(0x7f00_0000_1000));
    assert_eq!(regs["cs"].flags, None);
}

#[test]
fn test_set_names() {
    let names: Vec<_> = RegisterSet::NAMED.iter().map(|(name, _)| *name).collect();
    assert_eq!(names.len(), 8);
    assert_eq!(RegisterSet::VECTOR.name(), Some("vector"));
    assert_eq!(RegisterSet::ALL.name(), None);
}

fn keys(mask: u64) -> BTreeSet<&'static str> {
    registers::collect(
        &RawRegisters::zeroed(),
        RegisterSet::from_bits_truncate(mask),
    )
    .keys()
    .copied()
    .collect()
}

proptest! {
    #[test]
    fn prop_mask_union(a in 0u64..256, b in 0u64..256) {
        let union = keys(a | b);
        let expected: BTreeSet<_> = keys(a).union(&keys(b)).copied().collect();
        prop_assert_eq!(&union, &expected);
        prop_assert_eq!(union.len(), keys(a).len() + keys(b).len() - keys(a & b).len());
    }

    #[test]
    fn prop_undefined_bits_ignored(mask in any::<u64>()) {
        prop_assert_eq!(keys(mask), keys(mask & 0xff));
    }
}
