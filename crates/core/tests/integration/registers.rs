use asmbox_core::sandbox::image::ENTRY_ADDRESS;
use asmbox_core::{RegisterSet, RegisterType};
use pretty_assertions::assert_eq;

use crate::common::harness::TestContext;

#[test]
fn test_initial_state() {
    let ctx = TestContext::new();
    // Stopped at the image entry point, before its first instruction.
    assert_eq!(ctx.pc(), ENTRY_ADDRESS);
    assert!(ctx.reg("fcw").has_flag("PC=EXT"));
    assert!(ctx.reg("mxcsr").has_flag("RC=RN"));
    assert_eq!(ctx.reg("cs").ty(), RegisterType::U16);
}

#[test]
fn test_mask_selects_sets() {
    let ctx = TestContext::new();
    let all = ctx.instance.get_registers(RegisterSet::ALL).unwrap();

    let mut seen = 0;
    for (name, set) in RegisterSet::NAMED {
        let part = ctx.instance.get_registers(set).unwrap();
        assert!(!part.is_empty(), "{name}");
        assert!(part.values().all(|v| v.set == set), "{name}");
        for (reg, value) in &part {
            assert_eq!(all.get(reg), Some(value));
        }
        seen += part.len();
    }
    assert_eq!(seen, all.len());
    assert!(
        ctx.instance
            .get_registers(RegisterSet::NONE)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_snapshot_is_stable() {
    let ctx = TestContext::new();
    let first = ctx.instance.get_registers(RegisterSet::ALL).unwrap();
    let second = ctx.instance.get_registers(RegisterSet::ALL).unwrap();
    assert_eq!(first, second);
}
