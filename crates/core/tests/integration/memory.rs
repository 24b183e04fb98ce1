use asmbox_core::Error;
use asmbox_core::sandbox::image::{ENTRY_ADDRESS, IMAGE_BASE, IMAGE_SIZE};
use pretty_assertions::assert_eq;

use crate::common::asm::{self, Gpr};
use crate::common::harness::TestContext;

#[test]
fn test_reads_injected_code() {
    let mut ctx = TestContext::new();
    let code = asm::mov_imm64(Gpr::Rdx, 0x1122_3344_5566_7788);
    ctx.run_to_trap(&code);

    let bytes = ctx
        .instance
        .read_memory(ctx.instance.code_address(), code.len() + 1)
        .unwrap();
    assert_eq!(&bytes[..code.len()], code.as_slice());
    assert_eq!(bytes[code.len()], 0xcc);
}

#[test]
fn test_reads_image() {
    let ctx = TestContext::new();
    assert_eq!(ctx.instance.read_memory(IMAGE_BASE, 4).unwrap(), b"\x7fELF");
    assert_eq!(
        ctx.instance.read_memory(ENTRY_ADDRESS, 3).unwrap(),
        [0xcc, 0xeb, 0xfd]
    );
}

#[test]
fn test_read_spanning_pages() {
    let ctx = TestContext::new();
    let bytes = ctx.instance.read_memory(IMAGE_BASE + 0xff0, 0x20).unwrap();
    assert_eq!(bytes.len(), 0x20);
}

#[test]
fn test_read_truncates_at_unmapped_page() {
    let ctx = TestContext::new();
    let end = IMAGE_BASE + IMAGE_SIZE as u64;
    let bytes = ctx.instance.read_memory(end - 16, 64).unwrap();
    assert_eq!(bytes.len(), 16);
}

#[test]
fn test_read_huge_length_returns_prefix() {
    let ctx = TestContext::new();
    let end = IMAGE_BASE + IMAGE_SIZE as u64;
    let bytes = ctx.instance.read_memory(end - 16, 1 << 44).unwrap();
    assert_eq!(bytes.len(), 16);
}

#[test]
fn test_read_unmapped_address() {
    let ctx = TestContext::new();
    for address in [0, 0x1000, IMAGE_BASE + IMAGE_SIZE as u64] {
        match ctx.instance.read_memory(address, 8) {
            Err(Error::BadAddress { address: reported }) => assert_eq!(reported, address),
            other => panic!("{address:#x}: {other:?}"),
        }
    }
}

#[test]
fn test_zero_length_read() {
    let ctx = TestContext::new();
    assert!(ctx.instance.read_memory(0, 0).unwrap().is_empty());
}

#[test]
fn test_reads_stack_at_rsp() {
    let ctx = TestContext::new();
    let rsp = ctx.value("rsp") as u64;
    // argc of the tracee: argv holds only its name.
    let argc = ctx.instance.read_memory(rsp, 8).unwrap();
    assert_eq!(u64::from_le_bytes(argc.try_into().unwrap()), 1);
}
