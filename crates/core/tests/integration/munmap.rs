use asmbox_core::sandbox::image::CODE_ADDRESS;
use asmbox_core::sandbox::maps::MappingKind;
use asmbox_core::{ExecutionOutcome, MunmapFlags, SandboxFlags};
use rstest::rstest;

use crate::common::asm;
use crate::common::harness::TestContext;

#[rstest]
#[case(MunmapFlags::FILE)]
#[case(MunmapFlags::ANON)]
#[case(MunmapFlags::HEAP)]
#[case(MunmapFlags::ALL)]
fn test_selected_classes_removed(#[case] flags: MunmapFlags) {
    let mut ctx = TestContext::with_flags(SandboxFlags::NONE, flags);
    let maps = ctx.instance.mappings().unwrap();
    assert!(
        maps.iter().all(|m| !m.kind.removed_by(flags)),
        "{maps:#?}"
    );
    // The code region survives and still runs.
    ctx.run_to_trap(&asm::nop());
}

#[test]
fn test_image_and_special_regions_kept() {
    let ctx = TestContext::with_flags(SandboxFlags::NONE, MunmapFlags::ALL);
    let maps = ctx.instance.mappings().unwrap();

    let images: Vec<_> = maps
        .iter()
        .filter(|m| m.kind == MappingKind::Image)
        .collect();
    assert_eq!(images.len(), 1, "{maps:#?}");
    assert!((images[0].start..images[0].end).contains(&CODE_ADDRESS));
    assert!(
        maps.iter()
            .all(|m| matches!(m.kind, MappingKind::Image | MappingKind::Special)),
        "{maps:#?}"
    );
    assert!(maps.iter().any(|m| m.kind == MappingKind::Special));
}

#[test]
fn test_munmap_under_syscall_filter() {
    let mut ctx = TestContext::with_flags(SandboxFlags::ALL, MunmapFlags::ALL);
    assert_eq!(
        ctx.run(&asm::exit_group(0)),
        ExecutionOutcome::Stopped(libc::SIGSYS)
    );
}
