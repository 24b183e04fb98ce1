use std::thread;

use asmbox_core::{
    Error, ExecutionOutcome, Instance, InstanceConfig, MunmapFlags, RegisterSet, SandboxFlags,
};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};

use crate::common::asm::{self, Gpr};
use crate::common::harness::{TestContext, init_logging};

fn is_reaped(pid: nix::unistd::Pid) -> bool {
    signal::kill(pid, None) == Err(Errno::ESRCH)
}

#[test]
fn test_destroy_reaps_tracee() {
    let ctx = TestContext::new();
    let pid = ctx.instance.pid();
    ctx.instance.destroy();
    assert!(is_reaped(pid));
}

#[test]
fn test_drop_reaps_tracee() {
    let pid = {
        let ctx = TestContext::new();
        ctx.instance.pid()
    };
    assert!(is_reaped(pid));
}

#[test]
fn test_external_kill() {
    let mut ctx = TestContext::new();
    signal::kill(ctx.instance.pid(), Signal::SIGKILL).unwrap();

    assert!(matches!(
        ctx.instance.execute(&asm::nop()),
        Err(Error::ProcessGone { .. })
    ));
    assert!(matches!(
        ctx.instance.get_registers(RegisterSet::ALL),
        Err(Error::ProcessGone { .. })
    ));
    assert!(matches!(
        ctx.instance.read_memory(ctx.instance.code_address(), 1),
        Err(Error::ProcessGone { .. })
    ));
    assert!(is_reaped(ctx.instance.pid()));
}

#[test]
fn test_queries_after_exit() {
    let mut ctx = TestContext::new();
    assert_eq!(ctx.run(&asm::exit_group(0)), ExecutionOutcome::Exited(0));
    let err = ctx.instance.get_registers(RegisterSet::ALL).unwrap_err();
    assert_eq!(err.errno(), Errno::ESRCH);
    assert!(ctx.instance.mappings().is_err());
    ctx.instance.destroy();
}

#[test]
fn test_instances_are_independent() {
    let mut a = TestContext::new();
    let mut b = TestContext::new();
    assert_ne!(a.pid(), b.pid());

    a.run_to_trap(&asm::mov_imm64(Gpr::Rax, 1));
    b.run_to_trap(&asm::mov_imm64(Gpr::Rax, 2));
    assert_eq!(a.value("rax"), 1);
    assert_eq!(b.value("rax"), 2);
}

#[test]
fn test_instance_moves_between_threads() {
    init_logging();
    let mut instance = Instance::create(SandboxFlags::NONE, MunmapFlags::NONE).unwrap();
    let outcome = thread::spawn(move || {
        let outcome = instance.execute(&asm::nop()).unwrap();
        instance.destroy();
        outcome
    })
    .join()
    .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Stopped(libc::SIGTRAP));
}

#[test]
fn test_parallel_instances() {
    init_logging();
    let handles: Vec<_> = (0..4u64)
        .map(|n| {
            thread::spawn(move || {
                let mut instance = Instance::create(SandboxFlags::ALL, MunmapFlags::NONE).unwrap();
                let outcome = instance.execute(&asm::mov_imm64(Gpr::Rbx, n)).unwrap();
                assert!(outcome.is_trap());
                let regs = instance.get_registers(RegisterSet::GENERAL_PURPOSE).unwrap();
                regs["rbx"].data.as_u128()
            })
        })
        .collect();
    for (n, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Some(n as u128));
    }
}

#[test]
fn test_invalid_config_spawns_nothing() {
    let mut config = InstanceConfig::default();
    config.niceness = 40;
    assert!(matches!(
        Instance::with_config(&config),
        Err(Error::InvalidConfiguration { .. })
    ));
}
