use std::fs;

use asmbox_core::{ExecutionOutcome, InstanceConfig, MunmapFlags, SandboxFlags};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::common::asm;
use crate::common::harness::TestContext;

/// Below the 128 KiB limit, well inside the usual 8 MiB default.
const DEEP_STACK: u32 = 512 * 1024;

fn proc_file(pid: i32, name: &str) -> String {
    fs::read_to_string(format!("/proc/{pid}/{name}")).unwrap()
}

fn open_fds(pid: i32) -> usize {
    fs::read_dir(format!("/proc/{pid}/fd")).unwrap().count()
}

fn niceness(pid: i32) -> i32 {
    // /proc/<pid>/stat field 19; the command name precedes it in parentheses.
    let stat = proc_file(pid, "stat");
    let fields: Vec<_> = stat[stat.rfind(')').unwrap() + 2..].split(' ').collect();
    fields[16].parse().unwrap()
}

fn stack_limit_line(pid: i32) -> String {
    proc_file(pid, "limits")
        .lines()
        .find(|line| line.starts_with("Max stack size"))
        .unwrap()
        .to_string()
}

#[test]
fn test_fds_closed() {
    let ctx = TestContext::with_flags(SandboxFlags::FDS, MunmapFlags::NONE);
    assert_eq!(open_fds(ctx.pid()), 0);
}

#[test]
fn test_environment_cleared() {
    let ctx = TestContext::with_flags(SandboxFlags::ENVIRON, MunmapFlags::NONE);
    assert!(proc_file(ctx.pid(), "environ").is_empty());
}

#[test]
fn test_environment_inherited_without_option() {
    let Some((key, _)) = std::env::vars().next() else {
        return;
    };
    let ctx = TestContext::new();
    assert!(proc_file(ctx.pid(), "environ").contains(&format!("{key}=")));
}

#[test]
fn test_priority_lowered() {
    let ctx = TestContext::with_flags(SandboxFlags::CPU, MunmapFlags::NONE);
    assert_eq!(niceness(ctx.pid()), 19);

    let mut config = InstanceConfig::new(SandboxFlags::CPU, MunmapFlags::NONE);
    config.niceness = 15;
    let ctx = TestContext::with_config(&config);
    assert_eq!(niceness(ctx.pid()), 15);
}

#[test]
fn test_stack_limited() {
    let mut ctx = TestContext::with_flags(SandboxFlags::STACK, MunmapFlags::NONE);
    let line = stack_limit_line(ctx.pid());
    assert!(line.contains("131072"), "{line}");
    assert_eq!(
        ctx.run(&asm::touch_below_stack(DEEP_STACK)),
        ExecutionOutcome::Stopped(libc::SIGSEGV)
    );
}

#[test]
fn test_stack_unlimited_without_option() {
    let mut ctx = TestContext::new();
    ctx.run_to_trap(&asm::touch_below_stack(DEEP_STACK));
}

#[test]
fn test_syscalls_trapped() {
    let mut ctx = TestContext::with_flags(SandboxFlags::SYSCALLS, MunmapFlags::NONE);
    assert_eq!(
        ctx.run(&asm::exit_group(0)),
        ExecutionOutcome::Stopped(libc::SIGSYS)
    );
    // getpid
    assert_eq!(
        ctx.run(&asm::syscall(39)),
        ExecutionOutcome::Stopped(libc::SIGSYS)
    );
    // The tracee is still alive and usable.
    ctx.run_to_trap(&asm::nop());
}

#[test]
fn test_all_options() {
    let mut ctx = TestContext::with_flags(SandboxFlags::ALL, MunmapFlags::NONE);
    let pid = ctx.pid();
    assert_eq!(open_fds(pid), 0);
    assert!(proc_file(pid, "environ").is_empty());
    assert_eq!(niceness(pid), 19);
    assert!(stack_limit_line(pid).contains("131072"));
    assert_eq!(
        ctx.run(&asm::exit_group(0)),
        ExecutionOutcome::Stopped(libc::SIGSYS)
    );
}

#[test]
fn test_window_change_ignored() {
    let mut ctx = TestContext::new();
    let status = proc_file(ctx.pid(), "status");
    let blocked = status
        .lines()
        .find_map(|line| line.strip_prefix("SigBlk:"))
        .map(|mask| u64::from_str_radix(mask.trim(), 16).unwrap())
        .unwrap();
    assert_eq!(blocked, 1 << (libc::SIGWINCH - 1));

    signal::kill(Pid::from_raw(ctx.pid()), Signal::SIGWINCH).unwrap();
    ctx.run_to_trap(&asm::nop());
}
