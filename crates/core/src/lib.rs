//! Sandboxed machine-code execution library.
//!
//! This crate runs short buffers of raw machine code inside a traced, sandboxed
//! child process and reports what happened. It provides:
//! 1. **Instance:** A handle owning one tracee and the worker thread that controls it.
//! 2. **Registers:** Typed register snapshots with decoded status and control flags.
//! 3. **Sandbox:** Descriptor, syscall, environment, stack and priority isolation,
//!    plus removal of memory mappings before the first injected instruction.
//! 4. **Tracee control:** Spawning, code injection, wait-status decoding and memory reads.
//!
//! Only Linux on x86-64 is supported.

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("asmbox-core supports only Linux on x86-64");

/// Error type and crate-wide result alias.
pub mod common;
/// Instance configuration (defaults, flag sets, JSON loading).
pub mod config;
/// Public instance handle and its controlling worker thread.
pub mod instance;
/// Register model and per-architecture register tables.
pub mod registers;
/// Sandbox flags, seccomp filter, tracee image and mapping removal.
pub mod sandbox;
/// Low-level tracee process control.
pub mod tracee;

/// Crate-wide error type; every fallible operation returns it.
pub use crate::common::error::{Error, Result};
/// Instance configuration; use `InstanceConfig::default()` or deserialize from JSON.
pub use crate::config::InstanceConfig;
/// Main entry point: a sandboxed tracee plus its controlling thread.
pub use crate::instance::Instance;
/// Register query types.
pub use crate::registers::{RegisterData, RegisterSet, RegisterType, RegisterValue, Registers};
/// Creation-time isolation options.
pub use crate::sandbox::{MunmapFlags, SandboxFlags};
/// Result of one `execute` call.
pub use crate::tracee::outcome::ExecutionOutcome;
